//! The evaluation engine: walks a parsed [`Template`] against a variable
//! context and accumulates the rendered output.
//!
//! Control flow out of loops is modelled explicitly: every statement
//! evaluation returns a [`Flow`], and `for` is the only construct that
//! consumes `Break`/`Continue`. Everything else propagates the signal
//! upward unchanged, so a `break` buried in nested conditionals unwinds
//! cleanly to the innermost loop.

use crate::RenderOptions;
use crate::ast::*;
use crate::error::BrineError;
use crate::filters::FilterRegistry;
use crate::value;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Outcome of evaluating a template fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
}

pub(crate) struct TemplateExecutor<'r> {
    /// The caller's parameters plus everything `assign` and the counters
    /// have written. Survives loop bodies.
    globals: HashMap<String, Value>,
    /// Per-loop bindings (the loop variable and `forloop`). Innermost last.
    scopes: Vec<HashMap<String, Value>>,
    filters: &'r FilterRegistry,
    strict_variables: bool,
    strict_filters: bool,
}

impl<'r> TemplateExecutor<'r> {
    pub(crate) fn new(
        params: &HashMap<String, Value>,
        filters: &'r FilterRegistry,
        options: &RenderOptions,
    ) -> Self {
        Self {
            globals: params.clone(),
            scopes: Vec::new(),
            filters,
            strict_variables: options.strict_variables,
            strict_filters: options.strict_filters,
        }
    }

    /// Renders a whole template. A control signal surviving to this level
    /// is an authoring error in the template, not a crash.
    pub(crate) fn render(&mut self, template: &Template) -> Result<String, BrineError> {
        let mut out = String::new();
        match self.execute_template(template, &mut out)? {
            Flow::Normal => Ok(out),
            Flow::Break => Err(BrineError::StrayControlFlow("break")),
            Flow::Continue => Err(BrineError::StrayControlFlow("continue")),
        }
    }

    fn execute_template(&mut self, template: &Template, out: &mut String) -> Result<Flow, BrineError> {
        for node in &template.nodes {
            let flow = self.execute_node(node, out)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_node(&mut self, node: &Node, out: &mut String) -> Result<Flow, BrineError> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => {
                let resolved = self.evaluate_filtered(expr)?;
                out.push_str(&value::render(&resolved));
            }
            Node::Assign { var, value } => {
                let resolved = self.evaluate_filtered(value)?;
                self.globals.insert(var.clone(), resolved);
            }
            Node::Capture { var, body } => return self.execute_capture(var, body),
            Node::Increment { var } => self.step_counter(var, 1)?,
            Node::Decrement { var } => self.step_counter(var, -1)?,
            Node::If(cond) => return self.execute_conditional(cond, false, out),
            Node::Unless(cond) => return self.execute_conditional(cond, true, out),
            Node::Case {
                subject,
                whens,
                otherwise,
            } => return self.execute_case(subject, whens, otherwise, out),
            Node::For {
                var,
                collection,
                opts,
                body,
                otherwise,
            } => return self.execute_for(var, collection, opts, body, otherwise, out),
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    /// `capture` isolates: the body runs against a snapshot of the variable
    /// state, and only the captured string survives.
    fn execute_capture(&mut self, var: &str, body: &Template) -> Result<Flow, BrineError> {
        let saved_globals = self.globals.clone();
        let saved_scopes = self.scopes.clone();
        let mut captured = String::new();
        let flow = self.execute_template(body, &mut captured)?;
        self.globals = saved_globals;
        self.scopes = saved_scopes;
        self.globals.insert(var.to_string(), Value::String(captured));
        Ok(flow)
    }

    fn step_counter(&mut self, var: &str, step: i64) -> Result<(), BrineError> {
        let current = match self.lookup_variable(var) {
            Some(v) => v.clone(),
            None if self.strict_variables => {
                return Err(BrineError::UndefinedVariable(var.to_string()));
            }
            // Absent counters start at zero.
            None => Value::Null,
        };
        let next = value::to_integer(&current) + step;
        self.globals.insert(var.to_string(), Value::from(next));
        Ok(())
    }

    fn execute_conditional(
        &mut self,
        cond: &Conditional,
        invert_first: bool,
        out: &mut String,
    ) -> Result<Flow, BrineError> {
        for (index, branch) in cond.branches.iter().enumerate() {
            let mut hit = self.evaluate_predicate(&branch.condition)?;
            if invert_first && index == 0 {
                hit = !hit;
            }
            if hit {
                return self.execute_template(&branch.body, out);
            }
        }
        match &cond.otherwise {
            Some(body) => self.execute_template(body, out),
            None => Ok(Flow::Normal),
        }
    }

    fn execute_case(
        &mut self,
        subject: &Expression,
        whens: &[When],
        otherwise: &Option<Template>,
        out: &mut String,
    ) -> Result<Flow, BrineError> {
        let subject = self.evaluate_expression(subject)?;
        for when in whens {
            let candidate = self.evaluate_expression(&when.value)?;
            if value::values_equal(&subject, &candidate) {
                return self.execute_template(&when.body, out);
            }
        }
        match otherwise {
            Some(body) => self.execute_template(body, out),
            None => Ok(Flow::Normal),
        }
    }

    fn execute_for(
        &mut self,
        var: &str,
        collection: &Expression,
        opts: &ForOptions,
        body: &Template,
        otherwise: &Option<Template>,
        out: &mut String,
    ) -> Result<Flow, BrineError> {
        let mut items = self.resolve_collection(collection)?;
        // Fixed modifier order: offset, then limit, then reversal.
        if let Some(offset) = opts.offset {
            items = items.split_off(items.len().min(offset as usize));
        }
        if let Some(limit) = opts.limit {
            items.truncate(limit as usize);
        }
        if opts.reversed {
            items.reverse();
        }

        if items.is_empty() {
            return match otherwise {
                Some(body) => self.execute_template(body, out),
                None => Ok(Flow::Normal),
            };
        }

        let len = items.len();
        for (index, item) in items.into_iter().enumerate() {
            self.push_scope();
            self.set_variable(var.to_string(), item);
            self.set_variable("forloop".to_string(), forloop_object(index, len));
            let flow = self.execute_template(body, out);
            self.pop_scope();
            match flow? {
                Flow::Break => break,
                Flow::Continue | Flow::Normal => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn resolve_collection(&self, collection: &Expression) -> Result<Vec<Value>, BrineError> {
        match self.evaluate_expression(collection)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(vec![]),
            other => {
                log::debug!("for loop over non-sequence value {other}; iterating nothing");
                Ok(vec![])
            }
        }
    }

    // --- Scopes & Lookups ---

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn set_variable(&mut self, name: String, val: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, val);
        } else {
            self.globals.insert(name, val);
        }
    }

    fn lookup_variable(&self, name: &str) -> Option<&Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v);
            }
        }
        self.globals.get(name)
    }

    fn resolve_lookup(&self, lookup: &Lookup) -> Result<Value, BrineError> {
        let mut current = match self.lookup_variable(&lookup.name) {
            Some(v) => v.clone(),
            None if self.strict_variables => {
                return Err(BrineError::UndefinedVariable(lookup.name.clone()));
            }
            None => {
                log::debug!("undefined variable '{}' resolved to nil", lookup.name);
                Value::Null
            }
        };
        for accessor in &lookup.path {
            current = match accessor {
                Accessor::Key(key) => value::index_by_key(&current, key),
                Accessor::Index(index) => value::index_by_int(&current, *index),
                Accessor::Dynamic(inner) => {
                    let key = self.resolve_lookup(inner)?;
                    value::index_by_value(&current, &key)
                }
            };
        }
        Ok(current)
    }

    // --- Expressions, Filters & Predicates ---

    fn evaluate_expression(&self, expr: &Expression) -> Result<Value, BrineError> {
        match expr {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Lookup(lookup) => self.resolve_lookup(lookup),
            Expression::Range(range) => {
                let items = self.resolve_range(range)?;
                Ok(Value::Array(items.into_iter().map(Value::from).collect()))
            }
        }
    }

    /// Materializes a range: ascending inclusive when `end >= start`,
    /// descending inclusive otherwise.
    fn resolve_range(&self, range: &Range) -> Result<Vec<i64>, BrineError> {
        let start = self.resolve_endpoint(&range.start)?;
        let end = self.resolve_endpoint(&range.end)?;
        if end >= start {
            Ok((start..=end).collect())
        } else {
            Ok((end..=start).rev().collect())
        }
    }

    fn resolve_endpoint(&self, endpoint: &RangeEndpoint) -> Result<i64, BrineError> {
        match endpoint {
            RangeEndpoint::Literal(n) => Ok(*n),
            RangeEndpoint::Lookup(lookup) => Ok(value::to_integer(&self.resolve_lookup(lookup)?)),
        }
    }

    /// Resolves an expression and folds its filter pipeline left-to-right.
    /// Under lax filters, an unknown name contaminates the chain and the
    /// whole expression resolves to nil.
    fn evaluate_filtered(&self, fe: &FilteredExpression) -> Result<Value, BrineError> {
        let mut current = self.evaluate_expression(&fe.expr)?;
        let mut contaminated = false;
        for call in &fe.filters {
            let mut args = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                args.push(self.evaluate_expression(arg)?);
            }
            match self.filters.get(&call.name) {
                Some(filter) => {
                    current = filter(&current, &args).map_err(|message| BrineError::Filter {
                        filter: call.name.clone(),
                        message,
                    })?;
                }
                None if self.strict_filters => {
                    return Err(BrineError::UndefinedFilter(call.name.clone()));
                }
                None => {
                    log::warn!("unknown filter '{}' ignored", call.name);
                    contaminated = true;
                }
            }
        }
        if contaminated {
            return Ok(Value::Null);
        }
        Ok(current)
    }

    fn evaluate_predicate(&self, pred: &Predicate) -> Result<bool, BrineError> {
        match pred {
            Predicate::Truthy(expr) => Ok(value::is_truthy(&self.evaluate_expression(expr)?)),
            Predicate::Assertion { op, lhs, rhs } => {
                let lhs = self.evaluate_expression(lhs)?;
                let rhs = self.evaluate_expression(rhs)?;
                Ok(value::compare(*op, &lhs, &rhs))
            }
            Predicate::And(a, b) => {
                Ok(self.evaluate_predicate(a)? && self.evaluate_predicate(b)?)
            }
            Predicate::Or(a, b) => Ok(self.evaluate_predicate(a)? || self.evaluate_predicate(b)?),
        }
    }
}

fn forloop_object(index: usize, len: usize) -> Value {
    let mut map = Map::new();
    map.insert("index".to_string(), Value::from((index + 1) as i64));
    map.insert("index0".to_string(), Value::from(index as i64));
    map.insert("rindex".to_string(), Value::from((len - index) as i64));
    map.insert("rindex0".to_string(), Value::from((len - index - 1) as i64));
    map.insert("first".to_string(), Value::Bool(index == 0));
    map.insert("last".to_string(), Value::Bool(index + 1 == len));
    map.insert("length".to_string(), Value::from(len as i64));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_template;
    use serde_json::json;

    fn run(source: &str, params: Value, options: &RenderOptions) -> Result<String, BrineError> {
        let template = parse_template(source)?;
        let params: HashMap<String, Value> = params
            .as_object()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        let mut filters = FilterRegistry::default();
        for (name, filter) in &options.custom_filters {
            filters.register(name, *filter);
        }
        let mut executor = TemplateExecutor::new(&params, &filters, options);
        executor.render(&template)
    }

    fn render(source: &str, params: Value) -> String {
        run(source, params, &RenderOptions::default()).unwrap()
    }

    #[test]
    fn test_lookup_paths() {
        let params = json!({"user": {"name": "Ada", "tags": ["x", "y"]}, "k": "name"});
        assert_eq!(render("{{ user.name }}", params.clone()), "Ada");
        assert_eq!(render("{{ user.tags[1] }}", params.clone()), "y");
        assert_eq!(render("{{ user[k] }}", params.clone()), "Ada");
        assert_eq!(render("{{ user.tags[9] }}", params), "");
    }

    #[test]
    fn test_strict_variables() {
        let options = RenderOptions {
            strict_variables: true,
            ..RenderOptions::default()
        };
        let err = run("{{ missing }}", json!({}), &options).unwrap_err();
        assert_eq!(err, BrineError::UndefinedVariable("missing".to_string()));
        // Lax mode degrades to nil.
        assert_eq!(render("[{{ missing }}]", json!({})), "[]");
    }

    #[test]
    fn test_strict_filters() {
        let options = RenderOptions {
            strict_filters: true,
            ..RenderOptions::default()
        };
        let err = run("{{ 'x' | nope }}", json!({}), &options).unwrap_err();
        assert_eq!(err, BrineError::UndefinedFilter("nope".to_string()));
        // Lax mode renders the contaminated expression as empty.
        assert_eq!(render("[{{ 'x' | nope | upcase }}]", json!({})), "[]");
    }

    #[test]
    fn test_assign_persists_out_of_for_but_loop_var_does_not() {
        let out = render(
            "{% for x in (1..3) %}{% assign seen = x %}{% endfor %}{{ seen }}|{{ x }}",
            json!({}),
        );
        assert_eq!(out, "3|");
    }

    #[test]
    fn test_capture_isolates_assignments() {
        let out = render(
            "{% assign a = 1 %}{% capture c %}{% assign a = 2 %}inner {{ a }}{% endcapture %}{{ a }} {{ c }}",
            json!({}),
        );
        assert_eq!(out, "1 inner 2");
    }

    #[test]
    fn test_counters() {
        let out = render(
            "{% decrement foo %}{{ foo }} {% increment foo %}{% increment foo %}{{ foo }}",
            json!({"foo": 42}),
        );
        assert_eq!(out, "41 43");
        // Absent counters are zero-initialized before the step applies.
        assert_eq!(render("{% increment n %}{{ n }}", json!({})), "1");
        assert_eq!(render("{% decrement n %}{{ n }}", json!({})), "-1");
    }

    #[test]
    fn test_counter_strict_mode_requires_the_variable() {
        let options = RenderOptions {
            strict_variables: true,
            ..RenderOptions::default()
        };
        let err = run("{% increment n %}", json!({}), &options).unwrap_err();
        assert_eq!(err, BrineError::UndefinedVariable("n".to_string()));
    }

    #[test]
    fn test_unless_inverts_only_the_first_condition() {
        assert_eq!(
            render("{% unless done %}pending{% endunless %}", json!({"done": false})),
            "pending"
        );
        // The elsif leg keeps normal polarity.
        assert_eq!(
            render(
                "{% unless ok %}a{% elsif also %}b{% else %}c{% endunless %}",
                json!({"ok": true, "also": true}),
            ),
            "b"
        );
    }

    #[test]
    fn test_case_matches_by_equality() {
        let source = "{% case n %}{% when 1 %}one{% when 2 %}two{% else %}many{% endcase %}";
        assert_eq!(render(source, json!({"n": 2})), "two");
        assert_eq!(render(source, json!({"n": 2.0})), "two");
        assert_eq!(render(source, json!({"n": 9})), "many");
    }

    #[test]
    fn test_for_options_apply_offset_then_limit_then_reverse() {
        let out = render(
            "{% for x in xs offset: 1 limit: 3 reversed %}{{ x }}{% endfor %}",
            json!({"xs": [1, 2, 3, 4, 5]}),
        );
        assert_eq!(out, "432");
    }

    #[test]
    fn test_for_else_runs_on_empty_collection() {
        let out = render(
            "{% for x in xs %}{{ x }}{% else %}none{% endfor %}",
            json!({"xs": []}),
        );
        assert_eq!(out, "none");
    }

    #[test]
    fn test_forloop_object() {
        let out = render(
            "{% for x in (10..12) %}{{ forloop.index }}:{{ forloop.first }};{% endfor %}",
            json!({}),
        );
        assert_eq!(out, "1:true;2:false;3:false;");
    }

    #[test]
    fn test_break_unwinds_through_nested_constructs() {
        let out = render(
            "{% for i in (1..4) %}{% if i == 3 %}{% unless false %}{% break %}{% endunless %}{% endif %}{{ i }}{% endfor %}end",
            json!({}),
        );
        assert_eq!(out, "12end");
    }

    #[test]
    fn test_break_only_exits_the_innermost_loop() {
        let out = render(
            "{% for i in (1..2) %}{% for j in (1..9) %}{% if j == 2 %}{% break %}{% endif %}{{ i }}{{ j }} {% endfor %}{% endfor %}",
            json!({}),
        );
        assert_eq!(out, "11 21 ");
    }

    #[test]
    fn test_stray_break_is_reported() {
        let err = run("{% break %}", json!({}), &RenderOptions::default()).unwrap_err();
        assert_eq!(err, BrineError::StrayControlFlow("break"));
    }

    #[test]
    fn test_filter_error_carries_the_filter_name() {
        let err = run("{{ 1 | divided_by: 0 }}", json!({}), &RenderOptions::default()).unwrap_err();
        assert_eq!(
            err,
            BrineError::Filter {
                filter: "divided_by".to_string(),
                message: "division by zero".to_string(),
            }
        );
    }

    #[test]
    fn test_range_endpoints_coerce_laxly() {
        assert_eq!(
            render("{% for x in (a..b) %}{{ x }}{% endfor %}", json!({"b": 3})),
            "0123"
        );
    }
}
