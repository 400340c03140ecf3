//! Defines the Abstract Syntax Tree (AST) for parsed Liquid templates.

use serde_json::Value;

/// The top-level parsed unit. Rendering a template is folding its nodes
/// left-to-right, threading the variable context through each one.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
}

/// One statement-level construct of a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A run of plain text, emitted verbatim. Also produced by `raw` blocks.
    Text(String),
    /// An output expression: `{{ expr | filter | ... }}`.
    Output(FilteredExpression),
    Assign {
        var: String,
        value: FilteredExpression,
    },
    Capture {
        var: String,
        body: Template,
    },
    Increment {
        var: String,
    },
    Decrement {
        var: String,
    },
    If(Conditional),
    /// Same shape as `If`; the first condition's polarity is inverted.
    Unless(Conditional),
    Case {
        subject: Expression,
        whens: Vec<When>,
        otherwise: Option<Template>,
    },
    For {
        var: String,
        collection: Expression,
        opts: ForOptions,
        body: Template,
        /// Runs when the collection is empty after `offset`/`limit`.
        otherwise: Option<Template>,
    },
    Break,
    Continue,
}

/// A value-producing expression: a literal, a range, or a variable lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Range(Range),
    Lookup(Lookup),
}

/// An expression with a trailing filter pipeline, as found in `{{ ... }}`
/// outputs and `assign` values.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredExpression {
    pub expr: Expression,
    pub filters: Vec<FilterCall>,
}

/// One stage of a filter pipeline: `name` or `name: arg, arg`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expression>,
}

/// A variable reference with postfix `.key` / `[key]` accesses.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub name: String,
    pub path: Vec<Accessor>,
}

/// One `.key` or `[key]` access applied to a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    /// `.key` or `["key"]`.
    Key(String),
    /// `[3]`.
    Index(i64),
    /// `[other.var]` — the key is itself a lookup, resolved at render time.
    Dynamic(Box<Lookup>),
}

/// `(start..end)`. Inclusive ascending when `end >= start`, inclusive
/// descending otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub start: RangeEndpoint,
    pub end: RangeEndpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeEndpoint {
    Literal(i64),
    Lookup(Lookup),
}

/// The branches of an `if`/`unless`. Holds at least one branch; the `else`
/// body, when present, is last.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub branches: Vec<Branch>,
    pub otherwise: Option<Template>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Predicate,
    pub body: Template,
}

/// One `when` clause of a `case`.
#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub value: Expression,
    pub body: Template,
}

/// Loop modifiers: `limit: n`, `offset: n`, `reversed`, in any order.
/// Applied as offset, then limit, then reversal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub reversed: bool,
}

/// A boolean test used by `if`/`unless`. `and` binds tighter than `or`;
/// both are left-associative.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A bare expression: truthy iff not nil and not `false`.
    Truthy(Expression),
    Assertion {
        op: CompareOp,
        lhs: Expression,
        rhs: Expression,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

/// A comparison operator used in an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}
