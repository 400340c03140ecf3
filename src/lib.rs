//! A Liquid-style template engine over JSON data.
//!
//! Templates are parsed once into an immutable AST and rendered any number
//! of times against a parameter map. Rendering is synchronous and
//! self-contained per call: a parsed [`Template`] is freely sharable across
//! threads, while each call owns its own variable context.
//!
//! ```
//! use std::collections::HashMap;
//!
//! let params = HashMap::from([("name".to_string(), brine::Value::from("world"))]);
//! let out = brine::render_source(
//!     "Hello {{ name | capitalize }}!",
//!     &params,
//!     &brine::RenderOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(out, "Hello World!");
//! ```

pub mod ast;
pub mod error;
pub mod filters;
pub mod parser;
pub mod value;

mod engine;

pub use ast::Template;
pub use error::BrineError;
pub use filters::{FilterFn, FilterRegistry};
pub use serde_json::Value;

use std::collections::HashMap;

/// Policy flags and extension filters for a rendering call. Everything
/// defaults to the lax behavior.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Fail on reads of undefined variables instead of resolving to nil.
    pub strict_variables: bool,
    /// Fail on unknown filter names instead of degrading to a no-op.
    pub strict_filters: bool,
    /// Extra filters, shadowing built-ins of the same name.
    pub custom_filters: HashMap<String, FilterFn>,
}

/// Parses template source into a reusable [`Template`].
pub fn parse(source: &str) -> Result<Template, BrineError> {
    parser::parse_template(source)
}

/// Renders a parsed template against the given parameters. Neither the
/// template nor the parameter map is modified.
pub fn render(
    template: &Template,
    params: &HashMap<String, Value>,
    options: &RenderOptions,
) -> Result<String, BrineError> {
    let mut filters = FilterRegistry::default();
    for (name, filter) in &options.custom_filters {
        filters.register(name, *filter);
    }
    let mut executor = engine::TemplateExecutor::new(params, &filters, options);
    executor.render(template)
}

/// Parses and renders in one call.
pub fn render_source(
    source: &str,
    params: &HashMap<String, Value>,
    options: &RenderOptions,
) -> Result<String, BrineError> {
    let template = parse(source)?;
    render(&template, params, options)
}
