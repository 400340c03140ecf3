//! Defines the registry and built-in implementations for template filters.
//!
//! Filters are pure functions from an input value and explicit arguments to
//! a new value. They coerce mismatched inputs rather than failing; the only
//! hard errors are arithmetic ones such as division by zero.

use crate::value::{self, Num};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// The signature for a filter implementation, built-in or user-supplied.
pub type FilterFn = fn(&Value, &[Value]) -> Result<Value, String>;

/// A registry of all filters available to the evaluation engine. User
/// registrations shadow built-ins of the same name.
pub struct FilterRegistry {
    functions: HashMap<String, FilterFn>,
}

impl FilterRegistry {
    /// Creates a new, empty function registry.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registers a filter, replacing any existing filter of the same name.
    pub fn register(&mut self, name: &str, filter: FilterFn) {
        self.functions.insert(name.to_string(), filter);
    }

    /// Finds a filter by name.
    pub fn get(&self, name: &str) -> Option<FilterFn> {
        self.functions.get(name).copied()
    }
}

impl Default for FilterRegistry {
    /// Creates a registry populated with all built-in filters.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("upcase", upcase);
        registry.register("downcase", downcase);
        registry.register("capitalize", capitalize);
        registry.register("append", append);
        registry.register("prepend", prepend);
        registry.register("strip", strip);
        registry.register("lstrip", lstrip);
        registry.register("rstrip", rstrip);
        registry.register("strip_newlines", strip_newlines);
        registry.register("replace", replace);
        registry.register("replace_first", replace_first);
        registry.register("remove", remove);
        registry.register("remove_first", remove_first);
        registry.register("split", split);
        registry.register("join", join);
        registry.register("first", first);
        registry.register("last", last);
        registry.register("size", size);
        registry.register("reverse", reverse);
        registry.register("sort", sort);
        registry.register("uniq", uniq);
        registry.register("compact", compact);
        registry.register("plus", plus);
        registry.register("minus", minus);
        registry.register("times", times);
        registry.register("divided_by", divided_by);
        registry.register("modulo", modulo);
        registry.register("abs", abs);
        registry.register("ceil", ceil);
        registry.register("floor", floor);
        registry.register("round", round);
        registry.register("truncate", truncate);
        registry.register("truncatewords", truncatewords);
        registry.register("default", default_filter);
        registry
    }
}

// --- Argument helpers ---

fn arg_str(args: &[Value], index: usize) -> String {
    args.get(index).map(value::render).unwrap_or_default()
}

fn arg_num(args: &[Value], index: usize) -> Num {
    args.get(index).map(Num::coerce).unwrap_or(Num::Int(0))
}

// --- String filters ---

fn upcase(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(value::render(input).to_uppercase().into())
}

fn downcase(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(value::render(input).to_lowercase().into())
}

fn capitalize(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let s = value::render(input);
    let mut chars = s.chars();
    let capitalized = match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(capitalized.into())
}

fn append(input: &Value, args: &[Value]) -> Result<Value, String> {
    Ok(format!("{}{}", value::render(input), arg_str(args, 0)).into())
}

fn prepend(input: &Value, args: &[Value]) -> Result<Value, String> {
    Ok(format!("{}{}", arg_str(args, 0), value::render(input)).into())
}

fn strip(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(value::render(input).trim().into())
}

fn lstrip(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(value::render(input).trim_start().into())
}

fn rstrip(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(value::render(input).trim_end().into())
}

fn strip_newlines(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let s: String = value::render(input)
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect();
    Ok(s.into())
}

fn replace(input: &Value, args: &[Value]) -> Result<Value, String> {
    let from = arg_str(args, 0);
    if from.is_empty() {
        return Ok(input.clone());
    }
    Ok(value::render(input).replace(&from, &arg_str(args, 1)).into())
}

fn replace_first(input: &Value, args: &[Value]) -> Result<Value, String> {
    let from = arg_str(args, 0);
    if from.is_empty() {
        return Ok(input.clone());
    }
    Ok(value::render(input)
        .replacen(&from, &arg_str(args, 1), 1)
        .into())
}

fn remove(input: &Value, args: &[Value]) -> Result<Value, String> {
    replace(input, &[args.first().cloned().unwrap_or(Value::Null)])
}

fn remove_first(input: &Value, args: &[Value]) -> Result<Value, String> {
    replace_first(input, &[args.first().cloned().unwrap_or(Value::Null)])
}

fn split(input: &Value, args: &[Value]) -> Result<Value, String> {
    let s = value::render(input);
    if s.is_empty() {
        return Ok(Value::Array(vec![]));
    }
    let sep = arg_str(args, 0);
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| c.to_string().into()).collect()
    } else {
        s.split(&sep).map(|p| p.to_string().into()).collect()
    };
    Ok(Value::Array(parts))
}

fn truncate(input: &Value, args: &[Value]) -> Result<Value, String> {
    let s = value::render(input);
    let max = match arg_num(args, 0) {
        Num::Int(i) if i > 0 => i as usize,
        _ => return Ok(s.into()),
    };
    if s.chars().count() <= max {
        return Ok(s.into());
    }
    let ellipsis = if args.len() > 1 {
        arg_str(args, 1)
    } else {
        "...".to_string()
    };
    // The target length includes the ellipsis.
    let keep = max.saturating_sub(ellipsis.chars().count());
    let truncated: String = s.chars().take(keep).collect();
    Ok(format!("{truncated}{ellipsis}").into())
}

fn truncatewords(input: &Value, args: &[Value]) -> Result<Value, String> {
    let s = value::render(input);
    let max = match arg_num(args, 0) {
        Num::Int(i) if i > 0 => i as usize,
        _ => 15,
    };
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= max {
        return Ok(s.into());
    }
    let ellipsis = if args.len() > 1 {
        arg_str(args, 1)
    } else {
        "...".to_string()
    };
    Ok(format!("{}{}", words[..max].join(" "), ellipsis).into())
}

// --- Sequence filters ---

fn join(input: &Value, args: &[Value]) -> Result<Value, String> {
    let Value::Array(items) = input else {
        return Ok(input.clone());
    };
    let sep = if args.is_empty() {
        " ".to_string()
    } else {
        arg_str(args, 0)
    };
    let joined = items
        .iter()
        .map(value::render)
        .collect::<Vec<_>>()
        .join(&sep);
    Ok(joined.into())
}

fn first(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Array(items) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s
            .chars()
            .next()
            .map(|c| c.to_string().into())
            .unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

fn last(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Array(items) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s
            .chars()
            .next_back()
            .map(|c| c.to_string().into())
            .unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

fn size(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let n = match input {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.chars().count(),
        _ => 0,
    };
    Ok(Value::from(n as i64))
}

fn reverse(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
        _ => Ok(input.clone()),
    }
}

fn sort(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let Value::Array(items) = input else {
        return Ok(input.clone());
    };
    let mut sorted = items.clone();
    sorted.sort_by(|a, b| match (Num::from_value(a), Num::from_value(b)) {
        (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
        _ => value::render(a).cmp(&value::render(b)),
    });
    Ok(Value::Array(sorted))
}

fn uniq(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let Value::Array(items) = input else {
        return Ok(input.clone());
    };
    let mut unique: Vec<Value> = Vec::new();
    for item in items {
        if !unique.iter().any(|seen| value::values_equal(seen, item)) {
            unique.push(item.clone());
        }
    }
    Ok(Value::Array(unique))
}

fn compact(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Array(items) => Ok(Value::Array(
            items.iter().filter(|v| !v.is_null()).cloned().collect(),
        )),
        _ => Ok(input.clone()),
    }
}

// --- Numeric filters ---

fn plus(input: &Value, args: &[Value]) -> Result<Value, String> {
    let result = match (Num::coerce(input), arg_num(args, 0)) {
        (Num::Int(a), Num::Int(b)) => Num::Int(a + b),
        (a, b) => Num::Float(a.as_f64() + b.as_f64()),
    };
    Ok(result.to_value())
}

fn minus(input: &Value, args: &[Value]) -> Result<Value, String> {
    let result = match (Num::coerce(input), arg_num(args, 0)) {
        (Num::Int(a), Num::Int(b)) => Num::Int(a - b),
        (a, b) => Num::Float(a.as_f64() - b.as_f64()),
    };
    Ok(result.to_value())
}

fn times(input: &Value, args: &[Value]) -> Result<Value, String> {
    let result = match (Num::coerce(input), arg_num(args, 0)) {
        (Num::Int(a), Num::Int(b)) => Num::Int(a * b),
        (a, b) => Num::Float(a.as_f64() * b.as_f64()),
    };
    Ok(result.to_value())
}

fn divided_by(input: &Value, args: &[Value]) -> Result<Value, String> {
    let result = match (Num::coerce(input), arg_num(args, 0)) {
        (_, Num::Int(0)) => return Err("division by zero".to_string()),
        (_, Num::Float(b)) if b == 0.0 => return Err("division by zero".to_string()),
        // An integer divisor keeps the result integral, rounded down.
        (a, Num::Int(b)) => Num::Int((a.as_f64() / b as f64).floor() as i64),
        (a, b) => Num::Float(a.as_f64() / b.as_f64()),
    };
    Ok(result.to_value())
}

fn modulo(input: &Value, args: &[Value]) -> Result<Value, String> {
    let result = match (Num::coerce(input), arg_num(args, 0)) {
        (_, Num::Int(0)) => return Err("division by zero".to_string()),
        (_, Num::Float(b)) if b == 0.0 => return Err("division by zero".to_string()),
        (Num::Int(a), Num::Int(b)) => Num::Int(a % b),
        (a, b) => Num::Float(a.as_f64() % b.as_f64()),
    };
    Ok(result.to_value())
}

fn abs(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let result = match Num::coerce(input) {
        Num::Int(i) => Num::Int(i.abs()),
        Num::Float(f) => Num::Float(f.abs()),
    };
    Ok(result.to_value())
}

fn ceil(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(Num::coerce(input).as_f64().ceil() as i64))
}

fn floor(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(Num::coerce(input).as_f64().floor() as i64))
}

fn round(input: &Value, args: &[Value]) -> Result<Value, String> {
    let n = Num::coerce(input).as_f64();
    match arg_num(args, 0) {
        Num::Int(p) if p > 0 => {
            let scale = 10f64.powi(p as i32);
            Ok(Value::from((n * scale).round() / scale))
        }
        _ => Ok(Value::from(n.round() as i64)),
    }
}

// --- Misc ---

fn default_filter(input: &Value, args: &[Value]) -> Result<Value, String> {
    let empty = match input {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty {
        Ok(args.first().cloned().unwrap_or(Value::Null))
    } else {
        Ok(input.clone())
    }
}
