//! Expression and template evaluation
//!
//! Scripts reference state through a small expression language:
//! `$vars.a.b`, `$input.x`, `$len(expr)`, `$map(expr, 'prop')`, boolean
//! comparisons, and `{{ path }}` template placeholders. Deterministic and
//! side-effect free.

use serde_json::Value;

use crate::error::EngineError;
use crate::types::CiMap;

const COMPARISON_OPS: [&str; 6] = ["==", "!=", "<=", ">=", "<", ">"];

/// Variable bags an expression resolves against.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub vars: CiMap<Value>,
    pub input: CiMap<Value>,
}

enum Root {
    Vars,
    Input,
}

impl EvalContext {
    pub fn new(vars: CiMap<Value>, input: CiMap<Value>) -> Self {
        Self { vars, input }
    }

    /// Syntactic guard applied to extract-input expressions and if
    /// conditions.
    pub fn is_valid_expression(expr: &str) -> bool {
        let expr = expr.trim_start();
        expr.starts_with("$vars.")
            || expr.starts_with("$input.")
            || expr.starts_with("$len(")
            || expr.starts_with("$map(")
    }

    /// Evaluate an expression. Unresolved paths yield JSON null; text not
    /// starting with `$` evaluates to itself.
    pub fn evaluate(&self, expr: &str) -> Result<Value, EngineError> {
        let expr = expr.trim();

        if let Some(inner) = call_body(expr, "$len(") {
            let value = self.evaluate(inner)?;
            return Ok(Value::from(length_of(&value)));
        }
        if let Some(inner) = call_body(expr, "$map(") {
            let (source, property) = split_map_args(inner)?;
            let value = self.evaluate(source)?;
            return Ok(map_property(&value, property));
        }
        if let Some(path) = expr.strip_prefix("$vars.") {
            return Ok(self.resolve(Root::Vars, path).unwrap_or(Value::Null));
        }
        if let Some(path) = expr.strip_prefix("$input.") {
            return Ok(self.resolve(Root::Input, path).unwrap_or(Value::Null));
        }
        if expr.starts_with('$') {
            return Err(EngineError::invalid_expression());
        }
        Ok(Value::String(expr.to_string()))
    }

    /// Evaluate a condition: `LEFT OP RIGHT` comparison, or truthiness of
    /// a single expression.
    pub fn evaluate_bool(&self, condition: &str) -> Result<bool, EngineError> {
        if let Some((left, op, right)) = split_comparison(condition) {
            let lhs = self.evaluate(left)?;
            let rhs = self.evaluate(right)?;
            return Ok(compare(op, &lhs, &rhs));
        }
        Ok(truthy(&self.evaluate(condition)?))
    }

    /// Replace `{{ path }}` placeholders where `path` starts with `vars.`
    /// or `input.`. Unmatched placeholders pass through verbatim.
    pub fn render_template(&self, template: &str) -> String {
        let mut out = String::new();
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else {
                out.push_str(&rest[open..]);
                return out;
            };
            let raw = &after[..close];
            let path = raw.trim();
            let resolved = if let Some(tail) = path.strip_prefix("vars.") {
                self.resolve(Root::Vars, tail)
            } else if let Some(tail) = path.strip_prefix("input.") {
                self.resolve(Root::Input, tail)
            } else {
                None
            };
            match resolved {
                Some(value) => out.push_str(&value_to_text(&value)),
                None => {
                    out.push_str("{{");
                    out.push_str(raw);
                    out.push_str("}}");
                }
            }
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        out
    }

    /// Dot-path resolution. The top-level bag lookup is case-insensitive;
    /// nested object keys match exactly.
    fn resolve(&self, root: Root, path: &str) -> Option<Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let bag = match root {
            Root::Vars => &self.vars,
            Root::Input => &self.input,
        };
        let mut current = bag.get(first)?.clone();
        for part in parts {
            current = current.as_object()?.get(part)?.clone();
        }
        Some(current)
    }
}

/// Extract the argument text of `prefix(...)`-shaped calls.
fn call_body<'a>(expr: &'a str, prefix: &str) -> Option<&'a str> {
    expr.strip_prefix(prefix)?.strip_suffix(')')
}

fn split_map_args(inner: &str) -> Result<(&str, &str), EngineError> {
    let comma = inner
        .rfind(',')
        .ok_or_else(EngineError::invalid_expression)?;
    let source = inner[..comma].trim();
    let property = inner[comma + 1..]
        .trim()
        .trim_matches(|c| c == '\'' || c == '"');
    if source.is_empty() || property.is_empty() {
        return Err(EngineError::invalid_expression());
    }
    Ok((source, property))
}

/// `$len` semantics: array length, string code-point count, object entry
/// count, 0 otherwise.
fn length_of(value: &Value) -> u64 {
    match value {
        Value::Array(items) => items.len() as u64,
        Value::String(text) => text.chars().count() as u64,
        Value::Object(entries) => entries.len() as u64,
        _ => 0,
    }
}

/// `$map` semantics: project `item[property]` over an array, skipping
/// non-object items; a missing property yields null.
fn map_property(value: &Value, property: &str) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| item.as_object())
                .map(|object| object.get(property).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn split_comparison(condition: &str) -> Option<(&str, &str, &str)> {
    for (index, _) in condition.char_indices() {
        for op in COMPARISON_OPS {
            if condition[index..].starts_with(op) {
                let left = condition[..index].trim();
                let right = condition[index + op.len()..].trim();
                if left.is_empty() || right.is_empty() {
                    return None;
                }
                return Some((left, op, right));
            }
        }
    }
    None
}

/// Compare numerically when both sides parse as numbers, else by string
/// ordinal.
fn compare(op: &str, lhs: &Value, rhs: &Value) -> bool {
    if let (Some(left), Some(right)) = (as_number(lhs), as_number(rhs)) {
        return match op {
            "==" => left == right,
            "!=" => left != right,
            "<" => left < right,
            "<=" => left <= right,
            ">" => left > right,
            ">=" => left >= right,
            _ => false,
        };
    }
    let left = value_to_text(lhs);
    let right = value_to_text(rhs);
    match op {
        "==" => left == right,
        "!=" => left != right,
        "<" => left < right,
        "<=" => left <= right,
        ">" => left > right,
        ">=" => left >= right,
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Truthiness: non-null, non-empty string, non-false boolean.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}
