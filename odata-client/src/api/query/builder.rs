//! Rendering of option values into OData query grammar
//!
//! Values are plain JSON so that options can be built from literals, snapshots
//! or CLI input alike. A `{"$raw": "..."}` object is emitted verbatim wherever a
//! literal would be.

use super::options::{OptionValue, QueryOption};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Marker key of a raw (pre-rendered) literal
pub const RAW: &str = "$raw";

const COMPARISON_OPERATORS: [&str; 7] = ["eq", "ne", "gt", "ge", "lt", "le", "has"];
const FUNCTION_OPERATORS: [&str; 3] = ["contains", "startswith", "endswith"];
const LAMBDA_OPERATORS: [&str; 2] = ["any", "all"];
const LAMBDA_VARIABLE: &str = "x";

/// Wrap pre-rendered text so it is emitted unquoted
pub fn raw(text: impl Into<String>) -> Value {
    let mut map = Map::new();
    map.insert(RAW.to_string(), Value::String(text.into()));
    Value::Object(map)
}

pub fn as_raw(value: &Value) -> Option<&str> {
    match value.as_object() {
        Some(map) if map.len() == 1 => map.get(RAW).and_then(Value::as_str),
        _ => None,
    }
}

/// Untyped URL literal: strings quoted with `'` doubled, raw values verbatim
pub fn literal(value: &Value) -> String {
    if let Some(text) = as_raw(value) {
        return text.to_string();
    }
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(json_literal).collect::<Vec<_>>().join(",")
        ),
        Value::Object(_) => value.to_string(),
    }
}

fn json_literal(value: &Value) -> String {
    match as_raw(value) {
        Some(text) => text.to_string(),
        None => value.to_string(),
    }
}

pub fn guid(id: Uuid) -> Value {
    raw(id.to_string())
}

pub fn datetime(at: DateTime<Utc>) -> Value {
    raw(at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub fn duration(iso: &str) -> Value {
    raw(format!("duration'{}'", iso))
}

/// Enum literal `Ns.Type'Member'`
pub fn enum_member(type_name: &str, member: &str) -> Value {
    raw(format!("{}'{}'", type_name, member))
}

/// Reference to a parameter alias, `@name`
pub fn alias(name: &str) -> Value {
    raw(format!("@{}", name))
}

/// Render one reserved option; `None` when it renders to nothing
pub fn render_option(option: QueryOption, value: &OptionValue) -> Option<String> {
    let json = value.to_json();
    let text = match option {
        QueryOption::Select => render_select(&json),
        QueryOption::Filter => render_filter(&json),
        QueryOption::OrderBy => render_order_by(&json),
        QueryOption::Expand => render_expand(&json),
        QueryOption::Transform => render_transform(&json),
        QueryOption::Search
        | QueryOption::Top
        | QueryOption::Skip
        | QueryOption::Skiptoken
        | QueryOption::Format => scalar_text(&json),
    };
    Some(text).filter(|t| !t.is_empty())
}

/// Text of a scalar option value
pub fn scalar_text(value: &Value) -> String {
    if let Some(text) = as_raw(value) {
        return text.to_string();
    }
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

pub fn render_select(value: &Value) -> String {
    let mut items = Vec::new();
    collect_select(value, "", &mut items);
    items.join(",")
}

fn collect_select(value: &Value, prefix: &str, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(format!("{}{}", prefix, s)),
        Value::Array(items) => items.iter().for_each(|v| collect_select(v, prefix, out)),
        Value::Object(map) => {
            for (name, nested) in map {
                let path = format!("{}{}/", prefix, name);
                match nested {
                    Value::Null | Value::Bool(true) => out.push(format!("{}{}", prefix, name)),
                    _ => collect_select(nested, &path, out),
                }
            }
        }
        other => out.push(format!("{}{}", prefix, other)),
    }
}

pub fn render_order_by(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            // [field, direction] pair
            if items.len() == 2
                && items.iter().all(Value::is_string)
                && is_direction(items[1].as_str().unwrap_or_default())
            {
                return format!(
                    "{} {}",
                    items[0].as_str().unwrap_or_default(),
                    items[1].as_str().unwrap_or_default()
                );
            }
            items
                .iter()
                .map(render_order_by)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(",")
        }
        Value::Object(map) => map
            .iter()
            .map(|(field, dir)| match dir.as_str() {
                Some(dir) if !dir.is_empty() => format!("{} {}", field, dir),
                _ => field.clone(),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => scalar_text(other),
    }
}

fn is_direction(text: &str) -> bool {
    matches!(text.to_ascii_lowercase().as_str(), "asc" | "desc")
}

pub fn render_filter(value: &Value) -> String {
    render_filter_with_prefix(value, "")
}

fn render_filter_with_prefix(value: &Value, prefix: &str) -> String {
    if let Some(text) = as_raw(value) {
        return text.to_string();
    }
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => join_clauses(
            items
                .iter()
                .map(|v| render_filter_with_prefix(v, prefix))
                .collect(),
            "and",
        ),
        Value::Object(map) => join_clauses(filter_object_clauses(map, prefix), "and"),
        other => scalar_text(other),
    }
}

fn join_clauses(clauses: Vec<String>, op: &str) -> String {
    let clauses: Vec<String> = clauses.into_iter().filter(|c| !c.is_empty()).collect();
    match clauses.len() {
        0 => String::new(),
        1 => clauses.into_iter().next().unwrap_or_default(),
        _ => clauses
            .iter()
            .map(|c| format!("({})", c))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", op)),
    }
}

fn filter_object_clauses(map: &Map<String, Value>, prefix: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    for (key, value) in map {
        match key.to_ascii_lowercase().as_str() {
            op @ ("and" | "or") => {
                let parts = match value {
                    Value::Array(items) => items
                        .iter()
                        .map(|v| render_filter_with_prefix(v, prefix))
                        .collect(),
                    Value::Object(inner) => filter_object_clauses(inner, prefix),
                    other => vec![render_filter_with_prefix(other, prefix)],
                };
                let joined = join_clauses(parts, op);
                if !joined.is_empty() {
                    clauses.push(joined);
                }
            }
            "not" => {
                let inner = render_filter_with_prefix(value, prefix);
                if !inner.is_empty() {
                    clauses.push(format!("not ({})", inner));
                }
            }
            _ => clauses.extend(property_clauses(&format!("{}{}", prefix, key), value)),
        }
    }
    clauses
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map.keys().all(|k| {
            let k = k.to_ascii_lowercase();
            COMPARISON_OPERATORS.contains(&k.as_str())
                || FUNCTION_OPERATORS.contains(&k.as_str())
                || LAMBDA_OPERATORS.contains(&k.as_str())
                || k == "in"
        })
}

fn property_clauses(path: &str, value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => vec![in_clause(path, items)],
        Value::Object(map) if as_raw(value).is_none() && is_operator_object(map) => map
            .iter()
            .map(|(op, operand)| operator_clause(path, &op.to_ascii_lowercase(), operand))
            .collect(),
        Value::Object(map) if as_raw(value).is_none() => {
            filter_object_clauses(map, &format!("{}/", path))
        }
        other => vec![format!("{} eq {}", path, literal(other))],
    }
}

fn operator_clause(path: &str, op: &str, operand: &Value) -> String {
    match op {
        "in" => match operand {
            Value::Array(items) => in_clause(path, items),
            other => format!("{} in ({})", path, literal(other)),
        },
        "contains" | "startswith" | "endswith" => {
            format!("{}({},{})", op, path, literal(operand))
        }
        "any" | "all" => {
            let prefix = format!("{}/", LAMBDA_VARIABLE);
            let body = match operand {
                Value::String(s) => s.clone(),
                other => render_filter_with_prefix(other, &prefix),
            };
            format!("{}/{}({}:{})", path, op, LAMBDA_VARIABLE, body)
        }
        _ => format!("{} {} {}", path, op, literal(operand)),
    }
}

fn in_clause(path: &str, items: &[Value]) -> String {
    format!(
        "{} in ({})",
        path,
        items.iter().map(literal).collect::<Vec<_>>().join(",")
    )
}

pub fn render_expand(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_expand)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(map) => map
            .iter()
            .map(|(nav, options)| match options {
                Value::Object(sub) if !sub.is_empty() => {
                    let sub = render_expand_options(sub);
                    if sub.is_empty() {
                        nav.clone()
                    } else {
                        format!("{}({})", nav, sub)
                    }
                }
                _ => nav.clone(),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => scalar_text(other),
    }
}

/// `$select=..;$filter=..` inside an expanded navigation
fn render_expand_options(options: &Map<String, Value>) -> String {
    const ORDER: [&str; 9] = [
        "select", "filter", "search", "orderby", "top", "skip", "count", "levels", "expand",
    ];
    let mut parts = Vec::new();
    for name in ORDER {
        let Some(value) = options
            .iter()
            .find(|(k, _)| k.strip_prefix('$').unwrap_or(k).eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
        else {
            continue;
        };
        let text = match name {
            "select" => render_select(value),
            "filter" => render_filter(value),
            "orderby" => render_order_by(value),
            "expand" => render_expand(value),
            _ => scalar_text(value),
        };
        if !text.is_empty() {
            parts.push(format!("${}={}", name, text));
        }
    }
    parts.join(";")
}

/// `$apply` transformations: `filter`, `groupBy`, `aggregate`, joined with `/`
pub fn render_transform(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_transform)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/"),
        Value::Object(map) => {
            let mut steps = Vec::new();
            if let Some(filter) = entry_ci(map, "filter") {
                let text = render_filter(filter);
                if !text.is_empty() {
                    steps.push(format!("filter({})", text));
                }
            }
            if let Some(group_by) = entry_ci(map, "groupby") {
                steps.push(render_group_by(group_by));
            }
            if let Some(aggregate) = entry_ci(map, "aggregate") {
                steps.push(render_aggregate(aggregate));
            }
            steps.join("/")
        }
        other => scalar_text(other),
    }
}

fn entry_ci<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn render_group_by(value: &Value) -> String {
    let (properties, transform) = match value {
        Value::Object(map) => (
            entry_ci(map, "properties").cloned().unwrap_or(Value::Null),
            entry_ci(map, "transform"),
        ),
        other => (other.clone(), None),
    };
    let properties = render_select(&properties);
    match transform.map(render_transform).filter(|t| !t.is_empty()) {
        Some(transform) => format!("groupby(({}),{})", properties, transform),
        None => format!("groupby(({}))", properties),
    }
}

fn render_aggregate(value: &Value) -> String {
    let expressions = match value {
        Value::Object(map) => map
            .iter()
            .map(|(property, method)| match method {
                Value::Object(method) => {
                    let with = entry_ci(method, "with").and_then(Value::as_str).unwrap_or("sum");
                    let name = entry_ci(method, "as")
                        .and_then(Value::as_str)
                        .unwrap_or(property.as_str());
                    format!("{} with {} as {}", property, with, name)
                }
                other => format!("{} {}", property, scalar_text(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(","),
        other => scalar_text(other),
    };
    format!("aggregate({})", expressions)
}
