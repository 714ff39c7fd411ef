//! Query option set
//!
//! Each option holds one [`OptionValue`] in one of three shapes. Shape changes
//! (scalar to list, list back to scalar, keyed object creation and disposal) are
//! pure functions over `Option<OptionValue>` so they can be tested on their own;
//! [`OptionHandle`] applies them to a slot in place.

use super::builder;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved system query options, declared in serialization order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryOption {
    Select,
    Filter,
    Search,
    Transform,
    OrderBy,
    Top,
    Skip,
    Skiptoken,
    Expand,
    Format,
}

impl QueryOption {
    pub const ALL: [QueryOption; 10] = [
        QueryOption::Select,
        QueryOption::Filter,
        QueryOption::Search,
        QueryOption::Transform,
        QueryOption::OrderBy,
        QueryOption::Top,
        QueryOption::Skip,
        QueryOption::Skiptoken,
        QueryOption::Expand,
        QueryOption::Format,
    ];

    /// Name of the query-string parameter
    pub fn param_name(&self) -> &'static str {
        match self {
            QueryOption::Select => "$select",
            QueryOption::Filter => "$filter",
            QueryOption::Search => "$search",
            QueryOption::Transform => "$apply",
            QueryOption::OrderBy => "$orderby",
            QueryOption::Top => "$top",
            QueryOption::Skip => "$skip",
            QueryOption::Skiptoken => "$skiptoken",
            QueryOption::Expand => "$expand",
            QueryOption::Format => "$format",
        }
    }

    /// Name used in resource snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOption::Select => "select",
            QueryOption::Filter => "filter",
            QueryOption::Search => "search",
            QueryOption::Transform => "transform",
            QueryOption::OrderBy => "orderBy",
            QueryOption::Top => "top",
            QueryOption::Skip => "skip",
            QueryOption::Skiptoken => "skiptoken",
            QueryOption::Expand => "expand",
            QueryOption::Format => "format",
        }
    }

    /// Accepts snapshot names and protocol names (`orderBy`, `$orderby`, `apply`)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix('$').unwrap_or(name).to_ascii_lowercase();
        Some(match name.as_str() {
            "select" => QueryOption::Select,
            "filter" => QueryOption::Filter,
            "search" => QueryOption::Search,
            "transform" | "apply" => QueryOption::Transform,
            "orderby" => QueryOption::OrderBy,
            "top" => QueryOption::Top,
            "skip" => QueryOption::Skip,
            "skiptoken" => QueryOption::Skiptoken,
            "expand" => QueryOption::Expand,
            "format" => QueryOption::Format,
            _ => return None,
        })
    }
}

impl fmt::Display for QueryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored value of one option
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Scalar(Value),
    List(Vec<Value>),
    Keyed(Map<String, Value>),
}

impl OptionValue {
    /// `Null` means "no value"; arrays become lists and objects keyed entries
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(items) => Some(OptionValue::List(items)),
            Value::Object(map) => Some(OptionValue::Keyed(map)),
            other => Some(OptionValue::Scalar(other)),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            OptionValue::Scalar(v) => v.clone(),
            OptionValue::List(items) => Value::Array(items.clone()),
            OptionValue::Keyed(map) => Value::Object(map.clone()),
        }
    }

    /// Collapse a list by its length: empty to nothing, one element to a scalar
    fn demote(items: Vec<Value>) -> Option<Self> {
        match items.len() {
            0 => None,
            1 => items.into_iter().next().and_then(Self::from_json),
            _ => Some(OptionValue::List(items)),
        }
    }

    /// Append `value`, promoting to a list
    pub fn pushed(current: Option<Self>, value: Value) -> Self {
        match current {
            None => OptionValue::List(vec![value]),
            Some(OptionValue::Scalar(s)) => OptionValue::List(vec![s, value]),
            Some(OptionValue::Keyed(map)) => OptionValue::List(vec![Value::Object(map), value]),
            Some(OptionValue::List(mut items)) => {
                items.push(value);
                OptionValue::List(items)
            }
        }
    }

    /// Drop every element equal to `value`, demoting the list when it shrinks to one
    pub fn removed(current: Option<Self>, value: &Value) -> Option<Self> {
        match current {
            None => None,
            Some(OptionValue::List(items)) => {
                Self::demote(items.into_iter().filter(|v| v != value).collect())
            }
            Some(OptionValue::Scalar(s)) if &s == value => None,
            Some(OptionValue::Keyed(map)) if &Value::Object(map.clone()) == value => None,
            other => other,
        }
    }

    /// Set a named sub-field, creating the keyed object on first use
    pub fn with_entry(current: Option<Self>, key: &str, value: Value) -> Self {
        match current {
            None => {
                let mut map = Map::new();
                map.insert(key.to_string(), value);
                OptionValue::Keyed(map)
            }
            Some(OptionValue::Keyed(mut map)) | Some(OptionValue::Scalar(Value::Object(mut map))) => {
                map.insert(key.to_string(), value);
                OptionValue::Keyed(map)
            }
            Some(OptionValue::Scalar(s)) => {
                let mut map = Map::new();
                map.insert(key.to_string(), value);
                OptionValue::List(vec![s, Value::Object(map)])
            }
            Some(OptionValue::List(mut items)) => {
                match items.iter_mut().find_map(|v| v.as_object_mut()) {
                    Some(map) => {
                        map.insert(key.to_string(), value);
                    }
                    None => {
                        let mut map = Map::new();
                        map.insert(key.to_string(), value);
                        items.push(Value::Object(map));
                    }
                }
                OptionValue::List(items)
            }
        }
    }

    /// Remove a named sub-field, discarding objects that become empty
    pub fn without_entry(current: Option<Self>, key: &str) -> Option<Self> {
        match current {
            None => None,
            Some(OptionValue::Keyed(mut map)) | Some(OptionValue::Scalar(Value::Object(mut map))) => {
                map.remove(key);
                if map.is_empty() {
                    None
                } else {
                    Some(OptionValue::Keyed(map))
                }
            }
            Some(OptionValue::List(items)) => {
                let items = items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Object(mut map) => {
                            map.remove(key);
                            if map.is_empty() { None } else { Some(Value::Object(map)) }
                        }
                        other => Some(other),
                    })
                    .collect();
                Self::demote(items)
            }
            other => other,
        }
    }

    /// Named sub-field of the keyed shape (or of the first object in a list)
    pub fn entry(&self, key: &str) -> Option<&Value> {
        match self {
            OptionValue::Keyed(map) => map.get(key),
            OptionValue::Scalar(Value::Object(map)) => map.get(key),
            OptionValue::List(items) => items.iter().find_map(|v| v.as_object()?.get(key)),
            OptionValue::Scalar(_) => None,
        }
    }

    /// Element at `index`; a scalar behaves like a one-element list
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            OptionValue::List(items) => items.get(index),
            OptionValue::Scalar(v) if index == 0 => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OptionValue::List(items) => items.len(),
            OptionValue::Keyed(map) => map.len(),
            OptionValue::Scalar(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutable view of one slot of an option map
pub struct OptionHandle<'a, K: Ord + Copy> {
    slots: &'a mut BTreeMap<K, OptionValue>,
    name: K,
}

impl<'a, K: Ord + Copy> OptionHandle<'a, K> {
    pub fn new(slots: &'a mut BTreeMap<K, OptionValue>, name: K) -> Self {
        Self { slots, name }
    }

    fn update(&mut self, f: impl FnOnce(Option<OptionValue>) -> Option<OptionValue>) {
        let current = self.slots.remove(&self.name);
        if let Some(next) = f(current) {
            self.slots.insert(self.name, next);
        }
    }

    pub fn value(&self) -> Option<&OptionValue> {
        self.slots.get(&self.name)
    }

    /// Replace the whole value; `Null` clears it
    pub fn assign(&mut self, value: Value) -> &mut Self {
        self.update(|_| OptionValue::from_json(value));
        self
    }

    pub fn replace(&mut self, value: OptionValue) -> &mut Self {
        self.update(|_| Some(value));
        self
    }

    pub fn push(&mut self, value: Value) -> &mut Self {
        self.update(|current| Some(OptionValue::pushed(current, value)));
        self
    }

    pub fn remove(&mut self, value: &Value) -> &mut Self {
        self.update(|current| OptionValue::removed(current, value));
        self
    }

    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.update(|current| Some(OptionValue::with_entry(current, key, value)));
        self
    }

    pub fn unset(&mut self, key: &str) -> &mut Self {
        self.update(|current| OptionValue::without_entry(current, key));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value().and_then(|v| v.entry(key))
    }

    pub fn at(&self, index: usize) -> Option<&Value> {
        self.value().and_then(|v| v.at(index))
    }

    /// True when a value is present, or with `Some(key)`, when that sub-field is present
    pub fn has(&self, key: Option<&str>) -> bool {
        match key {
            Some(key) => self.get(key).is_some(),
            None => self.value().is_some(),
        }
    }

    pub fn clear(&mut self) {
        self.slots.remove(&self.name);
    }
}

/// Named value that filter expressions can reference as `@name`
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub value: Value,
}

impl Alias {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Raw reference to embed in filters
    pub fn reference(&self) -> Value {
        builder::raw(format!("@{}", self.name))
    }
}

/// The options of one resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    options: BTreeMap<QueryOption, OptionValue>,
    custom: BTreeMap<String, String>,
    aliases: Vec<Alias>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn option(&mut self, name: QueryOption) -> OptionHandle<'_, QueryOption> {
        OptionHandle::new(&mut self.options, name)
    }

    pub fn get(&self, name: QueryOption) -> Option<&OptionValue> {
        self.options.get(&name)
    }

    pub fn has(&self, name: QueryOption) -> bool {
        self.options.contains_key(&name)
    }

    pub fn remove(&mut self, name: QueryOption) -> Option<OptionValue> {
        self.options.remove(&name)
    }

    /// Drop every reserved option not listed
    pub fn keep(&mut self, names: &[QueryOption]) {
        self.options.retain(|k, _| names.contains(k));
    }

    pub fn clear(&mut self) {
        self.options.clear();
        self.custom.clear();
        self.aliases.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty() && self.custom.is_empty() && self.aliases.is_empty()
    }

    pub fn custom(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.custom.insert(name.into(), value.into());
        self
    }

    pub fn remove_custom(&mut self, name: &str) -> Option<String> {
        self.custom.remove(name)
    }

    pub fn custom_params(&self) -> &BTreeMap<String, String> {
        &self.custom
    }

    /// Add an alias or update the value of an existing one with the same name
    pub fn alias(&mut self, name: impl Into<String>, value: Value) -> Alias {
        let alias = Alias::new(name, value);
        match self.aliases.iter_mut().find(|a| a.name == alias.name) {
            Some(existing) => existing.value = alias.value.clone(),
            None => self.aliases.push(alias.clone()),
        }
        alias
    }

    pub fn find_alias(&self, name: &str) -> Option<&Alias> {
        self.aliases.iter().find(|a| a.name == name)
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Flat parameter list: reserved options in canonical order, aliases, then custom
    pub fn params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        for (option, value) in &self.options {
            if let Some(text) = builder::render_option(*option, value) {
                params.insert(option.param_name(), text);
            }
        }
        for alias in &self.aliases {
            params.insert(format!("@{}", alias.name), builder::literal(&alias.value));
        }
        for (name, value) in &self.custom {
            params.insert(name.clone(), value.clone());
        }
        params
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (option, value) in &self.options {
            map.insert(option.as_str().to_string(), value.to_json());
        }
        if !self.custom.is_empty() {
            let custom: Map<String, Value> = self
                .custom
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            map.insert("custom".to_string(), Value::Object(custom));
        }
        if !self.aliases.is_empty() {
            let aliases: Map<String, Value> = self
                .aliases
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect();
            map.insert("aliases".to_string(), Value::Object(aliases));
        }
        Value::Object(map)
    }

    /// Restore from [`to_json`](Self::to_json); unknown names are ignored
    pub fn from_json(value: &Value) -> Self {
        let mut options = QueryOptions::new();
        let Some(map) = value.as_object() else {
            return options;
        };
        for (name, value) in map {
            match name.as_str() {
                "custom" => {
                    for (k, v) in value.as_object().into_iter().flatten() {
                        let text = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                        options.custom.insert(k.clone(), text);
                    }
                }
                "aliases" => {
                    for (k, v) in value.as_object().into_iter().flatten() {
                        options.alias(k.clone(), v.clone());
                    }
                }
                other => {
                    if let Some(option) = QueryOption::from_name(other) {
                        options.option(option).assign(value.clone());
                    }
                }
            }
        }
        options
    }
}

/// Ordered name/value pairs handed to the transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing an existing entry with the same name in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(index).1)
    }

    pub fn extend(&mut self, other: &QueryParams) {
        for (name, value) in &other.0 {
            self.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `name=value&...` with percent-encoded values
    pub fn to_query_string(&self) -> String {
        self.0
            .iter()
            .map(|(n, v)| format!("{}={}", n, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut params = QueryParams::new();
        for (n, v) in iter {
            params.insert(n, v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_promotes_scalar_to_list() {
        let value = OptionValue::pushed(Some(OptionValue::Scalar(json!("Name"))), json!("Price"));
        assert_eq!(value, OptionValue::List(vec![json!("Name"), json!("Price")]));
    }

    #[test]
    fn test_remove_demotes_to_scalar() {
        let list = OptionValue::List(vec![json!("Name"), json!("Price")]);
        let value = OptionValue::removed(Some(list), &json!("Price"));
        assert_eq!(value, Some(OptionValue::Scalar(json!("Name"))));

        let value = OptionValue::removed(value, &json!("Name"));
        assert_eq!(value, None);
    }

    #[test]
    fn test_remove_demotes_object_to_keyed() {
        let list = OptionValue::List(vec![json!({"Name": "Chai"}), json!("Price gt 5")]);
        let value = OptionValue::removed(Some(list), &json!("Price gt 5"));
        let mut expected = Map::new();
        expected.insert("Name".to_string(), json!("Chai"));
        assert_eq!(value, Some(OptionValue::Keyed(expected)));
    }

    #[test]
    fn test_set_and_unset_keyed_entries() {
        let value = OptionValue::with_entry(None, "Name", json!("Chai"));
        let value = OptionValue::with_entry(Some(value), "Price", json!({"gt": 5}));
        assert_eq!(value.entry("Price"), Some(&json!({"gt": 5})));

        let value = OptionValue::without_entry(Some(value), "Name");
        let value = OptionValue::without_entry(value, "Price");
        assert_eq!(value, None);
    }

    #[test]
    fn test_set_on_scalar_appends_object() {
        let value = OptionValue::with_entry(
            Some(OptionValue::Scalar(json!("Price gt 5"))),
            "Name",
            json!("Chai"),
        );
        assert_eq!(
            value,
            OptionValue::List(vec![json!("Price gt 5"), json!({"Name": "Chai"})])
        );
        let value = OptionValue::without_entry(Some(value), "Name");
        assert_eq!(value, Some(OptionValue::Scalar(json!("Price gt 5"))));
    }

    #[test]
    fn test_handle_mutates_in_place() {
        let mut options = QueryOptions::new();
        options.option(QueryOption::Select).push(json!("Name")).push(json!("Price"));
        assert_eq!(options.get(QueryOption::Select).map(OptionValue::len), Some(2));
        assert_eq!(options.option(QueryOption::Select).at(1), Some(&json!("Price")));

        options.option(QueryOption::Filter).set("Name", json!("Chai"));
        assert!(options.option(QueryOption::Filter).has(Some("Name")));
        options.option(QueryOption::Filter).unset("Name");
        assert!(!options.has(QueryOption::Filter));

        options.option(QueryOption::Select).clear();
        assert!(options.is_empty());
    }

    #[test]
    fn test_alias_is_append_or_update() {
        let mut options = QueryOptions::new();
        options.alias("p1", json!(5));
        options.alias("p2", json!("x"));
        options.alias("p1", json!(7));
        assert_eq!(options.aliases().len(), 2);
        assert_eq!(options.find_alias("p1").map(|a| a.value.clone()), Some(json!(7)));
    }

    #[test]
    fn test_params_canonical_order_and_custom_override() {
        let mut options = QueryOptions::new();
        options.option(QueryOption::Top).assign(json!(10));
        options.option(QueryOption::Expand).assign(json!("Category"));
        options.option(QueryOption::Select).assign(json!(["Name", "Price"]));
        let alias = options.alias("min", json!(5));
        options
            .option(QueryOption::Filter)
            .assign(json!({"Price": {"gt": alias.reference()}}));
        options.custom("debug", "true");
        options.custom("$top", "3");

        let params = options.params();
        let names: Vec<&str> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["$select", "$filter", "$top", "$expand", "@min", "debug"]);
        assert_eq!(params.get("$select"), Some("Name,Price"));
        assert_eq!(params.get("$filter"), Some("Price gt @min"));
        assert_eq!(params.get("@min"), Some("5"));
        assert_eq!(params.get("$top"), Some("3"));
    }

    #[test]
    fn test_json_snapshot_restores_options() {
        let mut options = QueryOptions::new();
        options.option(QueryOption::OrderBy).assign(json!(["Name", ["Price", "desc"]]));
        options.custom("x", "1");
        options.alias("a", json!("b"));

        let restored = QueryOptions::from_json(&options.to_json());
        assert_eq!(restored, options);
    }

    #[test]
    fn test_query_string_encodes_values() {
        let params: QueryParams = vec![("$filter", "Name eq 'A&B'"), ("$top", "5")]
            .into_iter()
            .collect();
        assert_eq!(
            params.to_query_string(),
            "$filter=Name%20eq%20%27A%26B%27&$top=5"
        );
    }
}
