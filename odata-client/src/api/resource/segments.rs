//! Path segment chain
//!
//! A resource address is an ordered list of segments. Keys and function
//! parameters are segment options and use the same value shapes as query options.

use crate::api::metadata::TypeRegistry;
use crate::api::query::builder::literal;
use crate::api::query::{OptionHandle, OptionValue};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    EntitySet,
    Singleton,
    /// Derived-type cast, `Products/Demo.SpecialProduct`
    TypeName,
    NavigationProperty,
    Property,
    Function,
    Action,
    Value,
    Ref,
    Count,
    Metadata,
    Batch,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::EntitySet => "entitySet",
            SegmentKind::Singleton => "singleton",
            SegmentKind::TypeName => "typeName",
            SegmentKind::NavigationProperty => "navigationProperty",
            SegmentKind::Property => "property",
            SegmentKind::Function => "function",
            SegmentKind::Action => "action",
            SegmentKind::Value => "value",
            SegmentKind::Ref => "ref",
            SegmentKind::Count => "count",
            SegmentKind::Metadata => "metadata",
            SegmentKind::Batch => "batch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "entitySet" => SegmentKind::EntitySet,
            "singleton" => SegmentKind::Singleton,
            "typeName" => SegmentKind::TypeName,
            "navigationProperty" => SegmentKind::NavigationProperty,
            "property" => SegmentKind::Property,
            "function" => SegmentKind::Function,
            "action" => SegmentKind::Action,
            "value" => SegmentKind::Value,
            "ref" => SegmentKind::Ref,
            "count" => SegmentKind::Count,
            "metadata" => SegmentKind::Metadata,
            "batch" => SegmentKind::Batch,
            _ => return None,
        })
    }

    /// Segments that may carry an entity key
    pub fn is_keyable(&self) -> bool {
        matches!(self, SegmentKind::EntitySet | SegmentKind::NavigationProperty)
    }

    /// Fixed path text of the `$` segments
    fn fixed_path(&self) -> Option<&'static str> {
        match self {
            SegmentKind::Value => Some("$value"),
            SegmentKind::Ref => Some("$ref"),
            SegmentKind::Count => Some("$count"),
            SegmentKind::Metadata => Some("$metadata"),
            SegmentKind::Batch => Some("$batch"),
            _ => None,
        }
    }
}

/// Named options a segment can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentOption {
    Key,
    Parameters,
}

impl SegmentOption {
    fn as_str(&self) -> &'static str {
        match self {
            SegmentOption::Key => "key",
            SegmentOption::Parameters => "parameters",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub name: String,
    /// Type addressed by this segment (entity type, property type or callable return type)
    pub type_name: Option<String>,
    /// The segment addresses a collection
    pub collection: bool,
    options: BTreeMap<SegmentOption, OptionValue>,
}

impl Segment {
    pub fn new(kind: SegmentKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let name = match kind.fixed_path() {
            Some(fixed) => fixed.to_string(),
            None => name,
        };
        Self {
            kind,
            name,
            type_name: None,
            collection: false,
            options: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, type_name: Option<String>) -> Self {
        self.type_name = type_name;
        self
    }

    pub fn with_collection(mut self, collection: bool) -> Self {
        self.collection = collection;
        self
    }

    pub fn option(&mut self, name: SegmentOption) -> OptionHandle<'_, SegmentOption> {
        OptionHandle::new(&mut self.options, name)
    }

    pub fn key(&self) -> Option<Value> {
        self.options.get(&SegmentOption::Key).map(OptionValue::to_json)
    }

    pub fn set_key(&mut self, key: Option<Value>) {
        self.option(SegmentOption::Key).assign(key.unwrap_or(Value::Null));
    }

    pub fn parameters(&self) -> Option<Value> {
        self.options
            .get(&SegmentOption::Parameters)
            .map(OptionValue::to_json)
    }

    pub fn set_parameters(&mut self, parameters: Value) {
        self.option(SegmentOption::Parameters).assign(parameters);
    }

    /// Path text of this segment, with typed key or parameter literals
    pub fn path(&self, registry: &TypeRegistry) -> String {
        match self.kind {
            SegmentKind::Function => {
                format!("{}({})", self.name, self.parameter_literals(registry))
            }
            _ => match self.key() {
                Some(key) => format!("{}({})", self.name, self.key_literal(registry, &key)),
                None => self.name.clone(),
            },
        }
    }

    fn key_literal(&self, registry: &TypeRegistry, key: &Value) -> String {
        let key_fields = self
            .type_name
            .as_deref()
            .and_then(|t| registry.key_fields(t).ok())
            .unwrap_or_default();
        let typed = |field_type: Option<&str>, value: &Value| -> String {
            field_type
                .and_then(|t| registry.parser(t).ok())
                .map(|p| p.literal(value, registry.string_as_enum()))
                .unwrap_or_else(|| literal(value))
        };

        match key {
            Value::Object(parts) => {
                let mut rendered = Vec::new();
                for field in &key_fields {
                    if let Some(value) = parts.get(&field.name) {
                        rendered.push(format!(
                            "{}={}",
                            field.name,
                            typed(Some(&field.field_type), value)
                        ));
                    }
                }
                for (name, value) in parts {
                    if !key_fields.iter().any(|f| &f.name == name) {
                        rendered.push(format!("{}={}", name, typed(None, value)));
                    }
                }
                rendered.join(",")
            }
            scalar => typed(key_fields.first().map(|f| f.field_type.as_str()), scalar),
        }
    }

    fn parameter_literals(&self, registry: &TypeRegistry) -> String {
        let Some(Value::Object(parameters)) = self.parameters() else {
            return String::new();
        };
        let declared = registry
            .find_callable(&self.name)
            .map(|(_, c)| c.parameters.clone())
            .unwrap_or_default();
        parameters
            .iter()
            .map(|(name, value)| {
                let rendered = declared
                    .iter()
                    .find(|p| &p.name == name)
                    .and_then(|p| registry.parser(&p.field_type).ok())
                    .map(|p| p.literal(value, registry.string_as_enum()))
                    .unwrap_or_else(|| literal(value));
                format!("{}={}", name, rendered)
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn to_json(&self) -> Value {
        let mut options = Map::new();
        for (name, value) in &self.options {
            options.insert(name.as_str().to_string(), value.to_json());
        }
        json!({
            "kind": self.kind.as_str(),
            "name": self.name,
            "type": self.type_name,
            "collection": self.collection,
            "options": options,
        })
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        let kind = SegmentKind::from_name(value.get("kind")?.as_str()?)?;
        let name = value.get("name")?.as_str()?;
        let mut segment = Segment::new(kind, name)
            .with_type(value.get("type").and_then(Value::as_str).map(str::to_string))
            .with_collection(value.get("collection").and_then(Value::as_bool).unwrap_or(false));
        if let Some(options) = value.get("options").and_then(Value::as_object) {
            if let Some(key) = options.get("key") {
                segment.set_key(Some(key.clone()));
            }
            if let Some(parameters) = options.get("parameters") {
                segment.set_parameters(parameters.clone());
            }
        }
        Some(segment)
    }
}

/// Ordered segment list owned by one resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathSegments(Vec<Segment>);

impl PathSegments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the last segment of `kind` (matching `name` if given); append one when
    /// absent and a name is given
    pub fn segment(&mut self, kind: SegmentKind, name: Option<&str>) -> Option<&mut Segment> {
        let position = self
            .0
            .iter()
            .rposition(|s| s.kind == kind && name.is_none_or(|n| s.name == n));
        match (position, name) {
            (Some(index), _) => self.0.get_mut(index),
            (None, Some(name)) => {
                self.0.push(Segment::new(kind, name));
                self.0.last_mut()
            }
            (None, None) => None,
        }
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn find(&self, kind: SegmentKind) -> Option<&Segment> {
        self.0.iter().rev().find(|s| s.kind == kind)
    }

    pub fn has(&self, kind: SegmentKind) -> bool {
        self.find(kind).is_some()
    }

    pub fn first(&self) -> Option<&Segment> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Segment> {
        self.0.last_mut()
    }

    /// Last segment that is not a type cast
    pub fn last_addressed(&self) -> Option<&Segment> {
        self.0.iter().rev().find(|s| s.kind != SegmentKind::TypeName)
    }

    pub fn last_addressed_mut(&mut self) -> Option<&mut Segment> {
        self.0.iter_mut().rev().find(|s| s.kind != SegmentKind::TypeName)
    }

    /// Remove every segment of `kind`
    pub fn remove(&mut self, kind: SegmentKind) {
        self.0.retain(|s| s.kind != kind);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn path(&self, registry: &TypeRegistry) -> String {
        self.0
            .iter()
            .map(|s| s.path(registry))
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.0.iter().map(Segment::to_json).collect())
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(Segment::from_json)
            .collect::<Option<Vec<_>>>()
            .map(PathSegments)
    }
}
