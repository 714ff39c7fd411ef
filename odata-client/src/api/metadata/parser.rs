//! Value parsers resolved from the type registry
//!
//! A parser converts between wire values and the in-memory attribute values of a
//! model, and renders typed URL literals for keys, function parameters and aliases.

use super::models::{CallableConfig, EntityConfig, EnumConfig, SchemaConfig};
use crate::api::query::builder::literal;
use serde_json::Value;

/// Built-in `Edm.*` primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmType {
    String,
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    Guid,
    Date,
    DateTimeOffset,
    TimeOfDay,
    Duration,
    Binary,
    Stream,
    Untyped,
}

impl EdmType {
    pub fn parse(type_name: &str) -> Option<Self> {
        let name = type_name.strip_prefix("Edm.")?;
        Some(match name {
            "String" => Self::String,
            "Boolean" => Self::Boolean,
            "Byte" => Self::Byte,
            "SByte" => Self::SByte,
            "Int16" => Self::Int16,
            "Int32" => Self::Int32,
            "Int64" => Self::Int64,
            "Single" => Self::Single,
            "Double" => Self::Double,
            "Decimal" => Self::Decimal,
            "Guid" => Self::Guid,
            "Date" => Self::Date,
            "DateTimeOffset" => Self::DateTimeOffset,
            "TimeOfDay" => Self::TimeOfDay,
            "Duration" => Self::Duration,
            "Binary" => Self::Binary,
            "Stream" => Self::Stream,
            "Untyped" => Self::Untyped,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "Edm.String",
            Self::Boolean => "Edm.Boolean",
            Self::Byte => "Edm.Byte",
            Self::SByte => "Edm.SByte",
            Self::Int16 => "Edm.Int16",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::Single => "Edm.Single",
            Self::Double => "Edm.Double",
            Self::Decimal => "Edm.Decimal",
            Self::Guid => "Edm.Guid",
            Self::Date => "Edm.Date",
            Self::DateTimeOffset => "Edm.DateTimeOffset",
            Self::TimeOfDay => "Edm.TimeOfDay",
            Self::Duration => "Edm.Duration",
            Self::Binary => "Edm.Binary",
            Self::Stream => "Edm.Stream",
            Self::Untyped => "Edm.Untyped",
        }
    }

    /// Typed URL literal for a primitive value
    pub fn literal(&self, value: &Value) -> String {
        match (self, value) {
            (Self::Guid | Self::Date | Self::DateTimeOffset | Self::TimeOfDay, Value::String(s)) => {
                s.clone()
            }
            (Self::Duration, Value::String(s)) => format!("duration'{}'", s),
            (Self::Binary, Value::String(s)) => format!("binary'{}'", s),
            _ => literal(value),
        }
    }
}

/// The configuration a type name resolved to
#[derive(Debug, Clone, Copy)]
pub enum Parser<'a> {
    Entity {
        schema: &'a SchemaConfig,
        config: &'a EntityConfig,
    },
    Enum {
        schema: &'a SchemaConfig,
        config: &'a EnumConfig,
    },
    Callable {
        schema: &'a SchemaConfig,
        config: &'a CallableConfig,
    },
    Primitive(EdmType),
}

impl<'a> Parser<'a> {
    pub fn is_complex(&self) -> bool {
        matches!(self, Parser::Entity { config, .. } if config.complex)
    }

    /// Wire value to attribute value; enum member names become numbers
    pub fn deserialize(&self, value: &Value) -> Value {
        match (self, value) {
            (Parser::Enum { config, .. }, Value::String(s)) => enum_from_names(config, s)
                .map(Value::from)
                .unwrap_or_else(|| value.clone()),
            (Parser::Enum { .. }, Value::Array(items)) => {
                Value::Array(items.iter().map(|v| self.deserialize(v)).collect())
            }
            _ => value.clone(),
        }
    }

    /// Attribute value to wire value; enum numbers become member names
    pub fn serialize(&self, value: &Value) -> Value {
        match (self, value) {
            (Parser::Enum { config, .. }, Value::Number(n)) => n
                .as_i64()
                .and_then(|n| enum_to_names(config, n))
                .map(Value::String)
                .unwrap_or_else(|| value.clone()),
            (Parser::Enum { .. }, Value::Array(items)) => {
                Value::Array(items.iter().map(|v| self.serialize(v)).collect())
            }
            _ => value.clone(),
        }
    }

    /// Typed URL literal for `value`
    pub fn literal(&self, value: &Value, string_as_enum: bool) -> String {
        match self {
            Parser::Primitive(edm) => edm.literal(value),
            Parser::Enum { schema, config } => {
                let names = match self.serialize(value) {
                    Value::String(s) => s,
                    other => return literal(&other),
                };
                if string_as_enum {
                    format!("'{}'", names)
                } else {
                    format!("{}.{}'{}'", schema.namespace, config.name, names)
                }
            }
            _ => literal(value),
        }
    }
}

fn enum_from_names(config: &EnumConfig, names: &str) -> Option<i64> {
    if config.flags {
        names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| config.members.get(n).copied())
            .try_fold(0i64, |acc, v| v.map(|v| acc | v))
    } else {
        config.members.get(names.trim()).copied()
    }
}

fn enum_to_names(config: &EnumConfig, value: i64) -> Option<String> {
    if config.flags {
        let mut members: Vec<(&String, &i64)> = config
            .members
            .iter()
            .filter(|(_, v)| **v != 0 && value & **v == **v)
            .collect();
        members.sort_by_key(|(_, v)| **v);
        let covered = members.iter().fold(0i64, |acc, (_, v)| acc | **v);
        if covered != value {
            return config
                .members
                .iter()
                .find(|(_, v)| **v == value)
                .map(|(n, _)| n.clone());
        }
        Some(
            members
                .into_iter()
                .map(|(n, _)| n.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    } else {
        config
            .members
            .iter()
            .find(|(_, v)| **v == value)
            .map(|(n, _)| n.clone())
    }
}
