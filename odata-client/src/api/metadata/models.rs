//! Schema metadata models
//!
//! These mirror the subset of an OData CSDL document the client needs:
//! entity and complex types with their fields, enum types and callables.
//! They deserialize straight from the `[[schemas]]` tables of the TOML settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One field of an entity or complex type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldMetadata {
    pub name: String,
    /// Wire type, e.g. `Edm.String`, `Demo.Address` or `Demo.Color`
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub navigation: bool,
    #[serde(default)]
    pub collection: bool,
    /// Member of the entity key
    #[serde(default)]
    pub key: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Computed by the registry: the field type resolves to a complex type
    #[serde(skip)]
    pub complex: bool,
}

fn default_nullable() -> bool {
    true
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            navigation: false,
            collection: false,
            key: false,
            nullable: true,
            max_length: None,
            complex: false,
        }
    }

    pub fn as_key(mut self) -> Self {
        self.key = true;
        self.nullable = false;
        self
    }

    pub fn as_navigation(mut self) -> Self {
        self.navigation = true;
        self
    }

    pub fn as_collection(mut self) -> Self {
        self.collection = true;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Plain value field: neither navigation nor complex
    pub fn is_scalar(&self) -> bool {
        !self.navigation && !self.complex
    }
}

/// Entity or complex type configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityConfig {
    pub name: String,
    #[serde(default)]
    pub complex: bool,
    /// Qualified name of the base type, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Name of the entity set exposing this type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldMetadata>,
}

impl EntityConfig {
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            complex: false,
            base: None,
            set: None,
            fields: Vec::new(),
        }
    }

    pub fn complex(name: impl Into<String>) -> Self {
        Self {
            complex: true,
            ..Self::entity(name)
        }
    }

    pub fn with_set(mut self, set: impl Into<String>) -> Self {
        self.set = Some(set.into());
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_field(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }
}

/// Enum type configuration; `flags` enums accept comma-separated member lists
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnumConfig {
    pub name: String,
    #[serde(default)]
    pub flags: bool,
    pub members: BTreeMap<String, i64>,
}

impl EnumConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: false,
            members: BTreeMap::new(),
        }
    }

    pub fn as_flags(mut self) -> Self {
        self.flags = true;
        self
    }

    pub fn with_member(mut self, name: impl Into<String>, value: i64) -> Self {
        self.members.insert(name.into(), value);
        self
    }
}

/// Function or action import
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallableConfig {
    pub name: String,
    /// Bound to the entity type named by the first parameter
    #[serde(default)]
    pub bound: bool,
    #[serde(default)]
    pub composable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub parameters: Vec<FieldMetadata>,
}

impl CallableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: false,
            composable: false,
            return_type: None,
            parameters: Vec::new(),
        }
    }

    pub fn as_bound(mut self) -> Self {
        self.bound = true;
        self
    }

    pub fn returning(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    pub fn with_parameter(mut self, parameter: FieldMetadata) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// One schema (namespace) of the service model
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaConfig {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub enums: Vec<EnumConfig>,
    #[serde(default)]
    pub callables: Vec<CallableConfig>,
}

impl SchemaConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_entity(mut self, entity: EntityConfig) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_enum(mut self, enum_config: EnumConfig) -> Self {
        self.enums.push(enum_config);
        self
    }

    pub fn with_callable(mut self, callable: CallableConfig) -> Self {
        self.callables.push(callable);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_defaults_from_toml() {
        let field: FieldMetadata = toml::from_str(
            r#"
            name = "Name"
            type = "Edm.String"
            max_length = 80
            "#,
        )
        .unwrap();

        assert_eq!(field.field_type, "Edm.String");
        assert!(field.nullable);
        assert!(!field.navigation);
        assert!(!field.key);
        assert_eq!(field.max_length, Some(80));
    }

    #[test]
    fn test_schema_from_toml() {
        let schema: SchemaConfig = toml::from_str(
            r#"
            namespace = "Sales"
            alias = "S"

            [[entities]]
            name = "Order"
            set = "Orders"
            fields = [
                { name = "ID", type = "Edm.Int32", key = true },
                { name = "Lines", type = "S.Line", navigation = true, collection = true },
            ]

            [[enums]]
            name = "Status"
            members = { Open = 0, Closed = 1 }
            "#,
        )
        .unwrap();

        assert_eq!(schema.alias.as_deref(), Some("S"));
        assert_eq!(schema.entities[0].set.as_deref(), Some("Orders"));
        assert!(schema.entities[0].fields[1].collection);
        assert_eq!(schema.enums[0].members["Closed"], 1);
    }
}
