//! Type registry: resolves qualified type names to their configuration
//!
//! Every resource and model receives the registry through its client; nothing
//! here is global.

use super::models::{CallableConfig, EntityConfig, EnumConfig, FieldMetadata, SchemaConfig};
use super::parser::{EdmType, Parser};
use crate::api::error::{ODataError, Result};
use serde_json::{Map, Value};

/// Lookup table over all configured schemas
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    schemas: Vec<SchemaConfig>,
    string_as_enum: bool,
}

impl TypeRegistry {
    pub fn new(schemas: Vec<SchemaConfig>) -> Self {
        Self {
            schemas,
            string_as_enum: false,
        }
    }

    /// Render enum literals as plain strings instead of `Ns.Type'Member'`
    pub fn with_string_as_enum(mut self, string_as_enum: bool) -> Self {
        self.string_as_enum = string_as_enum;
        self
    }

    pub fn string_as_enum(&self) -> bool {
        self.string_as_enum
    }

    pub fn schemas(&self) -> &[SchemaConfig] {
        &self.schemas
    }

    /// Split `Ns.Sub.Type` into schemas matching the prefix by namespace or alias
    fn candidates<'a, 'b>(
        &'a self,
        qualified: &'b str,
    ) -> impl Iterator<Item = (&'a SchemaConfig, &'b str)> + use<'a, 'b> {
        self.schemas.iter().filter_map(move |schema| {
            let rest = strip_qualifier(qualified, &schema.namespace).or_else(|| {
                schema
                    .alias
                    .as_deref()
                    .and_then(|alias| strip_qualifier(qualified, alias))
            })?;
            Some((schema, rest))
        })
    }

    /// Canonical namespace-qualified name for `type_name`
    pub fn qualified_name(&self, type_name: &str) -> Result<String> {
        match self.parser(type_name)? {
            Parser::Primitive(edm) => Ok(edm.name().to_string()),
            Parser::Entity { schema, config } => Ok(format!("{}.{}", schema.namespace, config.name)),
            Parser::Enum { schema, config } => Ok(format!("{}.{}", schema.namespace, config.name)),
            Parser::Callable { schema, config } => Ok(format!("{}.{}", schema.namespace, config.name)),
        }
    }

    /// Resolve a type name to exactly one parser
    pub fn parser(&self, type_name: &str) -> Result<Parser<'_>> {
        if let Some(edm) = EdmType::parse(type_name) {
            return Ok(Parser::Primitive(edm));
        }

        let mut found: Vec<Parser<'_>> = Vec::new();
        for (schema, name) in self.candidates(type_name) {
            found.extend(
                schema
                    .entities
                    .iter()
                    .filter(|e| e.name == name)
                    .map(|config| Parser::Entity { schema, config }),
            );
            found.extend(
                schema
                    .enums
                    .iter()
                    .filter(|e| e.name == name)
                    .map(|config| Parser::Enum { schema, config }),
            );
            found.extend(
                schema
                    .callables
                    .iter()
                    .filter(|c| c.name == name)
                    .map(|config| Parser::Callable { schema, config }),
            );
        }

        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(ODataError::configuration(format!(
                "no configuration found for type '{}'",
                type_name
            ))),
            n => Err(ODataError::configuration(format!(
                "type '{}' is ambiguous ({} configurations match)",
                type_name, n
            ))),
        }
    }

    pub fn entity_config(&self, type_name: &str) -> Result<&EntityConfig> {
        match self.parser(type_name)? {
            Parser::Entity { config, .. } => Ok(config),
            _ => Err(ODataError::configuration(format!(
                "'{}' is not an entity or complex type",
                type_name
            ))),
        }
    }

    pub fn enum_config(&self, type_name: &str) -> Result<&EnumConfig> {
        match self.parser(type_name)? {
            Parser::Enum { config, .. } => Ok(config),
            _ => Err(ODataError::configuration(format!("'{}' is not an enum type", type_name))),
        }
    }

    pub fn callable_config(&self, name: &str) -> Result<&CallableConfig> {
        match self.parser(name)? {
            Parser::Callable { config, .. } => Ok(config),
            _ => Err(ODataError::configuration(format!("'{}' is not a function or action", name))),
        }
    }

    /// Callable by qualified name, or by bare name for unbound imports
    pub fn find_callable(&self, name: &str) -> Option<(String, &CallableConfig)> {
        if let Ok(Parser::Callable { schema, config }) = self.parser(name) {
            return Some((format!("{}.{}", schema.namespace, config.name), config));
        }
        self.schemas.iter().find_map(|schema| {
            schema
                .callables
                .iter()
                .find(|c| c.name == name)
                .map(|c| (format!("{}.{}", schema.namespace, c.name), c))
        })
    }

    /// Entity set name declared for an entity type
    pub fn set_for_type(&self, type_name: &str) -> Option<String> {
        self.entity_config(type_name).ok().and_then(|c| c.set.clone())
    }

    /// Find the entity type served by an entity set
    pub fn type_for_set(&self, entity_set: &str) -> Option<String> {
        self.schemas.iter().find_map(|schema| {
            schema
                .entities
                .iter()
                .find(|e| e.set.as_deref() == Some(entity_set))
                .map(|e| format!("{}.{}", schema.namespace, e.name))
        })
    }

    /// All fields of a structured type, base type fields first, with `complex` computed
    pub fn fields(&self, type_name: &str) -> Result<Vec<FieldMetadata>> {
        let mut chain = Vec::new();
        let mut current = Some(type_name.to_string());
        while let Some(name) = current {
            if chain.len() > 16 {
                return Err(ODataError::configuration(format!(
                    "base type chain of '{}' is too deep",
                    type_name
                )));
            }
            let config = self.entity_config(&name)?;
            current = config.base.clone();
            chain.push(config);
        }

        let mut fields = Vec::new();
        for config in chain.into_iter().rev() {
            for field in &config.fields {
                let mut field = field.clone();
                field.complex = !field.navigation && self.is_complex(&field.field_type);
                fields.push(field);
            }
        }
        Ok(fields)
    }

    pub fn field(&self, type_name: &str, name: &str) -> Result<FieldMetadata> {
        self.fields(type_name)?
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                ODataError::configuration(format!("type '{}' has no field '{}'", type_name, name))
            })
    }

    pub fn key_fields(&self, type_name: &str) -> Result<Vec<FieldMetadata>> {
        Ok(self.fields(type_name)?.into_iter().filter(|f| f.key).collect())
    }

    pub fn is_complex(&self, type_name: &str) -> bool {
        matches!(self.parser(type_name), Ok(Parser::Entity { config, .. }) if config.complex)
    }

    /// Resolve a key from a scalar, a composite object or a partial entity
    ///
    /// Objects are reduced to the key fields of `type_name`; a single-field key
    /// collapses to its bare value. Returns `None` when no key value is present.
    pub fn resolve_key(&self, type_name: &str, value: &Value) -> Result<Option<Value>> {
        let keys = self.key_fields(type_name)?;
        match value {
            Value::Null => Ok(None),
            Value::Object(map) => {
                if keys.is_empty() {
                    return Err(ODataError::key(format!("type '{}' declares no key fields", type_name)));
                }
                let mut composite = Map::new();
                for field in &keys {
                    match map.get(&field.name) {
                        Some(Value::Null) | None => {}
                        Some(v) => {
                            composite.insert(field.name.clone(), v.clone());
                        }
                    }
                }
                if composite.is_empty() {
                    return Ok(None);
                }
                if composite.len() < keys.len() {
                    return Err(ODataError::key(format!(
                        "incomplete composite key for '{}'",
                        type_name
                    )));
                }
                if keys.len() == 1 {
                    Ok(composite.into_iter().next().map(|(_, v)| v))
                } else {
                    Ok(Some(Value::Object(composite)))
                }
            }
            scalar => {
                if keys.len() > 1 {
                    return Err(ODataError::type_mismatch(format!(
                        "type '{}' has a composite key; a scalar key cannot address it",
                        type_name
                    )));
                }
                Ok(Some(scalar.clone()))
            }
        }
    }
}

fn strip_qualifier<'a>(qualified: &'a str, prefix: &str) -> Option<&'a str> {
    qualified
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|rest| !rest.contains('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_registry;
    use serde_json::json;

    #[test]
    fn test_resolves_namespace_and_alias() {
        let registry = fixture_registry();
        assert_eq!(registry.qualified_name("Demo.Product").unwrap(), "Demo.Product");
        assert_eq!(registry.qualified_name("D.Product").unwrap(), "Demo.Product");
        assert_eq!(registry.qualified_name("Edm.Int32").unwrap(), "Edm.Int32");
    }

    #[test]
    fn test_unknown_type_is_configuration_error() {
        let registry = fixture_registry();
        let err = registry.parser("Demo.Missing").unwrap_err();
        assert!(matches!(err, ODataError::Configuration(_)));
        assert!(matches!(registry.parser("Product"), Err(ODataError::Configuration(_))));
    }

    #[test]
    fn test_ambiguous_type_is_configuration_error() {
        let registry = TypeRegistry::new(vec![
            SchemaConfig::new("A").with_entity(EntityConfig::entity("Thing")),
            SchemaConfig::new("B")
                .with_alias("A")
                .with_entity(EntityConfig::entity("Thing")),
        ]);
        assert!(matches!(registry.parser("A.Thing"), Err(ODataError::Configuration(_))));
    }

    #[test]
    fn test_fields_mark_complex_and_inherit_base() {
        let registry = fixture_registry();
        let fields = registry.fields("Demo.Product").unwrap();
        let address = fields.iter().find(|f| f.name == "Address").unwrap();
        assert!(address.complex);
        assert!(!fields.iter().find(|f| f.name == "Category").unwrap().complex);

        let special = registry.fields("Demo.SpecialProduct").unwrap();
        assert_eq!(special[0].name, "ID");
        assert!(special.iter().any(|f| f.name == "Discount"));
        assert_eq!(registry.key_fields("Demo.SpecialProduct").unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_key_shapes() {
        let registry = fixture_registry();
        assert_eq!(registry.resolve_key("Demo.Product", &json!(5)).unwrap(), Some(json!(5)));
        assert_eq!(
            registry.resolve_key("Demo.Product", &json!({"ID": 7, "Name": "Chai"})).unwrap(),
            Some(json!(7))
        );
        assert_eq!(registry.resolve_key("Demo.Product", &json!({"Name": "Chai"})).unwrap(), None);
        assert_eq!(
            registry
                .resolve_key("Demo.OrderLine", &json!({"OrderID": 1, "LineNo": 2, "Qty": 3}))
                .unwrap(),
            Some(json!({"LineNo": 2, "OrderID": 1}))
        );
        assert!(matches!(
            registry.resolve_key("Demo.OrderLine", &json!(1)),
            Err(ODataError::TypeMismatch(_))
        ));
        assert!(matches!(
            registry.resolve_key("Demo.OrderLine", &json!({"OrderID": 1})),
            Err(ODataError::Key(_))
        ));
    }

    #[test]
    fn test_parser_outlives_type_name() {
        let registry = fixture_registry();
        let parser = {
            let name = String::from("D.Color");
            registry.parser(&name).unwrap()
        };
        assert!(matches!(parser, Parser::Enum { config, .. } if config.name == "Color"));
    }

    #[test]
    fn test_find_callable_by_bare_name() {
        let registry = fixture_registry();
        let (qualified, config) = registry.find_callable("GetNearestAirport").unwrap();
        assert_eq!(qualified, "Demo.GetNearestAirport");
        assert!(!config.bound);
        assert!(registry.find_callable("Demo.Discount").is_some_and(|(_, c)| c.bound));
        assert!(registry.find_callable("Nope").is_none());
    }

    #[test]
    fn test_type_for_set() {
        let registry = fixture_registry();
        assert_eq!(registry.type_for_set("Products").as_deref(), Some("Demo.Product"));
        assert_eq!(registry.type_for_set("Nope"), None);
    }
}
