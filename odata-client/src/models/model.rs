//! Entity model
//!
//! A [`Model`] is an attribute bag bound to a [`Resource`]. Payloads are
//! partitioned against the field metadata of the bound type: scalar fields are
//! decoded through their parser, complex fields become sub-models or
//! sub-collections, navigation fields are resolved lazily on first access.

use super::relation::{Related, Relation};
use super::{Collection, EntityType};
use crate::api::error::{ODataError, Result};
use crate::api::metadata::FieldMetadata;
use crate::api::resource::{RequestOptions, Resource, ResourceKind};
use crate::api::response::{EntityAnnotations, entity_attributes};
use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Model {
    resource: Option<Resource>,
    /// Last populated payload without annotations; source of lazy navigation
    entity: Map<String, Value>,
    attributes: Map<String, Value>,
    complexes: BTreeMap<String, Related>,
    meta: EntityAnnotations,
    relations: BTreeMap<String, Relation>,
    destroyed: bool,
}

impl Model {
    /// Unattached model
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(resource: Resource) -> Result<Self> {
        let mut model = Self::new();
        model.attach(resource)?;
        Ok(model)
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn bound_type(&self) -> Option<&str> {
        self.resource.as_ref().and_then(Resource::bound_type)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Attach to `resource`; the bound type can never change once set
    pub fn attach(&mut self, resource: Resource) -> Result<()> {
        self.check_alive("attach")?;
        let type_name = resource
            .bound_type()
            .ok_or_else(|| ODataError::configuration(format!("{} has no bound type", resource.path())))?
            .to_string();
        resource.client().registry().entity_config(&type_name)?;

        let first = match self.bound_type() {
            Some(current) if current != type_name => {
                return Err(ODataError::type_mismatch(format!(
                    "model is bound to '{}', cannot attach a '{}' resource",
                    current, type_name
                )));
            }
            Some(_) => false,
            None => true,
        };
        self.resource = Some(resource);

        if first && !self.attributes.is_empty() {
            // values assigned before attaching are re-read with field metadata
            let payload = self.attributes.clone();
            let meta = self.meta.clone();
            self.populate(payload, meta)?;
        }
        Ok(())
    }

    fn check_alive(&self, operation: &str) -> Result<()> {
        if self.destroyed {
            return Err(ODataError::not_supported(format!(
                "cannot {} a destroyed model",
                operation
            )));
        }
        Ok(())
    }

    fn attached(&self) -> Result<&Resource> {
        self.resource
            .as_ref()
            .ok_or_else(|| ODataError::not_supported("model is not attached to a resource"))
    }

    fn fields(&self) -> Vec<FieldMetadata> {
        match &self.resource {
            Some(resource) => resource
                .bound_type()
                .and_then(|t| resource.client().registry().fields(t).ok())
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn field(&self, name: &str) -> Result<FieldMetadata> {
        let resource = self.attached()?;
        let type_name = resource
            .bound_type()
            .ok_or_else(|| ODataError::configuration("model resource has no bound type"))?;
        resource.client().registry().field(type_name, name)
    }

    /// Replace the model state with a payload
    ///
    /// Clears the relation cache. Unknown keys are kept verbatim, navigation
    /// fields stay in the raw payload until accessed.
    pub fn populate(&mut self, payload: Map<String, Value>, meta: EntityAnnotations) -> Result<()> {
        self.check_alive("populate")?;
        let entity = entity_attributes(&payload);

        let Some(resource) = self.resource.clone() else {
            self.commit(entity.clone(), BTreeMap::new(), entity, meta);
            return Ok(());
        };
        let registry = resource.client().registry();
        let fields = self.fields();

        let mut attributes = Map::new();
        let mut pending = Vec::new();
        for (name, value) in &entity {
            let Some(field) = fields.iter().find(|f| &f.name == name) else {
                attributes.insert(name.clone(), value.clone());
                continue;
            };
            if field.navigation {
                continue;
            }
            if field.complex && !value.is_null() {
                pending.push((field, value));
                continue;
            }
            let decoded = registry
                .parser(&field.field_type)
                .map(|p| p.deserialize(value))
                .unwrap_or_else(|_| value.clone());
            attributes.insert(name.clone(), decoded);
        }

        // complex values are addressed below the keyed entity
        let scope = Self::keyed(&resource, &attributes);
        let mut complexes = BTreeMap::new();
        for (field, value) in pending {
            let related = complex_value(&scope, field, value)?;
            complexes.insert(field.name.clone(), related);
        }
        self.commit(attributes, complexes, entity, meta);
        Ok(())
    }

    fn commit(
        &mut self,
        attributes: Map<String, Value>,
        complexes: BTreeMap<String, Related>,
        entity: Map<String, Value>,
        meta: EntityAnnotations,
    ) {
        self.attributes = attributes;
        self.complexes = complexes;
        self.entity = entity;
        self.meta = meta;
        self.relations.clear();
    }

    /// Key resolved from `attributes` for the type bound to `resource`
    fn key_from(resource: &Resource, attributes: &Map<String, Value>) -> Option<Value> {
        let type_name = resource.bound_type()?;
        resource
            .client()
            .registry()
            .resolve_key(type_name, &Value::Object(attributes.clone()))
            .ok()
            .flatten()
    }

    /// `resource` keyed from `attributes` when it addresses a collection
    fn keyed(resource: &Resource, attributes: &Map<String, Value>) -> Resource {
        let mut target = resource.clone();
        if target.is_collection()
            && matches!(
                target.kind(),
                ResourceKind::EntitySet | ResourceKind::NavigationProperty
            )
        {
            if let Some(key) = Self::key_from(resource, attributes) {
                if target.set_key(key).is_err() {
                    return resource.clone();
                }
            }
        }
        target
    }

    /// Payload for the wire: scalars encoded, complex values flattened, and
    /// relations set since the last populate
    pub fn to_entity(&self) -> Map<String, Value> {
        let fields = self.fields();
        let registry = self.resource.as_ref().map(|r| r.client().registry());
        let mut entity = Map::new();

        for (name, value) in &self.attributes {
            let encoded = fields
                .iter()
                .find(|f| &f.name == name && f.is_scalar())
                .zip(registry)
                .and_then(|(f, registry)| registry.parser(&f.field_type).ok())
                .map(|p| p.serialize(value))
                .unwrap_or_else(|| value.clone());
            entity.insert(name.clone(), encoded);
        }
        for (name, related) in &self.complexes {
            entity.insert(name.clone(), related.to_json());
        }
        for (name, relation) in &self.relations {
            if relation.changed {
                let value = relation
                    .related
                    .as_ref()
                    .map(Related::to_json)
                    .unwrap_or(Value::Null);
                entity.insert(name.clone(), value);
            }
        }
        entity
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Attribute or complex value as JSON
    pub fn get(&self, name: &str) -> Option<Value> {
        self.attributes
            .get(name)
            .cloned()
            .or_else(|| self.complexes.get(name).map(Related::to_json))
    }

    /// Assign an attribute; complex fields are rebuilt as sub-models
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        self.check_alive("modify")?;
        let Some(resource) = self.resource.clone() else {
            self.attributes.insert(name.to_string(), value);
            return Ok(());
        };
        match self.fields().into_iter().find(|f| f.name == name) {
            Some(field) if field.navigation => Err(ODataError::type_mismatch(format!(
                "'{}' is a navigation property; use set_navigation_property",
                name
            ))),
            Some(field) if field.complex && !value.is_null() => {
                let scope = self.target().unwrap_or(resource);
                let related = complex_value(&scope, &field, &value)?;
                self.attributes.remove(name);
                self.complexes.insert(name.to_string(), related);
                Ok(())
            }
            Some(field) => {
                let decoded = resource
                    .client()
                    .registry()
                    .parser(&field.field_type)
                    .map(|p| p.deserialize(&value))
                    .unwrap_or(value);
                self.complexes.remove(name);
                self.attributes.insert(name.to_string(), decoded);
                Ok(())
            }
            None => {
                self.attributes.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    pub fn complex(&self, name: &str) -> Option<&Related> {
        self.complexes.get(name)
    }

    pub fn complex_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.complexes.get_mut(name)
    }

    pub fn meta(&self) -> &EntityAnnotations {
        &self.meta
    }

    pub fn etag(&self) -> Option<&str> {
        self.meta.etag.as_deref()
    }

    /// Key resolved from the attributes, else the key of the resource
    pub fn key(&self) -> Option<Value> {
        let resource = self.resource.as_ref()?;
        Self::key_from(resource, &self.attributes).or_else(|| resource.key().into_value())
    }

    /// Resource addressing this entity: collection resources get the key from
    /// the attributes
    pub fn target(&self) -> Result<Resource> {
        self.check_alive("address")?;
        let resource = self.attached()?;
        let mut target = resource.clone();
        if target.is_collection()
            && matches!(
                target.kind(),
                ResourceKind::EntitySet | ResourceKind::NavigationProperty
            )
        {
            if let Some(key) = self.key() {
                target.set_key(key)?;
            }
        }
        Ok(target)
    }

    /// Target that must address a single entity
    fn entity_target(&self, operation: &str) -> Result<Resource> {
        let target = self.target()?;
        target.check_entity_scope(operation)?;
        Ok(target)
    }

    /// Lazily resolved navigation relation, memoized until the next populate
    ///
    /// Returns `None` when the relation was explicitly cleared.
    pub fn get_navigation_property(&mut self, name: &str) -> Result<Option<&mut Related>> {
        self.check_alive("navigate")?;
        if !self.relations.contains_key(name) {
            let field = self.navigation_field(name)?;
            let resource = self.entity_target("navigation property")?.derive_navigation(&field)?;
            let raw = self.entity.get(name).cloned();
            let related = if field.collection {
                let mut collection = Collection::new(resource);
                if let Some(Value::Array(items)) = raw {
                    collection.assign_values(items, self.meta.property_count(name))?;
                }
                Related::Collection(collection)
            } else {
                let mut model = Model::with_resource(resource)?;
                if let Some(Value::Object(payload)) = raw {
                    let meta = EntityAnnotations::from_payload(&payload);
                    model.populate(payload, meta)?;
                }
                Related::Model(Box::new(model))
            };
            self.relations.insert(
                name.to_string(),
                Relation {
                    field,
                    related: Some(related),
                    changed: false,
                },
            );
        }
        Ok(self
            .relations
            .get_mut(name)
            .and_then(|relation| relation.related.as_mut()))
    }

    /// Replace (or clear with `None`) a single-valued relation; persisted by the
    /// next [`update`](Self::update)
    pub fn set_navigation_property(&mut self, name: &str, model: Option<Model>) -> Result<()> {
        self.check_alive("modify")?;
        let field = self.navigation_field(name)?;
        if field.collection {
            return Err(ODataError::type_mismatch(format!(
                "'{}' is collection-valued; use add_reference/remove_reference",
                name
            )));
        }
        if let Some(model) = &model {
            let registry = self.attached()?.client().registry();
            let expected = registry.qualified_name(&field.field_type)?;
            let actual = model.bound_type().unwrap_or_default();
            if actual != expected {
                return Err(ODataError::type_mismatch(format!(
                    "'{}' expects '{}', got '{}'",
                    name, expected, actual
                )));
            }
        }
        self.relations.insert(
            name.to_string(),
            Relation {
                field,
                related: model.map(|m| Related::Model(Box::new(m))),
                changed: true,
            },
        );
        Ok(())
    }

    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.relations
    }

    fn navigation_field(&self, name: &str) -> Result<FieldMetadata> {
        let field = self.field(name)?;
        if !field.navigation {
            return Err(ODataError::configuration(format!(
                "'{}' is not a navigation property",
                name
            )));
        }
        Ok(field)
    }

    pub fn navigation_property(&self, name: &str) -> Result<Resource> {
        self.entity_target("navigation property")?.navigation_property(name)
    }

    pub fn property(&self, name: &str) -> Result<Resource> {
        self.entity_target("property")?.property(name)
    }

    pub fn cast(&self, type_name: &str) -> Result<Resource> {
        self.entity_target("cast")?.cast(type_name)
    }

    pub fn function(&self, name: &str, return_type: Option<&str>) -> Result<Resource> {
        self.entity_target("function")?.function(name, return_type)
    }

    pub fn action(&self, name: &str, return_type: Option<&str>) -> Result<Resource> {
        self.entity_target("action")?.action(name, return_type)
    }

    fn apply_response(&mut self, entity: Option<Map<String, Value>>, meta: EntityAnnotations) -> Result<()> {
        match entity {
            Some(payload) => self.populate(payload, meta),
            None => {
                if meta.etag.is_some() {
                    self.meta.etag = meta.etag;
                }
                for relation in self.relations.values_mut() {
                    relation.changed = false;
                }
                Ok(())
            }
        }
    }

    /// Load the entity, property or function result this model addresses
    pub async fn fetch(&mut self, options: RequestOptions) -> Result<()> {
        let target = self.target()?;
        match target.kind() {
            ResourceKind::Entity | ResourceKind::Singleton | ResourceKind::NavigationProperty => {
                target.check_entity_scope("fetch")?;
                let response = target.fetch_entity(options).await?;
                self.populate(response.entity.unwrap_or_default(), response.meta)
            }
            ResourceKind::EntitySet => Err(ODataError::key(format!(
                "fetch requires an entity key on {}",
                target.path()
            ))),
            ResourceKind::Property => {
                let response = target.fetch_property(options).await?;
                let payload = match response.property {
                    Some(Value::Object(map)) => map,
                    Some(Value::Null) | None => Map::new(),
                    Some(other) => {
                        return Err(ODataError::payload(format!(
                            "expected a complex value, got {}",
                            other
                        )));
                    }
                };
                self.populate(payload, EntityAnnotations::default())
            }
            ResourceKind::Function => {
                let response = target.get(options).await?.into_entity()?;
                self.populate(response.entity.unwrap_or_default(), response.meta)
            }
            kind => Err(ODataError::not_supported(format!("cannot fetch a model from a {}", kind))),
        }
    }

    /// POST the entity to its entity set
    pub async fn create(&mut self, options: RequestOptions) -> Result<()> {
        let mut target = self.target()?;
        match target.kind() {
            ResourceKind::EntitySet | ResourceKind::Entity => {}
            kind => {
                return Err(ODataError::not_supported(format!(
                    "cannot create an entity through a {}",
                    kind
                )));
            }
        }
        target.clear_key();
        target.query().clear();
        let body = Value::Object(self.to_entity());
        let response = target.post(body, options).await?.into_entity()?;
        self.apply_response(response.entity, response.meta)
    }

    /// Persist changed single-valued relations through `$ref`, then PUT the entity
    ///
    /// Reference calls run one after another, each with the ETag returned by the
    /// previous one. Model state is only replaced after the final PUT succeeds.
    pub async fn update(&mut self, options: RequestOptions) -> Result<()> {
        let target = self.target()?;
        match target.kind() {
            ResourceKind::Entity
            | ResourceKind::Singleton
            | ResourceKind::NavigationProperty
            | ResourceKind::Property => {}
            ResourceKind::EntitySet => {
                return Err(ODataError::key(format!(
                    "update requires an entity key on {}",
                    target.path()
                )));
            }
            kind => {
                return Err(ODataError::not_supported(format!("cannot update a {}", kind)));
            }
        }
        target.check_entity_scope("update")?;

        let mut changed = Vec::new();
        for (name, relation) in &self.relations {
            if !relation.changed || relation.field.collection {
                continue;
            }
            let related_target = match relation.related.as_ref().and_then(Related::as_model) {
                Some(model) => Some(model.entity_target("reference")?),
                None => None,
            };
            changed.push((name.clone(), relation.field.clone(), related_target));
        }

        let mut etag = options.etag.clone().or_else(|| self.meta.etag.clone());
        for (name, field, related_target) in &changed {
            let navigation = target.derive_navigation(field)?;
            let response = match related_target {
                Some(related) => {
                    debug!("Setting reference {} -> {}", name, related.path());
                    navigation.set_reference(related, etag.clone()).await?
                }
                None => {
                    debug!("Clearing reference {}", name);
                    navigation.unset_reference(etag.clone()).await?
                }
            };
            if let Some(next) = response.etag() {
                etag = Some(next.to_string());
            }
            // the reference is stored server-side even if the PUT below fails
            if let Some(relation) = self.relations.get_mut(name) {
                relation.changed = false;
            }
            self.meta.etag = etag.clone();
        }

        let mut body = self.to_entity();
        for (name, _, _) in &changed {
            body.remove(name);
        }
        let options = if options.etag.is_some() {
            options
        } else {
            options.etag_opt(etag)
        };
        let response = target.put(Value::Object(body), options).await?.into_entity()?;
        self.apply_response(response.entity, response.meta)
    }

    /// Create when the key is empty, update otherwise
    pub async fn save(&mut self, options: RequestOptions) -> Result<()> {
        let target = self.target()?;
        let singleton = target.kind() == ResourceKind::Singleton;
        if singleton || self.key().is_some() {
            self.update(options).await
        } else {
            self.create(options).await
        }
    }

    /// DELETE with the current ETag; the model is inert afterwards
    pub async fn destroy(&mut self, options: RequestOptions) -> Result<()> {
        let target = self.target()?;
        match target.kind() {
            ResourceKind::Entity | ResourceKind::Singleton | ResourceKind::NavigationProperty => {}
            ResourceKind::EntitySet => {
                return Err(ODataError::key(format!(
                    "destroy requires an entity key on {}",
                    target.path()
                )));
            }
            kind => return Err(ODataError::not_supported(format!("cannot destroy a {}", kind))),
        }
        target.check_entity_scope("destroy")?;
        let options = if options.etag.is_some() {
            options
        } else {
            options.etag_opt(self.meta.etag.clone())
        };
        target.delete(options).await?;
        self.destroyed = true;
        Ok(())
    }

    /// Deserialize the entity into a typed struct
    pub fn to_typed<T: EntityType>(&self) -> Result<T> {
        self.check_type::<T>()?;
        serde_json::from_value(Value::Object(self.to_entity()))
            .map_err(|e| ODataError::payload(format!("cannot read {}: {}", T::TYPE_NAME, e)))
    }

    /// Assign every field of a typed struct
    pub fn assign_typed<T: EntityType>(&mut self, value: &T) -> Result<()> {
        self.check_type::<T>()?;
        let payload = match serde_json::to_value(value) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(ODataError::payload(format!(
                    "{} did not serialize to an object: {}",
                    T::TYPE_NAME,
                    other
                )));
            }
            Err(e) => return Err(ODataError::payload(e.to_string())),
        };
        for (name, value) in payload {
            self.set(&name, value)?;
        }
        Ok(())
    }

    fn check_type<T: EntityType>(&self) -> Result<()> {
        let Some(resource) = &self.resource else {
            return Ok(());
        };
        let expected = resource.client().registry().qualified_name(T::TYPE_NAME)?;
        match resource.bound_type() {
            Some(actual) if actual != expected => Err(ODataError::type_mismatch(format!(
                "model is bound to '{}', not '{}'",
                actual, expected
            ))),
            _ => Ok(()),
        }
    }
}

/// Wrap a complex value into a sub-model or sub-collection bound to the
/// property resource
fn complex_value(scope: &Resource, field: &FieldMetadata, value: &Value) -> Result<Related> {
    let resource = scope.derive_property(field);
    if field.collection {
        let items = match value {
            Value::Array(items) => items.clone(),
            other => {
                return Err(ODataError::payload(format!(
                    "'{}' should be a collection, got {}",
                    field.name, other
                )));
            }
        };
        let mut collection = Collection::new(resource);
        collection.assign_values(items, None)?;
        Ok(Related::Collection(collection))
    } else {
        let payload = match value {
            Value::Object(map) => map.clone(),
            other => {
                return Err(ODataError::payload(format!(
                    "'{}' should be an object, got {}",
                    field.name, other
                )));
            }
        };
        let mut model = Model::with_resource(resource)?;
        model.populate(payload, EntityAnnotations::default())?;
        Ok(Related::Model(Box::new(model)))
    }
}
