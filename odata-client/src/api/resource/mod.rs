//! Resources: addressable handles on the service
//!
//! A [`Resource`] pairs a segment chain with a query option set and the type it
//! is bound to. Derivations (`property`, `navigation_property`, `cast`, bound
//! callables) return new resources and never touch the parent; fluent option
//! setters consume and return `self`. Verbs clone what they send, so a request
//! in flight never observes later mutation.

pub mod kind;
pub mod options;
pub mod reference;
pub mod segments;

pub use kind::ResourceKind;
pub use options::RequestOptions;
pub use segments::{PathSegments, Segment, SegmentKind, SegmentOption};

use crate::api::client::{ODataClient, split_collection};
use crate::api::error::{ODataError, Result};
use crate::api::metadata::FieldMetadata;
use crate::api::query::{QueryOption, QueryOptions, QueryParams};
use crate::api::response::{EntitiesResponse, EntityResponse, PropertyResponse};
use crate::api::transport::{HttpResponse, Method};
use crate::models::{Collection, Model};
use futures::{Stream, TryStreamExt};
use serde_json::{Map, Value, json};
use std::fmt;

/// Key of the addressed entity; empty until one is set
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityKey(Option<Value>);

impl EntityKey {
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn value(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    pub fn into_value(self) -> Option<Value> {
        self.0
    }
}

/// Options that still apply once a single entity is addressed
const ENTITY_OPTIONS: [QueryOption; 3] = [QueryOption::Select, QueryOption::Expand, QueryOption::Format];

#[derive(Clone)]
pub struct Resource {
    client: ODataClient,
    segments: PathSegments,
    options: QueryOptions,
    bound_type: Option<String>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("segments", &self.segments)
            .field("options", &self.options)
            .field("bound_type", &self.bound_type)
            .finish()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
            && self.options == other.options
            && self.bound_type == other.bound_type
    }
}

impl Resource {
    pub(crate) fn from_root(client: ODataClient, segment: Segment, bound_type: Option<String>) -> Self {
        let mut segments = PathSegments::new();
        segments.push(segment);
        Self {
            client,
            segments,
            options: QueryOptions::new(),
            bound_type,
        }
    }

    pub(crate) fn from_parts(
        client: ODataClient,
        segments: PathSegments,
        options: QueryOptions,
        bound_type: Option<String>,
    ) -> Self {
        Self {
            client,
            segments,
            options,
            bound_type,
        }
    }

    pub fn client(&self) -> &ODataClient {
        &self.client
    }

    /// Qualified name of the type this resource addresses
    pub fn bound_type(&self) -> Option<&str> {
        self.bound_type.as_deref()
    }

    pub fn segments(&self) -> &PathSegments {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut PathSegments {
        &mut self.segments
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Mutable access to the query options
    pub fn query(&mut self) -> &mut QueryOptions {
        &mut self.options
    }

    /// Classify by the last segment, ignoring trailing casts
    pub fn kind(&self) -> ResourceKind {
        let Some(last) = self.segments.last_addressed() else {
            return ResourceKind::Metadata;
        };
        match last.kind {
            SegmentKind::EntitySet if last.key().is_some() => ResourceKind::Entity,
            SegmentKind::EntitySet => ResourceKind::EntitySet,
            SegmentKind::Singleton => ResourceKind::Singleton,
            SegmentKind::NavigationProperty => ResourceKind::NavigationProperty,
            SegmentKind::Property => ResourceKind::Property,
            SegmentKind::Function => ResourceKind::Function,
            SegmentKind::Action => ResourceKind::Action,
            SegmentKind::Value => ResourceKind::Value,
            SegmentKind::Ref => ResourceKind::Reference,
            SegmentKind::Count => ResourceKind::Count,
            SegmentKind::Metadata => ResourceKind::Metadata,
            SegmentKind::Batch => ResourceKind::Batch,
            // last_addressed skips casts
            SegmentKind::TypeName => ResourceKind::EntitySet,
        }
    }

    /// Addresses a collection (entity set, collection navigation or collection property/result)
    pub fn is_collection(&self) -> bool {
        match self.segments.last_addressed() {
            Some(last) => match last.kind {
                SegmentKind::EntitySet | SegmentKind::NavigationProperty => {
                    last.collection && last.key().is_none()
                }
                SegmentKind::Property | SegmentKind::Function | SegmentKind::Action => last.collection,
                _ => false,
            },
            None => false,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey(self.segments.last_addressed().and_then(Segment::key))
    }

    /// Set the key of the last entity-set or navigation segment
    ///
    /// Accepts a scalar, a composite object, or a partial entity from which the
    /// key fields are picked. `Null` clears the key. Collection-only options
    /// (filter, order, paging) are dropped once a key is set.
    pub fn set_key(&mut self, key: Value) -> Result<()> {
        let registry = self.client.registry();
        let segment = self
            .segments
            .last_addressed_mut()
            .filter(|s| s.kind.is_keyable())
            .ok_or_else(|| {
                ODataError::not_supported("only entity sets and navigation properties take a key")
            })?;
        let resolved = match &segment.type_name {
            Some(type_name) => registry.resolve_key(type_name, &key)?,
            None if key.is_null() => None,
            None => Some(key),
        };
        let keyed = resolved.is_some();
        segment.set_key(resolved);
        if keyed {
            self.options.keep(&ENTITY_OPTIONS);
        }
        Ok(())
    }

    pub fn with_key(mut self, key: Value) -> Result<Self> {
        self.set_key(key)?;
        Ok(self)
    }

    /// Keyed copy of this resource; fails when no key can be resolved
    pub fn entity(&self, key: Value) -> Result<Self> {
        let resource = self.clone().with_key(key)?;
        if resource.key().is_empty() {
            return Err(ODataError::key("no key value could be resolved"));
        }
        Ok(resource)
    }

    pub fn clear_key(&mut self) {
        if let Some(segment) = self.segments.last_addressed_mut() {
            segment.set_key(None);
        }
    }

    /// Entity-scoped derivations need a single entity
    pub(crate) fn check_entity_scope(&self, operation: &str) -> Result<()> {
        if self.is_collection() && matches!(
            self.kind(),
            ResourceKind::EntitySet | ResourceKind::NavigationProperty
        ) {
            return Err(ODataError::key(format!(
                "{} requires an entity key on {}",
                operation,
                self.path()
            )));
        }
        Ok(())
    }

    fn structured_type(&self) -> Result<&str> {
        self.bound_type
            .as_deref()
            .ok_or_else(|| ODataError::configuration(format!("{} has no bound type", self.path())))
    }

    fn derive(&self, segment: Segment, bound_type: Option<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self {
            client: self.client.clone(),
            segments,
            options: QueryOptions::new(),
            bound_type,
        }
    }

    /// Structural or complex property of the addressed entity
    pub fn property(&self, name: &str) -> Result<Self> {
        self.check_entity_scope("property")?;
        let field = self
            .client
            .registry()
            .field(self.structured_type()?, name)?;
        if field.navigation {
            return Err(ODataError::configuration(format!(
                "'{}' is a navigation property; use navigation_property",
                name
            )));
        }
        Ok(self.derive_property(&field))
    }

    /// Property derivation without the scope check, used while populating models
    pub(crate) fn derive_property(&self, field: &FieldMetadata) -> Self {
        let type_name = self
            .client
            .registry()
            .qualified_name(&field.field_type)
            .unwrap_or_else(|_| field.field_type.clone());
        let segment = Segment::new(SegmentKind::Property, field.name.clone())
            .with_type(Some(type_name.clone()))
            .with_collection(field.collection);
        self.derive(segment, Some(type_name))
    }

    pub fn navigation_property(&self, name: &str) -> Result<Self> {
        self.check_entity_scope("navigation property")?;
        let field = self
            .client
            .registry()
            .field(self.structured_type()?, name)?;
        if !field.navigation {
            return Err(ODataError::configuration(format!(
                "'{}' is not a navigation property",
                name
            )));
        }
        self.derive_navigation(&field)
    }

    pub(crate) fn derive_navigation(&self, field: &FieldMetadata) -> Result<Self> {
        let type_name = self.client.registry().qualified_name(&field.field_type)?;
        let segment = Segment::new(SegmentKind::NavigationProperty, field.name.clone())
            .with_type(Some(type_name.clone()))
            .with_collection(field.collection);
        Ok(self.derive(segment, Some(type_name)))
    }

    /// Derived-type cast
    pub fn cast(&self, type_name: &str) -> Result<Self> {
        let qualified = self.client.registry().qualified_name(type_name)?;
        let mut resource = self.derive(
            Segment::new(SegmentKind::TypeName, qualified.clone()).with_type(Some(qualified.clone())),
            Some(qualified),
        );
        resource.options = self.options.clone();
        Ok(resource)
    }

    /// Bound function
    pub fn function(&self, name: &str, return_type: Option<&str>) -> Result<Self> {
        self.bound_callable(SegmentKind::Function, name, return_type)
    }

    /// Bound action
    pub fn action(&self, name: &str, return_type: Option<&str>) -> Result<Self> {
        self.bound_callable(SegmentKind::Action, name, return_type)
    }

    fn bound_callable(&self, kind: SegmentKind, name: &str, return_type: Option<&str>) -> Result<Self> {
        let registry = self.client.registry();
        let (qualified, config) = registry.find_callable(name).ok_or_else(|| {
            ODataError::configuration(format!("no configuration found for callable '{}'", name))
        })?;
        if !config.bound {
            return Err(ODataError::configuration(format!(
                "'{}' is not bound; call it from the client",
                qualified
            )));
        }
        let return_type = return_type
            .map(str::to_string)
            .or_else(|| config.return_type.clone());
        let (bound_type, collection) = match return_type {
            Some(t) => {
                let (element, collection) = split_collection(&t);
                (Some(registry.qualified_name(element)?), collection)
            }
            None => (None, false),
        };
        let segment = Segment::new(kind, qualified)
            .with_type(bound_type.clone())
            .with_collection(collection);
        Ok(self.derive(segment, bound_type))
    }

    /// `$value` of a media entity or primitive property
    pub fn value(&self) -> Self {
        self.derive(Segment::new(SegmentKind::Value, ""), self.bound_type.clone())
    }

    /// `$ref` of a navigation property
    pub fn reference(&self) -> Self {
        self.derive(Segment::new(SegmentKind::Ref, ""), self.bound_type.clone())
    }

    /// `$count` of a collection; filter and search still apply
    pub fn count(&self) -> Self {
        let mut resource = self.derive(Segment::new(SegmentKind::Count, ""), None);
        resource.options = self.options.clone();
        resource.options.keep(&[QueryOption::Filter, QueryOption::Search]);
        resource
    }

    pub fn select(mut self, value: impl Into<Value>) -> Self {
        self.options.option(QueryOption::Select).assign(value.into());
        self
    }

    pub fn filter(mut self, value: impl Into<Value>) -> Self {
        self.options.option(QueryOption::Filter).assign(value.into());
        self
    }

    pub fn search(mut self, value: impl Into<Value>) -> Self {
        self.options.option(QueryOption::Search).assign(value.into());
        self
    }

    pub fn order_by(mut self, value: impl Into<Value>) -> Self {
        self.options.option(QueryOption::OrderBy).assign(value.into());
        self
    }

    pub fn expand(mut self, value: impl Into<Value>) -> Self {
        self.options.option(QueryOption::Expand).assign(value.into());
        self
    }

    pub fn transform(mut self, value: impl Into<Value>) -> Self {
        self.options.option(QueryOption::Transform).assign(value.into());
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.options.option(QueryOption::Top).assign(json!(top));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.options.option(QueryOption::Skip).assign(json!(skip));
        self
    }

    pub fn skiptoken(mut self, token: impl Into<String>) -> Self {
        self.options
            .option(QueryOption::Skiptoken)
            .assign(Value::String(token.into()));
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.options
            .option(QueryOption::Format)
            .assign(Value::String(format.into()));
        self
    }

    pub fn custom(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.custom(name, value);
        self
    }

    pub fn path(&self) -> String {
        self.segments.path(self.client.registry())
    }

    /// Path relative to the service root and the query parameters
    pub fn path_and_params(&self) -> (String, QueryParams) {
        (self.path(), self.options.params())
    }

    pub fn endpoint_url(&self) -> String {
        self.client.endpoint_url(self)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "segments": self.segments.to_json(),
            "options": self.options.to_json(),
            "type": self.bound_type,
        })
    }

    pub async fn request(
        &self,
        method: Method,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        let resource = self.clone();
        self.client.request(method, &resource, body, options).await
    }

    pub async fn get(&self, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::Get, None, options).await
    }

    pub async fn post(&self, body: Value, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::Post, Some(body), options).await
    }

    pub async fn put(&self, body: Value, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::Put, Some(body), options).await
    }

    pub async fn patch(&self, body: Value, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::Patch, Some(body), options).await
    }

    pub async fn delete(&self, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::Delete, None, options).await
    }

    pub async fn fetch_entity(&self, options: RequestOptions) -> Result<EntityResponse> {
        self.get(options).await?.into_entity()
    }

    pub async fn fetch_entities(&self, options: RequestOptions) -> Result<EntitiesResponse> {
        self.get(options).await?.into_entities()
    }

    pub async fn fetch_property(&self, options: RequestOptions) -> Result<PropertyResponse> {
        self.get(options).await?.into_property()
    }

    /// Server-side `$count`
    pub async fn fetch_count(&self, options: RequestOptions) -> Result<u64> {
        let resource = match self.kind() {
            ResourceKind::Count => self.clone(),
            _ => self.count(),
        };
        resource.get(options).await?.into_count()
    }

    /// Raw `$value` text
    pub async fn fetch_value(&self, options: RequestOptions) -> Result<String> {
        let resource = match self.kind() {
            ResourceKind::Value => self.clone(),
            _ => self.value(),
        };
        Ok(resource.get(options).await?.text())
    }

    /// Stream of pages, following `$skiptoken`/`$skip` of each next link
    pub fn into_pages(self, options: RequestOptions) -> impl Stream<Item = Result<EntitiesResponse>> {
        futures::stream::try_unfold(Some(self), move |state| {
            let options = options.clone();
            async move {
                let Some(resource) = state else {
                    return Ok(None);
                };
                let page = resource.fetch_entities(options).await?;
                let next = match (&page.meta.skiptoken, page.meta.skip) {
                    (Some(token), _) => Some(resource.clone().skiptoken(token.clone())),
                    (None, Some(skip)) => Some(resource.clone().skip(skip)),
                    (None, None) => None,
                };
                log::trace!("fetched page of {} entities", page.entities.len());
                Ok(Some((page, next)))
            }
        })
    }

    /// Every entity across all pages
    pub async fn fetch_all(&self, options: RequestOptions) -> Result<Vec<Map<String, Value>>> {
        self.clone()
            .into_pages(options)
            .try_fold(Vec::new(), |mut all, page| async move {
                all.extend(page.entities);
                Ok(all)
            })
            .await
    }

    /// Invoke a function (GET with inline parameters) or an action (POST with a JSON body)
    pub async fn call(&self, parameters: Value, options: RequestOptions) -> Result<HttpResponse> {
        match self.kind() {
            ResourceKind::Function => {
                let mut resource = self.clone();
                if let Some(segment) = resource.segments.last_addressed_mut() {
                    segment.set_parameters(parameters);
                }
                resource.get(options).await
            }
            ResourceKind::Action => {
                let body = if parameters.is_null() {
                    json!({})
                } else {
                    parameters
                };
                self.post(body, options).await
            }
            kind => Err(ODataError::not_supported(format!("cannot call a {}", kind))),
        }
    }

    pub async fn call_entity(&self, parameters: Value, options: RequestOptions) -> Result<EntityResponse> {
        self.call(parameters, options).await?.into_entity()
    }

    pub async fn call_entities(
        &self,
        parameters: Value,
        options: RequestOptions,
    ) -> Result<EntitiesResponse> {
        self.call(parameters, options).await?.into_entities()
    }

    pub async fn call_property(
        &self,
        parameters: Value,
        options: RequestOptions,
    ) -> Result<PropertyResponse> {
        self.call(parameters, options).await?.into_property()
    }

    /// Resource for models of the callable's result: the entity set of the
    /// return type when one is declared, else the callable itself
    fn result_resource(&self) -> Result<Self> {
        let bound_type = self
            .bound_type
            .as_deref()
            .ok_or_else(|| ODataError::configuration(format!("{} has no return type", self.path())))?;
        match self.client.entity_set_for_type(bound_type) {
            Ok(resource) => Ok(resource),
            Err(_) => Ok(self.clone()),
        }
    }

    pub async fn call_model(&self, parameters: Value, options: RequestOptions) -> Result<Model> {
        let response = self.call_entity(parameters, options).await?;
        self.result_resource()?.as_model(response)
    }

    pub async fn call_collection(
        &self,
        parameters: Value,
        options: RequestOptions,
    ) -> Result<Collection> {
        let response = self.call_entities(parameters, options).await?;
        self.result_resource()?.as_collection(response)
    }

    /// Wrap an entity response into a model attached to this resource
    pub fn as_model(&self, response: EntityResponse) -> Result<Model> {
        let mut model = Model::with_resource(self.clone())?;
        model.populate(response.entity.unwrap_or_default(), response.meta)?;
        Ok(model)
    }

    /// Wrap an entity set response into a collection over this resource
    pub fn as_collection(&self, response: EntitiesResponse) -> Result<Collection> {
        let mut collection = Collection::new(self.clone());
        collection.assign(response)?;
        Ok(collection)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (path, params) = self.path_and_params();
        if params.is_empty() {
            write!(f, "{}", path)
        } else {
            write!(f, "{}?{}", path, params.to_query_string())
        }
    }
}
