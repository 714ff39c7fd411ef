//! Entity service: per-entity-set shortcuts over resources
//!
//! Operates on plain JSON entities; use [`EntityService::model`] and
//! [`EntityService::collection`] for the model layer.

use crate::api::client::ODataClient;
use crate::api::error::{ODataError, Result};
use crate::api::resource::{RequestOptions, Resource};
use crate::api::response::{EntitiesResponse, EntityResponse};
use crate::models::{Collection, EntityType, Model};
use log::debug;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct EntityService {
    client: ODataClient,
    entity_set: String,
    type_name: String,
}

impl EntityService {
    pub fn new(client: ODataClient, entity_set: &str, type_name: &str) -> Result<Self> {
        let type_name = client.registry().qualified_name(type_name)?;
        Ok(Self {
            client,
            entity_set: entity_set.to_string(),
            type_name,
        })
    }

    /// Service over the configured entity set of `T`
    pub fn of<T: EntityType>(client: ODataClient) -> Result<Self> {
        let type_name = client.registry().qualified_name(T::TYPE_NAME)?;
        let entity_set = client.registry().set_for_type(&type_name).ok_or_else(|| {
            ODataError::configuration(format!("no entity set configured for '{}'", type_name))
        })?;
        Ok(Self {
            client,
            entity_set,
            type_name,
        })
    }

    pub fn client(&self) -> &ODataClient {
        &self.client
    }

    pub fn entity_set(&self) -> &str {
        &self.entity_set
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Unkeyed entity set resource
    pub fn entities(&self) -> Result<Resource> {
        self.client.entity_set(&self.entity_set, &self.type_name)
    }

    /// Keyed resource; `key` may be a scalar, a composite object or a partial entity
    pub fn entity(&self, key: Value) -> Result<Resource> {
        self.entities()?.entity(key)
    }

    pub fn navigation_property(&self, key: Value, name: &str) -> Result<Resource> {
        self.entity(key)?.navigation_property(name)
    }

    pub fn property(&self, key: Value, name: &str) -> Result<Resource> {
        self.entity(key)?.property(name)
    }

    pub fn action(&self, key: Value, name: &str) -> Result<Resource> {
        self.entity(key)?.action(name, None)
    }

    pub fn function(&self, key: Value, name: &str) -> Result<Resource> {
        self.entity(key)?.function(name, None)
    }

    /// Action bound to the entity set
    pub fn collection_action(&self, name: &str) -> Result<Resource> {
        self.entities()?.action(name, None)
    }

    /// Function bound to the entity set
    pub fn collection_function(&self, name: &str) -> Result<Resource> {
        self.entities()?.function(name, None)
    }

    pub async fn fetch_collection(&self, options: RequestOptions) -> Result<EntitiesResponse> {
        self.entities()?.fetch_entities(options).await
    }

    /// Every entity of the set, following next links
    pub async fn fetch_all(&self, options: RequestOptions) -> Result<Vec<Map<String, Value>>> {
        self.entities()?.fetch_all(options).await
    }

    pub async fn fetch_one(&self, key: Value, options: RequestOptions) -> Result<EntityResponse> {
        self.entity(key)?.fetch_entity(options).await
    }

    pub async fn create(&self, entity: Value, options: RequestOptions) -> Result<EntityResponse> {
        self.entities()?.post(entity, options).await?.into_entity()
    }

    /// Replace the entity (PUT); the key is taken from the entity itself
    pub async fn update(&self, entity: Value, options: RequestOptions) -> Result<EntityResponse> {
        self.entity(entity.clone())?
            .put(entity, options)
            .await?
            .into_entity()
    }

    /// Merge the given fields into the entity (PATCH)
    pub async fn assign(&self, entity: Value, options: RequestOptions) -> Result<EntityResponse> {
        self.entity(entity.clone())?
            .patch(entity, options)
            .await?
            .into_entity()
    }

    pub async fn destroy(&self, entity: Value, options: RequestOptions) -> Result<()> {
        self.entity(entity)?.delete(options).await?;
        Ok(())
    }

    /// Fetch the entity; a 404 falls back to creating it
    pub async fn fetch_or_create(&self, entity: Value, options: RequestOptions) -> Result<EntityResponse> {
        match self.fetch_one(entity.clone(), options.clone()).await {
            Err(e) if e.is_not_found() => {
                debug!("{} not found, creating it", self.entity_set);
                self.create(entity, options).await
            }
            other => other,
        }
    }

    /// Create when no key can be resolved from the entity, update otherwise
    pub async fn save(&self, entity: Value, options: RequestOptions) -> Result<EntityResponse> {
        let keyed = self
            .client
            .registry()
            .resolve_key(&self.type_name, &entity)?
            .is_some();
        if keyed {
            self.update(entity, options).await
        } else {
            self.create(entity, options).await
        }
    }

    /// Model attached to the entity set, populated with `attributes`
    pub fn model(&self, attributes: Map<String, Value>) -> Result<Model> {
        let mut model = Model::with_resource(self.entities()?)?;
        for (name, value) in attributes {
            model.set(&name, value)?;
        }
        Ok(model)
    }

    /// Empty collection over the entity set
    pub fn collection(&self) -> Result<Collection> {
        Ok(Collection::new(self.entities()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::Method;
    use crate::testing::{MockTransport, Product, fixture_client};
    use serde_json::json;
    use std::sync::Arc;

    fn service() -> (EntityService, Arc<MockTransport>) {
        let (client, transport) = fixture_client();
        (EntityService::new(client, "Products", "D.Product").unwrap(), transport)
    }

    #[test]
    fn test_service_for_entity_type() {
        let (client, _) = fixture_client();
        let service = EntityService::of::<Product>(client).unwrap();
        assert_eq!(service.entity_set(), "Products");
        assert_eq!(service.type_name(), "Demo.Product");
    }

    #[test]
    fn test_shortcut_resources() {
        let (service, _) = service();
        assert_eq!(
            service.navigation_property(json!(1), "Category").unwrap().path(),
            "Products(1)/Category"
        );
        assert_eq!(service.property(json!(1), "Name").unwrap().path(), "Products(1)/Name");
        assert_eq!(
            service.action(json!(1), "Demo.Discount").unwrap().path(),
            "Products(1)/Demo.Discount"
        );
        assert_eq!(
            service.collection_action("Demo.Discount").unwrap().path(),
            "Products/Demo.Discount"
        );
        assert!(matches!(service.entity(json!({"Name": "x"})), Err(ODataError::Key(_))));
    }

    #[tokio::test]
    async fn test_update_and_assign_use_entity_key() {
        let (service, transport) = service();
        service
            .update(json!({"ID": 3, "Name": "Tofu"}), RequestOptions::new().etag("W/\"4\""))
            .await
            .unwrap();
        service
            .assign(json!({"ID": 3, "Price": 9}), RequestOptions::new())
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Put);
        assert_eq!(requests[0].url, "https://example.org/odata/Products(3)");
        assert_eq!(requests[0].header("If-Match"), Some("W/\"4\""));
        assert_eq!(requests[1].method, Method::Patch);
        assert_eq!(requests[1].body, Some(json!({"ID": 3, "Price": 9})));
    }

    #[tokio::test]
    async fn test_fetch_or_create_falls_back_on_404() {
        let (service, transport) = service();
        transport.respond_status(404, "not found");
        transport.respond_json(json!({"ID": 8, "Name": "New"}));

        let created = service
            .fetch_or_create(json!({"ID": 8, "Name": "New"}), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(created.entity.unwrap().get("Name"), Some(&json!("New")));

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[1].method, Method::Post);
        assert_eq!(requests[1].url, "https://example.org/odata/Products");
    }

    #[tokio::test]
    async fn test_fetch_or_create_passes_other_errors() {
        let (service, transport) = service();
        transport.respond_status(500, "boom");
        let err = service
            .fetch_or_create(json!({"ID": 8}), RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_save_dispatches_on_key() {
        let (service, transport) = service();
        service.save(json!({"Name": "A"}), RequestOptions::new()).await.unwrap();
        service.save(json!({"ID": 2, "Name": "B"}), RequestOptions::new()).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(requests[1].url, "https://example.org/odata/Products(2)");
    }

    #[tokio::test]
    async fn test_fetch_all_and_destroy() {
        let (service, transport) = service();
        transport.respond_json(json!({"value": [{"ID": 1}, {"ID": 2}]}));
        assert_eq!(service.fetch_all(RequestOptions::new()).await.unwrap().len(), 2);

        service.destroy(json!({"ID": 2}), RequestOptions::new()).await.unwrap();
        let request = &transport.requests()[1];
        assert_eq!(request.method, Method::Delete);
        assert_eq!(request.url, "https://example.org/odata/Products(2)");
    }

    #[test]
    fn test_model_from_attributes() {
        let (service, _) = service();
        let model = service
            .model(json!({"ID": 5, "Color": "Red"}).as_object().cloned().unwrap())
            .unwrap();
        assert_eq!(model.target().unwrap().path(), "Products(5)");
        assert!(service.collection().unwrap().is_empty());
    }
}
