//! `$ref` operations on navigation properties
//!
//! Single-valued navigation uses `set_reference`/`unset_reference`;
//! collection-valued navigation uses `add_reference`/`remove_reference`.

use super::{RequestOptions, Resource, ResourceKind};
use crate::api::error::{ODataError, Result};
use crate::api::transport::HttpResponse;
use serde_json::json;

impl Resource {
    fn reference_target(&self, collection: bool) -> Result<Resource> {
        if self.kind() != ResourceKind::NavigationProperty {
            return Err(ODataError::not_supported(format!(
                "$ref requires a navigation property, got {}",
                self.kind()
            )));
        }
        let is_collection = self
            .segments()
            .last_addressed()
            .is_some_and(|s| s.collection);
        if is_collection != collection {
            return Err(ODataError::type_mismatch(format!(
                "{} is {} navigation property",
                self.path(),
                if is_collection { "a collection-valued" } else { "a single-valued" }
            )));
        }
        let mut resource = self.clone();
        resource.clear_key();
        resource.query().clear();
        Ok(resource.reference())
    }

    /// Point a single-valued navigation property at `target`
    pub async fn set_reference(&self, target: &Resource, etag: Option<String>) -> Result<HttpResponse> {
        let reference = self.reference_target(false)?;
        let body = json!({ "@odata.id": target.endpoint_url() });
        reference
            .put(body, RequestOptions::new().etag_opt(etag))
            .await
    }

    /// Clear a single-valued navigation property
    pub async fn unset_reference(&self, etag: Option<String>) -> Result<HttpResponse> {
        let reference = self.reference_target(false)?;
        reference.delete(RequestOptions::new().etag_opt(etag)).await
    }

    /// Add `target` to a collection-valued navigation property
    pub async fn add_reference(&self, target: &Resource) -> Result<HttpResponse> {
        let reference = self.reference_target(true)?;
        let body = json!({ "@odata.id": target.endpoint_url() });
        reference.post(body, RequestOptions::new()).await
    }

    /// Remove `target` from a collection-valued navigation property
    pub async fn remove_reference(&self, target: &Resource, etag: Option<String>) -> Result<HttpResponse> {
        let reference = self.reference_target(true)?;
        reference
            .delete(
                RequestOptions::new()
                    .param("$id", target.endpoint_url())
                    .etag_opt(etag),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::Method;
    use crate::testing::fixture_client;

    #[tokio::test]
    async fn test_set_reference_puts_odata_id() {
        let (client, transport) = fixture_client();
        let product = client
            .entity_set("Products", "Demo.Product")
            .unwrap()
            .entity(json!(1))
            .unwrap();
        let category = client
            .entity_set("Categories", "Demo.Category")
            .unwrap()
            .entity(json!("bev"))
            .unwrap();

        product
            .navigation_property("Category")
            .unwrap()
            .set_reference(&category, Some("W/\"1\"".to_string()))
            .await
            .unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.url, "https://example.org/odata/Products(1)/Category/$ref");
        assert_eq!(
            request.body,
            Some(json!({"@odata.id": "https://example.org/odata/Categories('bev')"}))
        );
        assert_eq!(request.header("If-Match"), Some("W/\"1\""));
    }

    #[tokio::test]
    async fn test_collection_references() {
        let (client, transport) = fixture_client();
        let products = client
            .entity_set("Categories", "Demo.Category")
            .unwrap()
            .entity(json!("bev"))
            .unwrap()
            .navigation_property("Products")
            .unwrap();
        let product = client
            .entity_set("Products", "Demo.Product")
            .unwrap()
            .entity(json!(7))
            .unwrap();

        products.add_reference(&product).await.unwrap();
        products.remove_reference(&product, None).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].url, "https://example.org/odata/Categories('bev')/Products/$ref");
        assert_eq!(requests[1].method, Method::Delete);
        assert_eq!(
            requests[1].params.get("$id"),
            Some("https://example.org/odata/Products(7)")
        );

        assert!(matches!(
            products.set_reference(&product, None).await,
            Err(ODataError::TypeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_reference_requires_navigation() {
        let (client, _) = fixture_client();
        let set = client.entity_set("Products", "Demo.Product").unwrap();
        assert!(matches!(
            set.unset_reference(None).await,
            Err(ODataError::OperationNotSupported(_))
        ));
    }
}
