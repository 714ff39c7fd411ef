//! OData client: resource factories and the single request entry point
//!
//! The client owns the settings, the type registry built from them and the
//! transport. It is cheap to clone; every resource carries a handle to it.

use super::error::{ODataError, Result};
use super::metadata::TypeRegistry;
use super::query::{QueryOptions, QueryParams};
use super::resource::segments::{PathSegments, Segment, SegmentKind};
use super::resource::{RequestOptions, Resource};
use super::transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport};
use crate::config::Settings;
use crate::models::EntityType;
use log::debug;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

struct ClientInner {
    settings: Settings,
    registry: TypeRegistry,
    transport: Arc<dyn Transport>,
}

#[derive(Clone)]
pub struct ODataClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for ODataClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ODataClient")
            .field("service_root_url", &self.inner.settings.service_root_url)
            .field("transport", &self.inner.transport)
            .finish()
    }
}

impl ODataClient {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Result<Self> {
        let settings = settings.normalized()?;
        let registry = settings.registry();
        Ok(Self {
            inner: Arc::new(ClientInner {
                settings,
                registry,
                transport,
            }),
        })
    }

    /// Client over the default reqwest transport
    pub fn with_http(settings: Settings) -> Result<Self> {
        let transport = HttpTransport::new()?;
        Self::new(settings, Arc::new(transport))
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    pub fn service_root_url(&self) -> &str {
        &self.inner.settings.service_root_url
    }

    /// Absolute URL of a resource, without query string
    pub fn endpoint_url(&self, resource: &Resource) -> String {
        format!("{}{}", self.service_root_url(), resource.path())
    }

    pub fn entity_set(&self, name: &str, type_name: &str) -> Result<Resource> {
        let type_name = self.registry().qualified_name(type_name)?;
        let segment = Segment::new(SegmentKind::EntitySet, name)
            .with_type(Some(type_name.clone()))
            .with_collection(true);
        Ok(Resource::from_root(self.clone(), segment, Some(type_name)))
    }

    /// Entity set declared for `type_name` in the schema
    pub fn entity_set_for_type(&self, type_name: &str) -> Result<Resource> {
        let set = self.registry().set_for_type(type_name).ok_or_else(|| {
            ODataError::configuration(format!("no entity set declared for type '{}'", type_name))
        })?;
        self.entity_set(&set, type_name)
    }

    pub fn entity_set_of<T: EntityType>(&self) -> Result<Resource> {
        self.entity_set_for_type(T::TYPE_NAME)
    }

    pub fn singleton(&self, name: &str, type_name: &str) -> Result<Resource> {
        let type_name = self.registry().qualified_name(type_name)?;
        let segment = Segment::new(SegmentKind::Singleton, name).with_type(Some(type_name.clone()));
        Ok(Resource::from_root(self.clone(), segment, Some(type_name)))
    }

    /// Unbound function import
    pub fn function(&self, name: &str, return_type: Option<&str>) -> Result<Resource> {
        self.callable(SegmentKind::Function, name, return_type)
    }

    /// Unbound action import
    pub fn action(&self, name: &str, return_type: Option<&str>) -> Result<Resource> {
        self.callable(SegmentKind::Action, name, return_type)
    }

    fn callable(&self, kind: SegmentKind, name: &str, return_type: Option<&str>) -> Result<Resource> {
        let declared = self
            .registry()
            .find_callable(name)
            .and_then(|(_, c)| c.return_type.clone());
        let return_type = return_type.map(str::to_string).or(declared);
        let (bound_type, collection) = match return_type {
            Some(t) => {
                let (element, collection) = split_collection(&t);
                (Some(self.registry().qualified_name(element)?), collection)
            }
            None => (None, false),
        };
        let segment = Segment::new(kind, name)
            .with_type(bound_type.clone())
            .with_collection(collection);
        Ok(Resource::from_root(self.clone(), segment, bound_type))
    }

    pub fn metadata(&self) -> Resource {
        Resource::from_root(self.clone(), Segment::new(SegmentKind::Metadata, ""), None)
    }

    pub fn batch(&self) -> Resource {
        Resource::from_root(self.clone(), Segment::new(SegmentKind::Batch, ""), None)
    }

    /// Raw `$metadata` document
    pub async fn fetch_metadata(&self) -> Result<String> {
        let response = self.metadata().get(RequestOptions::new()).await?;
        Ok(response.text())
    }

    /// Restore a resource from [`Resource::to_json`]
    pub fn resource_from_json(&self, value: &Value) -> Result<Resource> {
        let segments = value
            .get("segments")
            .and_then(PathSegments::from_json)
            .ok_or_else(|| ODataError::payload("resource snapshot has no valid 'segments'"))?;
        let options = value
            .get("options")
            .map(QueryOptions::from_json)
            .unwrap_or_default();
        let bound_type = match value.get("type").and_then(Value::as_str) {
            Some(t) => Some(self.registry().qualified_name(t)?),
            None => None,
        };
        Ok(Resource::from_parts(self.clone(), segments, options, bound_type))
    }

    /// Merge settings, ETag and per-call options into one request and send it
    pub async fn request(
        &self,
        method: Method,
        resource: &Resource,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        let settings = self.settings();

        let mut headers = settings.headers.clone();
        if let Some(etag) = &options.etag {
            headers.insert("If-Match".to_string(), etag.clone());
        }
        if let Some(level) = settings.accept_metadata {
            if !headers.keys().any(|k| k.eq_ignore_ascii_case("accept")) {
                headers.insert("Accept".to_string(), level.header_value());
            }
        }
        headers.extend(options.headers.clone());

        let (_, resource_params) = resource.path_and_params();
        let mut params = settings
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<QueryParams>();
        params.extend(&resource_params);
        if options.with_count {
            params.insert("$count", "true");
        }
        params.extend(&options.params);

        let request = HttpRequest {
            method,
            url: self.endpoint_url(resource),
            headers,
            params,
            body,
            with_credentials: options.with_credentials.unwrap_or(settings.with_credentials),
        };
        debug!("{} {}", request.method, request.full_url());

        let response = self.inner.transport.send(request).await?;
        debug!("{} response status {}", method, response.status);
        Ok(response)
    }
}

/// `Collection(Ns.Type)` to (`Ns.Type`, true)
pub(crate) fn split_collection(type_name: &str) -> (&str, bool) {
    match type_name
        .strip_prefix("Collection(")
        .and_then(|t| t.strip_suffix(')'))
    {
        Some(element) => (element, true),
        None => (type_name, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcceptMetadata;
    use crate::testing::{MockTransport, fixture_settings};
    use serde_json::json;

    fn client_with(settings: Settings) -> (ODataClient, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let client = ODataClient::new(settings, transport.clone()).unwrap();
        (client, transport)
    }

    #[test]
    fn test_unknown_type_fails_construction() {
        let (client, _) = client_with(fixture_settings());
        let err = client.entity_set("Things", "Demo.Thing").unwrap_err();
        assert!(matches!(err, ODataError::Configuration(_)));
    }

    #[test]
    fn test_function_import_return_type() {
        let (client, _) = client_with(fixture_settings());
        let function = client.function("TopProducts", None).unwrap();
        assert_eq!(function.bound_type(), Some("Demo.Product"));
        assert!(function.is_collection());
    }

    #[tokio::test]
    async fn test_request_merges_headers_and_params() {
        let mut settings = fixture_settings();
        settings.headers.insert("OData-Version".to_string(), "4.0".to_string());
        settings.params.insert("api-version".to_string(), "2".to_string());
        settings.accept_metadata = Some(AcceptMetadata::Minimal);
        let (client, transport) = client_with(settings);

        let resource = client.entity_set("Products", "Demo.Product").unwrap().top(5);
        client
            .request(
                Method::Get,
                &resource,
                None,
                RequestOptions::new()
                    .etag("W/\"3\"")
                    .with_count()
                    .param("$top", "7")
                    .header("Prefer", "return=representation"),
            )
            .await
            .unwrap();

        let requests = transport.requests();
        let request = &requests[0];
        assert_eq!(request.url, "https://example.org/odata/Products");
        assert_eq!(request.header("If-Match"), Some("W/\"3\""));
        assert_eq!(request.header("OData-Version"), Some("4.0"));
        assert_eq!(request.header("Prefer"), Some("return=representation"));
        assert_eq!(
            request.header("Accept"),
            Some("application/json;odata.metadata=minimal, text/plain, */*")
        );
        assert_eq!(request.params.get("api-version"), Some("2"));
        assert_eq!(request.params.get("$count"), Some("true"));
        assert_eq!(request.params.get("$top"), Some("7"));
    }

    #[tokio::test]
    async fn test_with_credentials_reaches_transport() {
        let (client, transport) = client_with(fixture_settings());
        let resource = client.entity_set("Products", "Demo.Product").unwrap();
        client
            .request(Method::Get, &resource, None, RequestOptions::new())
            .await
            .unwrap();
        client
            .request(
                Method::Get,
                &resource,
                None,
                RequestOptions::new().with_credentials(true),
            )
            .await
            .unwrap();

        let requests = transport.requests();
        assert!(!requests[0].with_credentials);
        assert!(requests[1].with_credentials);
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let (client, transport) = client_with(fixture_settings());
        transport.respond_status(404, "missing");
        let resource = client.entity_set("Products", "Demo.Product").unwrap();
        let err = client
            .request(Method::Get, &resource, None, RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_resource_snapshot_round_trip() {
        let (client, _) = client_with(fixture_settings());
        let resource = client
            .entity_set("Products", "Demo.Product")
            .unwrap()
            .with_key(json!(5))
            .unwrap()
            .select(json!(["Name", "Price"]));
        let restored = client.resource_from_json(&resource.to_json()).unwrap();
        assert_eq!(restored, resource);
        assert_eq!(restored.path_and_params(), resource.path_and_params());
    }
}
