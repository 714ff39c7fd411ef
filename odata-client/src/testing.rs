//! Shared test fixtures: a scripted transport and a small demo schema

use crate::api::ODataClient;
use crate::api::error::TransportError;
use crate::api::metadata::{
    CallableConfig, EntityConfig, EnumConfig, FieldMetadata, SchemaConfig, TypeRegistry,
};
use crate::api::transport::{HttpRequest, HttpResponse, ResponseBody, Transport};
use crate::config::Settings;
use crate::models::EntityType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Records every request and replays queued responses in order; once the
/// queue is empty every request gets `204 No Content`
#[derive(Debug, Default)]
pub struct MockTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: HttpResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn respond_json(&self, body: Value) {
        self.respond(HttpResponse::json(200, body));
    }

    pub fn respond_text(&self, text: &str) {
        self.respond(HttpResponse::new(200, ResponseBody::Text(text.to_string())));
    }

    pub fn respond_status(&self, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Status {
                status,
                body: body.to_string(),
            }));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::empty(204)))
    }
}

/// Typed view of `Demo.Product`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
}

impl EntityType for Product {
    const TYPE_NAME: &'static str = "Demo.Product";
}

pub fn fixture_schema() -> SchemaConfig {
    SchemaConfig::new("Demo")
        .with_alias("D")
        .with_entity(
            EntityConfig::entity("Product")
                .with_set("Products")
                .with_field(FieldMetadata::new("ID", "Edm.Int32").as_key())
                .with_field(FieldMetadata::new("Name", "Edm.String").with_max_length(80))
                .with_field(FieldMetadata::new("Price", "Edm.Decimal"))
                .with_field(FieldMetadata::new("Color", "Demo.Color"))
                .with_field(FieldMetadata::new("Access", "Demo.Access"))
                .with_field(FieldMetadata::new("Address", "Demo.Address"))
                .with_field(FieldMetadata::new("Category", "Demo.Category").as_navigation()),
        )
        .with_entity(
            EntityConfig::entity("SpecialProduct")
                .with_base("Demo.Product")
                .with_field(FieldMetadata::new("Discount", "Edm.Int32")),
        )
        .with_entity(
            EntityConfig::entity("Category")
                .with_set("Categories")
                .with_field(FieldMetadata::new("ID", "Edm.String").as_key())
                .with_field(FieldMetadata::new("Name", "Edm.String"))
                .with_field(
                    FieldMetadata::new("Products", "Demo.Product")
                        .as_navigation()
                        .as_collection(),
                ),
        )
        .with_entity(
            EntityConfig::complex("Address")
                .with_field(FieldMetadata::new("Street", "Edm.String"))
                .with_field(FieldMetadata::new("City", "Edm.String")),
        )
        .with_entity(
            EntityConfig::entity("OrderLine")
                .with_set("OrderLines")
                .with_field(FieldMetadata::new("OrderID", "Edm.Int32").as_key())
                .with_field(FieldMetadata::new("LineNo", "Edm.Int32").as_key())
                .with_field(FieldMetadata::new("Qty", "Edm.Int32")),
        )
        .with_enum(
            EnumConfig::new("Color")
                .with_member("Red", 1)
                .with_member("Green", 2)
                .with_member("Blue", 4),
        )
        .with_enum(
            EnumConfig::new("Access")
                .as_flags()
                .with_member("Read", 1)
                .with_member("Write", 2),
        )
        .with_callable(
            CallableConfig::new("GetNearestAirport")
                .with_parameter(FieldMetadata::new("lat", "Edm.Double"))
                .with_parameter(FieldMetadata::new("lon", "Edm.Double"))
                .returning("Edm.String"),
        )
        .with_callable(
            CallableConfig::new("TopProducts")
                .with_parameter(FieldMetadata::new("count", "Edm.Int32"))
                .returning("Collection(Demo.Product)"),
        )
        .with_callable(
            CallableConfig::new("Discount")
                .as_bound()
                .with_parameter(FieldMetadata::new("percentage", "Edm.Int32")),
        )
}

pub fn fixture_settings() -> Settings {
    Settings::builder("https://example.org/odata")
        .schema(fixture_schema())
        .build()
        .unwrap()
}

pub fn fixture_registry() -> TypeRegistry {
    fixture_settings().registry()
}

pub fn fixture_client() -> (ODataClient, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let client = ODataClient::new(fixture_settings(), transport.clone()).unwrap();
    (client, transport)
}
