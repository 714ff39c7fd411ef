//! Typed OData client
//!
//! Builds resource URLs and query strings, sends requests through a pluggable
//! [`Transport`](api::Transport), and maps payloads onto entity models,
//! lazily resolved relations and paged collections.
//!
//! ```no_run
//! use odata_client::{ODataClient, RequestOptions, Settings};
//! use serde_json::json;
//!
//! # async fn demo(settings: Settings) -> odata_client::Result<()> {
//! let client = ODataClient::with_http(settings)?;
//! let products = client
//!     .entity_set("Products", "Demo.Product")?
//!     .select(json!(["Name", "Price"]))
//!     .filter(json!({"Price": {"gt": 5}}))
//!     .top(10);
//! let page = products.as_collection(products.fetch_entities(RequestOptions::new().with_count()).await?)?;
//! for model in &page {
//!     println!("{:?}", model.get("Name"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{
    HttpTransport, ODataClient, ODataError, RequestOptions, Resource, ResourceKind, Result,
    Transport, TransportError,
};
pub use config::{AcceptMetadata, Settings, SettingsBuilder};
pub use models::{Collection, EntityType, Model, PageState, Related, Relation};
pub use services::EntityService;
