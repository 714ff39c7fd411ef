//! OData API layer
//!
//! Resource addressing, query options, response interpretation and the
//! transport seam, tied together by [`ODataClient`].

pub mod client;
pub mod error;
pub mod metadata;
pub mod query;
pub mod resource;
pub mod response;
pub mod transport;

pub use client::ODataClient;
pub use error::{ODataError, Result, TransportError};
pub use metadata::{
    CallableConfig, EdmType, EntityConfig, EnumConfig, FieldMetadata, Parser, SchemaConfig,
    TypeRegistry,
};
pub use query::{Alias, OptionValue, QueryOption, QueryOptions, QueryParams};
pub use resource::{EntityKey, RequestOptions, Resource, ResourceKind};
pub use response::{
    EntitiesAnnotations, EntitiesResponse, EntityAnnotations, EntityResponse, PropertyAnnotations,
    PropertyResponse,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ResponseBody, Transport};
