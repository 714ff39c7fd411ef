//! Service model metadata: schemas, field metadata, type registry and parsers

pub mod models;
pub mod parser;
pub mod registry;

pub use models::{CallableConfig, EntityConfig, EnumConfig, FieldMetadata, SchemaConfig};
pub use parser::{EdmType, Parser};
pub use registry::TypeRegistry;
