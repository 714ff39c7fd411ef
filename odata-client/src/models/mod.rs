//! Entity models and collections bound to resources

pub mod collection;
pub mod model;
pub mod relation;

pub use collection::{Collection, PageState};
pub use model::Model;
pub use relation::{Related, Relation};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed entity struct tied to a configured entity type
///
/// Implementors are plain serde structs; field names follow the wire names
/// (use `#[serde(rename = "...")]` where they differ). Navigation relations are
/// reached through [`Model::get_navigation_property`] rather than struct fields.
pub trait EntityType: Serialize + DeserializeOwned {
    /// Qualified or alias-qualified type name, e.g. `Demo.Product`
    const TYPE_NAME: &'static str;
}
