//! Related values held by a model: complex sub-values and navigation relations

use super::{Collection, Model};
use crate::api::metadata::FieldMetadata;
use serde_json::Value;

/// A related single model or collection
#[derive(Debug, Clone)]
pub enum Related {
    Model(Box<Model>),
    Collection(Collection),
}

impl Related {
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Related::Model(model) => Some(model),
            Related::Collection(_) => None,
        }
    }

    pub fn as_model_mut(&mut self) -> Option<&mut Model> {
        match self {
            Related::Model(model) => Some(model),
            Related::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Related::Collection(collection) => Some(collection),
            Related::Model(_) => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut Collection> {
        match self {
            Related::Collection(collection) => Some(collection),
            Related::Model(_) => None,
        }
    }

    /// Wire payload of the related value
    pub fn to_json(&self) -> Value {
        match self {
            Related::Model(model) => Value::Object(model.to_entity()),
            Related::Collection(collection) => Value::Array(
                collection
                    .to_entities()
                    .into_iter()
                    .map(Value::Object)
                    .collect(),
            ),
        }
    }
}

/// Cached navigation relation
#[derive(Debug, Clone)]
pub struct Relation {
    pub field: FieldMetadata,
    /// `None` once the relation has been cleared
    pub related: Option<Related>,
    /// Set or cleared since the last populate
    pub changed: bool,
}
