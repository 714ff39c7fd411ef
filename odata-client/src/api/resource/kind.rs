use std::fmt;

/// What a resource addresses, derived from its last segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    EntitySet,
    /// Entity set or navigation segment with a key
    Entity,
    Singleton,
    NavigationProperty,
    Property,
    Function,
    Action,
    Value,
    Reference,
    Count,
    Metadata,
    Batch,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::EntitySet => "entity set",
            ResourceKind::Entity => "entity",
            ResourceKind::Singleton => "singleton",
            ResourceKind::NavigationProperty => "navigation property",
            ResourceKind::Property => "property",
            ResourceKind::Function => "function",
            ResourceKind::Action => "action",
            ResourceKind::Value => "$value",
            ResourceKind::Reference => "$ref",
            ResourceKind::Count => "$count",
            ResourceKind::Metadata => "$metadata",
            ResourceKind::Batch => "$batch",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, ResourceKind::Function | ResourceKind::Action)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
