//! Query options and their rendering into OData query grammar
//!
//! `options` holds the option algebra (scalar/list/keyed values), `builder`
//! renders values into `$select`, `$filter`, `$expand`, `$apply` and literals.

pub mod builder;
pub mod options;

pub use builder::{alias, datetime, duration, enum_member, guid, literal, raw};
pub use options::{Alias, OptionHandle, OptionValue, QueryOption, QueryOptions, QueryParams};
