//! Caller-level services built on resources and models
//!
//! These compose the core operations into the shortcuts applications use
//! most, such as fetch-or-create and save by key presence.

pub mod entity;

pub use entity::EntityService;
