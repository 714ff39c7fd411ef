//! Per-call request options

use crate::api::query::QueryParams;
use std::collections::BTreeMap;

/// Extra headers, params and preconditions for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    pub params: QueryParams,
    /// Sent as `If-Match`
    pub etag: Option<String>,
    /// Adds `$count=true`
    pub with_count: bool,
    pub with_credentials: Option<bool>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn etag_opt(mut self, etag: Option<String>) -> Self {
        if etag.is_some() {
            self.etag = etag;
        }
        self
    }

    pub fn with_count(mut self) -> Self {
        self.with_count = true;
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = Some(with_credentials);
        self
    }
}
