//! Transport seam
//!
//! The client hands fully merged requests to a [`Transport`] and gets a response
//! envelope back. [`HttpTransport`] is the reqwest-backed default; tests plug in
//! a recording mock.

pub mod http;

pub use http::HttpTransport;

use crate::api::error::TransportError;
use crate::api::query::QueryParams;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request with headers and parameters already merged
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL without query string
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub params: QueryParams,
    pub body: Option<Value>,
    /// Browser-style cross-origin credentials flag. Transports without an
    /// origin model ignore it; [`HttpTransport`](http::HttpTransport) sends
    /// whatever `Authorization` or cookie headers the request carries.
    pub with_credentials: bool,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URL including the encoded query string
    pub fn full_url(&self) -> String {
        if self.params.is_empty() {
            self.url.clone()
        } else {
            format!("{}?{}", self.url, self.params.to_query_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

/// Response envelope: status, lower-cased headers and decoded body
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::new(status, ResponseBody::Json(body))
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, ResponseBody::Empty)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// ETag response header
    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Body as text; JSON bodies are re-serialized
    pub fn text(&self) -> String {
        match &self.body {
            ResponseBody::Empty => String::new(),
            ResponseBody::Text(s) => s.clone(),
            ResponseBody::Json(Value::String(s)) => s.clone(),
            ResponseBody::Json(v) => v.to_string(),
        }
    }
}

/// Executes HTTP requests on behalf of the client
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_headers_are_case_insensitive() {
        let response = HttpResponse::json(200, json!({})).with_header("ETag", "W/\"1\"");
        assert_eq!(response.etag(), Some("W/\"1\""));
        assert_eq!(response.header("etag"), Some("W/\"1\""));
        assert!(response.is_success());
    }

    #[test]
    fn test_full_url_appends_encoded_params() {
        let request = HttpRequest {
            method: Method::Get,
            url: "https://example.org/svc/Products".to_string(),
            headers: BTreeMap::new(),
            params: vec![("$top", "5"), ("$filter", "Name eq 'a b'")]
                .into_iter()
                .collect(),
            body: None,
            with_credentials: false,
        };
        assert_eq!(
            request.full_url(),
            "https://example.org/svc/Products?$top=5&$filter=Name%20eq%20%27a%20b%27"
        );
    }
}
