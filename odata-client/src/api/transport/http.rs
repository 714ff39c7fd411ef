//! reqwest-backed transport

use super::{HttpRequest, HttpResponse, Method, ResponseBody, Transport};
use crate::api::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default transport over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.full_url();
        if request.with_credentials {
            log::trace!("with_credentials has no effect on {} {}", request.method, url);
        }
        let mut builder = self.http.request(Self::method(request.method), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let is_json = headers
            .get("content-type")
            .is_some_and(|ct| ct.contains("json"));
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(TransportError::Status { status, body: text });
        }

        let body = if text.is_empty() {
            ResponseBody::Empty
        } else if is_json {
            let value: Value = serde_json::from_str(&text)
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            ResponseBody::Json(value)
        } else {
            ResponseBody::Text(text)
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
