//! Generic HTTP transport seam with a `reqwest` implementation and an
//! in-memory stub for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Error;

/// HTTP method subset used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// One outbound HTTP call.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// The raw result of executing a call.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Executes HTTP calls. The API client and the auth service both go
/// through this seam, so tests swap in [`InMemoryTransport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, Error>;
}

/// Transport backed by a shared `reqwest` client. No implicit timeout is
/// configured; cancellation only happens through the caller's request
/// spec.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(key, value)| {
                (
                    key.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .to_vec();
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

/// In-memory transport stub. Responses are registered per URL with an
/// optional default on miss; every executed request is recorded so tests
/// can assert on composed headers and bodies.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    responses: Arc<DashMap<String, TransportResponse>>,
    default_response: Arc<Mutex<Option<TransportResponse>>>,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
}

impl InMemoryTransport {
    /// A stub with no default response; unmatched URLs fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// A stub answering every unmatched URL with `response`.
    pub fn with_default(response: TransportResponse) -> Self {
        let transport = Self::new();
        *transport
            .default_response
            .lock()
            .expect("transport lock poisoned") = Some(response);
        transport
    }

    /// Registers a response for a specific URL.
    pub fn insert_response(&self, url: impl Into<String>, response: TransportResponse) {
        self.responses.insert(url.into(), response);
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .expect("transport lock poisoned")
            .clone()
    }
}

#[async_trait]
impl HttpTransport for InMemoryTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let url = request.url.clone();
        self.requests
            .lock()
            .expect("transport lock poisoned")
            .push(request);
        if let Some(entry) = self.responses.get(&url) {
            return Ok(entry.value().clone());
        }
        let default = self
            .default_response
            .lock()
            .expect("transport lock poisoned")
            .clone();
        default.ok_or_else(|| Error::Network(format!("no mock response for url {url}")))
    }
}
