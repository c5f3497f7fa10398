//! Token-aware API client.
//!
//! Builds fully-qualified request URLs from org/tenant/path, composes
//! headers from the execution context and the configured scopes, and
//! classifies responses into typed results.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use crate::config::Config;
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::http::request::RequestSpec;
use crate::http::transport::{HttpTransport, Method, TransportRequest, TransportResponse};

/// Tenant-scope header.
pub const HEADER_TENANT_ID: &str = "X-TenantId";
/// Organization-scope header.
pub const HEADER_ORGANIZATION_UNIT_ID: &str = "X-OrganizationUnitId";
/// Folder-scope header.
pub const HEADER_FOLDER_KEY: &str = "X-FolderKey";

/// Per-client scoping overrides and extra headers, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct ClientScope {
    /// Overrides the config's tenant id for the tenant-scope header.
    pub tenant_id: Option<String>,
    /// Overrides the config's account id for the organization-scope header.
    pub organization_unit_id: Option<String>,
    /// Extra headers merged into every request's defaults.
    pub headers: HashMap<String, String>,
}

/// Classified response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// 204: the explicit no-content value. Never parsed.
    Empty,
    /// Parsed JSON.
    Json(serde_json::Value),
    /// Raw text, returned when the caller asked for `application/xml`.
    Text(String),
}

/// A successful API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ApiResponse {
    /// Deserializes the body into `T`. The no-content value deserializes
    /// as JSON `null`, so optional targets map it to `None`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let value = match &self.body {
            ResponseBody::Json(value) => serde_json::from_value(value.clone())?,
            ResponseBody::Text(text) => serde_json::from_str(text)?,
            ResponseBody::Empty => serde_json::from_value(serde_json::Value::Null)?,
        };
        Ok(value)
    }
}

/// Issues authenticated requests against the configured org and tenant.
pub struct ApiClient {
    config: Arc<Config>,
    context: Arc<ExecutionContext>,
    scope: ClientScope,
    default_headers: RwLock<HashMap<String, String>>,
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(
        config: Arc<Config>,
        context: Arc<ExecutionContext>,
        scope: ClientScope,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        ApiClient {
            config,
            context,
            scope,
            default_headers: RwLock::new(HashMap::new()),
            transport,
        }
    }

    /// Merges `headers` into the client-level defaults applied to every
    /// subsequent request. Later calls win key for key.
    pub fn set_default_headers(&self, headers: HashMap<String, String>) {
        let mut defaults = self
            .default_headers
            .write()
            .expect("header lock poisoned");
        defaults.extend(headers);
    }

    fn computed_default_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(bearer) = self
            .context
            .token()
            .or_else(|| self.config.secret.clone().filter(|s| !s.is_empty()))
        {
            headers.insert("Authorization".to_string(), format!("Bearer {bearer}"));
        }
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(
            "User-Agent".to_string(),
            format!("maestro-sdk-rust/{}", env!("CARGO_PKG_VERSION")),
        );
        if let Some(tenant_id) = self
            .scope
            .tenant_id
            .clone()
            .or_else(|| self.config.tenant_id.map(|id| id.to_string()))
        {
            headers.insert(HEADER_TENANT_ID.to_string(), tenant_id);
        }
        if let Some(organization_unit_id) = self
            .scope
            .organization_unit_id
            .clone()
            .or_else(|| self.config.account_id.map(|id| id.to_string()))
        {
            headers.insert(HEADER_ORGANIZATION_UNIT_ID.to_string(), organization_unit_id);
        }
        if let Some(folder_key) = self.config.folder_key {
            headers.insert(HEADER_FOLDER_KEY.to_string(), folder_key.to_string());
        }
        for (key, value) in &self.scope.headers {
            headers.insert(key.clone(), value.clone());
        }
        headers
    }

    fn build_url(&self, path: &str, params: &[(String, String)]) -> Result<String, Error> {
        let normalized = path.strip_prefix('/').unwrap_or(path);
        let base = Url::parse(&self.config.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL '{}': {e}", self.config.base_url)))?;
        let relative = format!(
            "{}/{}/{}",
            self.config.org_name, self.config.tenant_name, normalized
        );
        let mut url = base
            .join(&relative)
            .map_err(|e| Error::Config(format!("invalid request path '{path}': {e}")))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    /// Issues one request. Headers merge in order: computed defaults,
    /// client-level defaults, per-call overrides; later sources win key
    /// for key.
    #[instrument(skip(self, spec), level = "debug", fields(method = method.as_str(), path = path))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        spec: RequestSpec,
    ) -> Result<ApiResponse, Error> {
        let url = self.build_url(path, &spec.params)?;

        let mut headers = self.computed_default_headers();
        {
            let defaults = self
                .default_headers
                .read()
                .expect("header lock poisoned");
            for (key, value) in defaults.iter() {
                headers.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &spec.headers {
            headers.insert(key.clone(), value.clone());
        }

        let body = match &spec.body {
            Some(value) => Some(serde_json::to_vec(value)?),
            None => None,
        };
        let request = TransportRequest {
            method,
            url,
            headers: headers
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            body,
        };

        let response = match &spec.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                result = self.transport.execute(request) => result?,
            },
            None => self.transport.execute(request).await?,
        };

        classify_response(&headers, response)
    }

    pub async fn get(&self, path: &str, spec: RequestSpec) -> Result<ApiResponse, Error> {
        self.request(Method::Get, path, spec).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        mut spec: RequestSpec,
    ) -> Result<ApiResponse, Error> {
        spec.body = body;
        self.request(Method::Post, path, spec).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        mut spec: RequestSpec,
    ) -> Result<ApiResponse, Error> {
        spec.body = body;
        self.request(Method::Put, path, spec).await
    }

    pub async fn patch(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        mut spec: RequestSpec,
    ) -> Result<ApiResponse, Error> {
        spec.body = body;
        self.request(Method::Patch, path, spec).await
    }

    pub async fn delete(&self, path: &str, spec: RequestSpec) -> Result<ApiResponse, Error> {
        self.request(Method::Delete, path, spec).await
    }
}

fn classify_response(
    request_headers: &HashMap<String, String>,
    response: TransportResponse,
) -> Result<ApiResponse, Error> {
    let status = response.status;
    if !(200..300).contains(&status) {
        return Err(Error::Http {
            status,
            message: failure_message(status, &response.body),
        });
    }
    if status == 204 {
        return Ok(ApiResponse {
            status,
            body: ResponseBody::Empty,
        });
    }
    let accept = request_headers
        .get("Accept")
        .or_else(|| request_headers.get("accept"));
    if accept.map(String::as_str) == Some("application/xml") {
        return Ok(ApiResponse {
            status,
            body: ResponseBody::Text(String::from_utf8_lossy(&response.body).into_owned()),
        });
    }
    let value = serde_json::from_slice(&response.body)?;
    Ok(ApiResponse {
        status,
        body: ResponseBody::Json(value),
    })
}

/// Extracts a failure message from the response body: a JSON `message`,
/// an RFC 7807 `detail` or `title`, falling back to the status text.
fn failure_message(status: u16, body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "detail", "title"]
                .iter()
                .find_map(|key| v.get(key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("request failed")
                .to_string()
        })
}
