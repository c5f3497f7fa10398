//! Validated connection parameters for one Maestro cloud session.

use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::error::Error;

/// Default cloud endpoint used when no base URL is supplied.
pub const DEFAULT_BASE_URL: &str = "https://cloud.maestro.io";

/// Connection parameters. Exactly one authentication mode must be viable:
/// a static `secret`, or both `client_id` and `redirect_uri` for the
/// authorization-code flow. Validation fails closed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Cloud endpoint all request URLs are joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Organization segment of every request URL.
    pub org_name: String,
    /// Tenant segment of every request URL.
    pub tenant_name: String,
    /// Static bearer credential. Takes precedence over the code flow.
    #[serde(default)]
    pub secret: Option<String>,
    /// OAuth2 client identifier for the authorization-code flow.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Redirect target registered for `client_id`.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Account scoping identifier, sent as the organization-scope header.
    #[serde(default)]
    pub account_id: Option<Uuid>,
    /// Tenant scoping identifier, sent as the tenant-scope header.
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    /// Folder scoping identifier, sent as the folder-scope header.
    #[serde(default)]
    pub folder_key: Option<Uuid>,
}

/// How the session authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Static secret used directly as the bearer fallback. No network call.
    Secret(String),
    /// PKCE authorization-code flow against the identity endpoints.
    AuthorizationCode {
        client_id: String,
        redirect_uri: String,
    },
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.as_str()).filter(|s| !s.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: default_base_url(),
            org_name: String::new(),
            tenant_name: String::new(),
            secret: None,
            client_id: None,
            redirect_uri: None,
            account_id: None,
            tenant_id: None,
            folder_key: None,
        }
    }
}

impl Config {
    /// Checks every invariant this type carries. Called at facade
    /// construction; nothing downstream re-validates.
    pub fn validate(&self) -> Result<(), Error> {
        if self.org_name.is_empty() {
            return Err(Error::Config("organization name must not be empty".into()));
        }
        if self.tenant_name.is_empty() {
            return Err(Error::Config("tenant name must not be empty".into()));
        }
        Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL '{}': {e}", self.base_url)))?;
        if let Some(redirect_uri) = non_empty(self.redirect_uri.as_ref()) {
            Url::parse(redirect_uri)
                .map_err(|e| Error::Config(format!("invalid redirect URI '{redirect_uri}': {e}")))?;
        }
        self.auth_mode().map(|_| ())
    }

    /// Resolves the viable authentication mode, failing closed when neither
    /// is fully specified. A present secret wins over a partial or complete
    /// client registration.
    pub fn auth_mode(&self) -> Result<AuthMode, Error> {
        if let Some(secret) = non_empty(self.secret.as_ref()) {
            return Ok(AuthMode::Secret(secret.to_string()));
        }
        match (
            non_empty(self.client_id.as_ref()),
            non_empty(self.redirect_uri.as_ref()),
        ) {
            (Some(client_id), Some(redirect_uri)) => Ok(AuthMode::AuthorizationCode {
                client_id: client_id.to_string(),
                redirect_uri: redirect_uri.to_string(),
            }),
            _ => Err(Error::Config(
                "either secret or both clientId and redirectUri must be provided".into(),
            )),
        }
    }
}
