//! Client for the identity provider's authorize and token endpoints.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::http::transport::{HttpTransport, Method, TransportRequest};

const AUTHORIZE_PATH: [&str; 3] = ["identity_", "connect", "authorize"];
const TOKEN_PATH: [&str; 3] = ["identity_", "connect", "token"];

/// Inputs for building the authorization redirect URL.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizeParams<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub code_challenge: &'a str,
    pub state: &'a str,
}

/// Inputs for the authorization-code-for-token exchange.
#[derive(Debug, Clone, Copy)]
pub struct TokenRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub code: &'a str,
    pub code_verifier: &'a str,
}

/// Token endpoint response. Opaque beyond the access token value; no
/// refresh token handling is modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Serialize)]
struct TokenExchangeForm<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    code_verifier: &'a str,
}

/// Builds authorization URLs and exchanges authorization codes for tokens.
pub struct AuthService {
    config: Arc<Config>,
    transport: Arc<dyn HttpTransport>,
}

impl AuthService {
    pub fn new(config: Arc<Config>, transport: Arc<dyn HttpTransport>) -> Self {
        AuthService { config, transport }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL '{}': {e}", self.config.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("base URL '{}' cannot carry a path", self.config.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// The provider's authorize endpoint with standard PKCE query
    /// parameters. Pure given its inputs.
    pub fn authorization_url(&self, params: AuthorizeParams<'_>) -> Result<String, Error> {
        let mut url = self.endpoint(&AUTHORIZE_PATH)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", params.client_id)
            .append_pair("redirect_uri", params.redirect_uri)
            .append_pair("code_challenge", params.code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", params.state);
        Ok(url.to_string())
    }

    /// Exchanges an authorization code for a token. A rejected code or
    /// verifier surfaces as a token-exchange error; nothing is retried.
    #[instrument(skip(self, request), level = "debug")]
    pub async fn get_access_token(&self, request: TokenRequest<'_>) -> Result<TokenResponse, Error> {
        let token_url = self.endpoint(&TOKEN_PATH)?;
        let form = TokenExchangeForm {
            grant_type: "authorization_code",
            code: request.code,
            redirect_uri: request.redirect_uri,
            client_id: request.client_id,
            code_verifier: request.code_verifier,
        };
        let body = serde_urlencoded::to_string(&form)
            .map_err(|e| Error::TokenExchange(format!("failed to encode request: {e}")))?;

        let response = self
            .transport
            .execute(TransportRequest {
                method: Method::Post,
                url: token_url.to_string(),
                headers: vec![(
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                )],
                body: Some(body.into_bytes()),
            })
            .await?;

        if response.status != 200 {
            return Err(Error::TokenExchange(exchange_failure_message(
                response.status,
                &response.body,
            )));
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| Error::TokenExchange(format!("malformed token response: {e}")))
    }
}

fn exchange_failure_message(status: u16, body: &[u8]) -> String {
    let detail = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["error_description", "error", "message"]
                .iter()
                .find_map(|key| v.get(key).and_then(|d| d.as_str()).map(str::to_string))
        });
    match detail {
        Some(detail) => format!("provider returned status {status}: {detail}"),
        None => format!("provider returned status {status}"),
    }
}
