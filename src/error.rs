//! Error taxonomy for the session core and API client.

use thiserror::Error;

/// Errors surfaced by configuration, the authorization flow, and the API
/// client.
///
/// `StateLost` and `StateMismatch` are recovered inside the session
/// orchestrator by restarting the flow; they never escape `initialize`.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or contradictory connection parameters. Fatal at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A persistence backend failed where failure cannot be papered over
    /// (the primary write, or the read-back verification before a redirect).
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The persisted code verifier or state vanished before the callback.
    #[error("authorization flow state lost")]
    StateLost,

    /// The state returned on the callback does not match the stored one.
    #[error("authorization state mismatch")]
    StateMismatch,

    /// The provider rejected the code/verifier pair, or the token response
    /// was not usable. Never retried automatically.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// Non-success API response, carrying the HTTP status and the message
    /// extracted from the response body.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport-level failure before any HTTP status was produced.
    #[error("network error: {0}")]
    Network(String),

    /// A response body could not be decoded as the expected JSON shape.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The caller cancelled the request through its `RequestSpec`.
    #[error("request cancelled")]
    Cancelled,
}
