//! Per-call request description.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

/// Describes one outbound API call beyond its method and path: extra
/// headers, query parameters, an optional JSON body, and an optional
/// cancellation signal. A value object, constructed per call and never
/// reused.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    /// Per-call header overrides. Win over every computed default,
    /// key for key.
    pub headers: HashMap<String, String>,
    /// Query parameters appended to the request URL. Values are already
    /// string-coerced by the caller.
    pub params: Vec<(String, String)>,
    /// JSON body. The mutating verb wrappers fill this in.
    pub body: Option<serde_json::Value>,
    /// Cooperative cancellation for the in-flight network operation.
    pub cancel: Option<CancellationToken>,
}

impl RequestSpec {
    pub fn new() -> Self {
        Self::default()
    }
}
