//! Authenticated-session core for the Maestro automation cloud.
//!
//! A PKCE authorization-code flow that works across interactive hosts
//! (which can redirect and reload) and non-interactive hosts (which
//! cannot), flow state that survives partial storage loss, and a
//! token-aware API client for everything that comes after.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod http;
pub mod maestro;
pub mod storage;

pub use auth::pkce::{PkceMaterial, code_challenge, generate_code_verifier};
pub use auth::service::{AuthService, AuthorizeParams, TokenRequest, TokenResponse};
pub use auth::session::{SessionOrchestrator, SessionState};
pub use config::{AuthMode, Config};
pub use context::ExecutionContext;
pub use error::Error;
pub use host::{HostBindings, InMemoryHost, InteractiveHost};
pub use http::client::{ApiClient, ApiResponse, ClientScope, ResponseBody};
pub use http::request::RequestSpec;
pub use http::transport::{
    HttpTransport, InMemoryTransport, Method, ReqwestTransport, TransportRequest,
    TransportResponse,
};
pub use maestro::Maestro;
pub use storage::{MemoryBackend, StorageBackend, StorageBroker};
