//! Run-scoped execution context: fixed identifiers plus the bearer token.

use std::sync::RwLock;

use tracing::debug;

/// Environment variable carrying the process instance key.
pub const ENV_INSTANCE_KEY: &str = "MAESTRO_INSTANCE_KEY";
/// Environment variable carrying the process instance id.
pub const ENV_INSTANCE_ID: &str = "MAESTRO_INSTANCE_ID";
/// Environment variable carrying the robot key.
pub const ENV_ROBOT_KEY: &str = "MAESTRO_ROBOT_KEY";

/// Holds the identifiers of the current run and the bearer token used for
/// API requests. One instance per session, shared by reference with the
/// API client; the token is the only mutable part and changes through
/// [`ExecutionContext::update_token`] alone.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    instance_key: Option<String>,
    instance_id: Option<String>,
    robot_key: Option<String>,
    token: RwLock<Option<String>>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl ExecutionContext {
    /// A context with no run identifiers and no token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from the host environment variables set for
    /// robot-hosted runs. Absent variables leave the identifiers unset.
    pub fn from_env() -> Self {
        ExecutionContext {
            instance_key: env_var(ENV_INSTANCE_KEY),
            instance_id: env_var(ENV_INSTANCE_ID),
            robot_key: env_var(ENV_ROBOT_KEY),
            token: RwLock::new(None),
        }
    }

    pub fn instance_key(&self) -> Option<&str> {
        self.instance_key.as_deref()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn robot_key(&self) -> Option<&str> {
        self.robot_key.as_deref()
    }

    /// Replaces the access token used for API requests.
    pub fn update_token(&self, token: impl Into<String>) {
        let mut guard = self.token.write().expect("token lock poisoned");
        *guard = Some(token.into());
        debug!("execution context token updated");
    }

    /// The current access token, if one has been set.
    pub fn token(&self) -> Option<String> {
        self.token.read().expect("token lock poisoned").clone()
    }
}
