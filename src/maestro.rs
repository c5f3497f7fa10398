//! Session facade tying the pieces together.

use std::sync::Arc;

use crate::auth::service::AuthService;
use crate::auth::session::{SessionOrchestrator, SessionState};
use crate::config::Config;
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::host::HostBindings;
use crate::http::client::{ApiClient, ClientScope};
use crate::http::transport::{HttpTransport, ReqwestTransport};
use crate::storage::StorageBroker;

/// One authenticated session against the Maestro cloud: the validated
/// configuration, one execution context, one API client, and the
/// authorization flow that makes the client usable.
///
/// [`Maestro::initialize`] must run to a [`SessionState::Ready`] outcome
/// before API calls are issued.
pub struct Maestro {
    config: Arc<Config>,
    context: Arc<ExecutionContext>,
    session: SessionOrchestrator,
    api: ApiClient,
}

impl Maestro {
    /// A non-interactive session. The flow cannot redirect; in
    /// authorization-code mode, `initialize` surfaces the authorization
    /// URL instead.
    pub fn new(config: Config) -> Result<Self, Error> {
        Self::with_transport(config, None, Arc::new(ReqwestTransport::new()))
    }

    /// An interactive session using the embedding's location access and
    /// storage backends.
    pub fn interactive(config: Config, bindings: HostBindings) -> Result<Self, Error> {
        Self::with_transport(config, Some(bindings), Arc::new(ReqwestTransport::new()))
    }

    /// Full-control constructor; validation still fails closed.
    pub fn with_transport(
        config: Config,
        bindings: Option<HostBindings>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let config = Arc::new(config);
        let context = Arc::new(ExecutionContext::from_env());
        let (broker, host) = match bindings {
            Some(bindings) => (
                StorageBroker::new(bindings.primary, Some(bindings.backup)),
                Some(bindings.host),
            ),
            None => (StorageBroker::in_memory(), None),
        };
        let auth = AuthService::new(config.clone(), transport.clone());
        let session =
            SessionOrchestrator::new(config.clone(), context.clone(), auth, broker, host);
        let api = ApiClient::new(
            config.clone(),
            context.clone(),
            ClientScope::default(),
            transport,
        );
        Ok(Maestro {
            config,
            context,
            session,
            api,
        })
    }

    /// Runs the authorization flow to a terminal state. A no-op once
    /// Ready.
    pub async fn initialize(&self) -> Result<SessionState, Error> {
        self.session.initialize().await
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
