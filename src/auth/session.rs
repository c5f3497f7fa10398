//! The `initialize` state machine.
//!
//! Sequences the auth service, the storage broker, and the execution
//! context into a terminal outcome: a ready session, an issued redirect,
//! or an authorization URL the caller must visit because the host cannot
//! redirect. Loss or corruption of the persisted flow state during the
//! callback is recovered by restarting the flow, not surfaced as a crash.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::pkce::PkceMaterial;
use crate::auth::service::{AuthService, AuthorizeParams, TokenRequest};
use crate::config::{AuthMode, Config};
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::host::InteractiveHost;
use crate::storage::StorageBroker;

/// Persisted key for the PKCE code verifier.
pub const CODE_VERIFIER_KEY: &str = "maestro_code_verifier";
/// Persisted key for the round-trip state token.
pub const STATE_KEY: &str = "maestro_state";
/// Persisted key for the location to return to after authorization.
pub const RETURN_URL_KEY: &str = "maestro_return_url";

/// Terminal outcome of [`SessionOrchestrator::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Authenticated; the API client may issue requests.
    Ready,
    /// The interactive host has been told to navigate to the authorization
    /// endpoint. The current execution is over; the flow resumes on the
    /// callback in a later execution.
    RedirectIssued { authorize_url: String },
    /// The host cannot redirect. The caller must complete authorization
    /// out of band at this URL.
    AuthorizationRequired { authorize_url: String },
}

/// Owns one session's authorization flow.
pub struct SessionOrchestrator {
    config: Arc<Config>,
    context: Arc<ExecutionContext>,
    auth: AuthService,
    broker: StorageBroker,
    host: Option<Arc<dyn InteractiveHost>>,
    ready: AtomicBool,
}

impl SessionOrchestrator {
    pub fn new(
        config: Arc<Config>,
        context: Arc<ExecutionContext>,
        auth: AuthService,
        broker: StorageBroker,
        host: Option<Arc<dyn InteractiveHost>>,
    ) -> Self {
        SessionOrchestrator {
            config,
            context,
            auth,
            broker,
            host,
            ready: AtomicBool::new(false),
        }
    }

    /// Runs the flow to a terminal state. Calling again once Ready is a
    /// no-op.
    #[instrument(skip(self), level = "debug")]
    pub async fn initialize(&self) -> Result<SessionState, Error> {
        if self.ready.load(Ordering::SeqCst) {
            return Ok(SessionState::Ready);
        }
        match self.config.auth_mode()? {
            AuthMode::Secret(_) => {
                // The secret itself is the bearer fallback at request time.
                debug!("static secret configured, session ready without network");
                self.ready.store(true, Ordering::SeqCst);
                Ok(SessionState::Ready)
            }
            AuthMode::AuthorizationCode {
                client_id,
                redirect_uri,
            } => {
                if let Some(host) = self.host.clone() {
                    let location = host.location();
                    if let Some((code, returned_state)) = callback_params(&location) {
                        return self
                            .process_callback(
                                &host,
                                &location,
                                &client_id,
                                &redirect_uri,
                                &code,
                                &returned_state,
                            )
                            .await;
                    }
                }
                self.start_flow(&client_id, &redirect_uri).await
            }
        }
    }

    /// FlowStarting: generate fresh material, persist it, verify the write
    /// actually stuck, then hand the authorization URL to the host or the
    /// caller. Never redirects with unpersisted state.
    async fn start_flow(&self, client_id: &str, redirect_uri: &str) -> Result<SessionState, Error> {
        let pkce = PkceMaterial::generate();
        self.broker.set(CODE_VERIFIER_KEY, &pkce.code_verifier).await?;
        self.broker.set(STATE_KEY, &pkce.state).await?;

        let stored_state = self.broker.get(STATE_KEY).await;
        let stored_verifier = self.broker.get(CODE_VERIFIER_KEY).await;
        if stored_state.as_deref() != Some(pkce.state.as_str())
            || stored_verifier.as_deref() != Some(pkce.code_verifier.as_str())
        {
            return Err(Error::StorageUnavailable(
                "flow state could not be persisted before redirect".into(),
            ));
        }

        let authorize_url = self.auth.authorization_url(AuthorizeParams {
            client_id,
            redirect_uri,
            code_challenge: &pkce.code_challenge,
            state: &pkce.state,
        })?;

        match &self.host {
            None => {
                debug!("non-interactive host, exposing authorization URL");
                Ok(SessionState::AuthorizationRequired { authorize_url })
            }
            Some(host) => {
                self.broker
                    .set(RETURN_URL_KEY, host.location().as_str())
                    .await?;
                host.redirect(&authorize_url)?;
                Ok(SessionState::RedirectIssued { authorize_url })
            }
        }
    }

    /// CallbackProcessing: verify the persisted state against the returned
    /// one, exchange the code, clean up, and become Ready. Integrity
    /// failures restart the flow; the restarted pass cannot loop because
    /// the callback parameters are stripped first.
    async fn process_callback(
        &self,
        host: &Arc<dyn InteractiveHost>,
        location: &Url,
        client_id: &str,
        redirect_uri: &str,
        code: &str,
        returned_state: &str,
    ) -> Result<SessionState, Error> {
        let code_verifier = match self.verify_flow_state(returned_state).await {
            Ok(code_verifier) => code_verifier,
            Err(Error::StateLost) => {
                warn!("stored state or verifier lost, restarting authorization flow");
                return self.restart_flow(host, location, client_id, redirect_uri).await;
            }
            Err(Error::StateMismatch) => {
                warn!("returned state does not match stored state, restarting authorization flow");
                return self.restart_flow(host, location, client_id, redirect_uri).await;
            }
            Err(e) => return Err(e),
        };

        let exchange = self
            .auth
            .get_access_token(TokenRequest {
                client_id,
                redirect_uri,
                code,
                code_verifier: &code_verifier,
            })
            .await;
        // The triple must not outlive a verified exchange, whichever way
        // the exchange went.
        self.clear_flow_state().await;
        let token = exchange?;

        self.context.update_token(token.access_token);
        host.replace_location(strip_callback_params(location).as_str())?;
        self.ready.store(true, Ordering::SeqCst);
        debug!("authorization code exchanged, session ready");
        Ok(SessionState::Ready)
    }

    /// Reads the stored state and verifier back and checks them against
    /// the returned state. Empty values count as lost.
    async fn verify_flow_state(&self, returned_state: &str) -> Result<String, Error> {
        let stored_state = self
            .broker
            .get(STATE_KEY)
            .await
            .filter(|s| !s.is_empty());
        let stored_verifier = self
            .broker
            .get(CODE_VERIFIER_KEY)
            .await
            .filter(|s| !s.is_empty());
        match (stored_state, stored_verifier) {
            (Some(stored_state), Some(stored_verifier)) => {
                if stored_state == returned_state {
                    Ok(stored_verifier)
                } else {
                    Err(Error::StateMismatch)
                }
            }
            _ => Err(Error::StateLost),
        }
    }

    /// Clears partial state, strips the callback query from the visible
    /// location, and re-enters FlowStarting. Runs at most once per
    /// callback attempt.
    async fn restart_flow(
        &self,
        host: &Arc<dyn InteractiveHost>,
        location: &Url,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<SessionState, Error> {
        self.clear_flow_state().await;
        host.replace_location(strip_query(location).as_str())?;
        self.start_flow(client_id, redirect_uri).await
    }

    async fn clear_flow_state(&self) {
        self.broker.remove(CODE_VERIFIER_KEY).await;
        self.broker.remove(STATE_KEY).await;
        self.broker.remove(RETURN_URL_KEY).await;
    }
}

/// The callback's `code` and `state` query parameters, when both are
/// present and non-empty.
fn callback_params(location: &Url) -> Option<(String, String)> {
    let mut code = None;
    let mut state = None;
    for (key, value) in location.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "state" if !value.is_empty() => state = Some(value.into_owned()),
            _ => {}
        }
    }
    Some((code?, state?))
}

/// Removes `code` and `state` from the location, preserving every other
/// query pair and the fragment.
fn strip_callback_params(location: &Url) -> Url {
    let remaining: Vec<(String, String)> = location
        .query_pairs()
        .filter(|(key, _)| key != "code" && key != "state")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let mut cleaned = location.clone();
    cleaned.set_query(None);
    if !remaining.is_empty() {
        let mut pairs = cleaned.query_pairs_mut();
        for (key, value) in &remaining {
            pairs.append_pair(key, value);
        }
    }
    cleaned
}

/// Drops the entire query and fragment, as a navigation back to the bare
/// path would.
fn strip_query(location: &Url) -> Url {
    let mut cleaned = location.clone();
    cleaned.set_query(None);
    cleaned.set_fragment(None);
    cleaned
}
