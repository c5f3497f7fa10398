//! The interactive-environment seam.
//!
//! An interactive host can inspect its current location, navigate away for
//! the authorization redirect, and rewrite the visible location in place.
//! Sessions constructed without a host are non-interactive: a redirect is
//! never attempted and the authorization URL is surfaced to the caller
//! instead.

use std::sync::{Arc, Mutex};

use url::Url;

use crate::error::Error;
use crate::storage::StorageBackend;

/// Location access for interactive embeddings.
pub trait InteractiveHost: Send + Sync {
    /// The location the session is currently displayed at.
    fn location(&self) -> Url;

    /// Navigates away to `url`. In a real embedding this ends the current
    /// execution; the orchestrator returns a terminal redirect state right
    /// after calling it and never resumes the flow in the same pass.
    fn redirect(&self, url: &str) -> Result<(), Error>;

    /// Rewrites the visible location without navigating.
    fn replace_location(&self, url: &str) -> Result<(), Error>;
}

/// Everything an interactive embedding supplies to the session: location
/// access plus the two persistent storage backends.
pub struct HostBindings {
    pub host: Arc<dyn InteractiveHost>,
    pub primary: Arc<dyn StorageBackend>,
    pub backup: Arc<dyn StorageBackend>,
}

/// In-memory host for tests and headless harnesses. Records every redirect
/// and keeps the location as plain mutable state.
pub struct InMemoryHost {
    location: Mutex<Url>,
    redirects: Mutex<Vec<String>>,
}

impl InMemoryHost {
    pub fn new(location: Url) -> Self {
        InMemoryHost {
            location: Mutex::new(location),
            redirects: Mutex::new(Vec::new()),
        }
    }

    /// Every URL passed to [`InteractiveHost::redirect`] so far.
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().expect("host lock poisoned").clone()
    }

    /// Moves the host to a new location, as a navigation would.
    pub fn set_location(&self, location: Url) {
        *self.location.lock().expect("host lock poisoned") = location;
    }
}

impl InteractiveHost for InMemoryHost {
    fn location(&self) -> Url {
        self.location.lock().expect("host lock poisoned").clone()
    }

    fn redirect(&self, url: &str) -> Result<(), Error> {
        let target = Url::parse(url)
            .map_err(|e| Error::Network(format!("invalid redirect target '{url}': {e}")))?;
        self.redirects
            .lock()
            .expect("host lock poisoned")
            .push(url.to_string());
        self.set_location(target);
        Ok(())
    }

    fn replace_location(&self, url: &str) -> Result<(), Error> {
        let target = Url::parse(url)
            .map_err(|e| Error::Network(format!("invalid location '{url}': {e}")))?;
        self.set_location(target);
        Ok(())
    }
}
