//! PKCE authorization flow: material generation, the identity-endpoint
//! client, and the session state machine.

pub mod pkce;
pub mod service;
pub mod session;
