//! Token-aware HTTP request layer: the transport seam, the per-call
//! request description, and the API client built on both.

pub mod client;
pub mod request;
pub mod transport;
