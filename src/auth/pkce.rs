//! PKCE material generation using `ring`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use uuid::Uuid;

/// One flow attempt's worth of PKCE parameters. Generated fresh per
/// attempt and never reused.
#[derive(Debug, Clone)]
pub struct PkceMaterial {
    /// Random secret proving possession during the token exchange.
    pub code_verifier: String,
    /// S256 digest of the verifier, sent in the authorization request.
    pub code_challenge: String,
    /// Opaque token correlating the redirect round-trip.
    pub state: String,
}

impl PkceMaterial {
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = code_challenge(&code_verifier);
        let state = Uuid::new_v4().to_string();
        PkceMaterial {
            code_verifier,
            code_challenge,
            state,
        }
    }
}

/// Generates a cryptographically random code verifier: 32 bytes of system
/// randomness encoded base64url without padding, yielding 43 characters
/// from the unreserved set. Inability to obtain randomness is fatal.
pub fn generate_code_verifier() -> String {
    let rng = SystemRandom::new();
    let mut buf = [0u8; 32];
    rng.fill(&mut buf).expect("code verifier generation failed");
    URL_SAFE_NO_PAD.encode(buf)
}

/// Derives the S256 code challenge: base64url SHA-256 of the verifier,
/// no padding. Deterministic.
pub fn code_challenge(verifier: &str) -> String {
    let hash = digest::digest(&digest::SHA256, verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}
