//! Provider Authentication
//!
//! Bearer tokens come from the environment only. A missing token is not an
//! error: clients skip the network and serve their static fallback.

/// A credential a provider client needs, with a hint for the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialSpec {
    pub env_var: &'static str,
    pub description: &'static str,
}

/// Validate a token's shape: non-empty, printable ASCII, no whitespace
fn validate_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_graphic())
}

/// Read a bearer token from the environment
/// Security: rejects tokens with whitespace or control characters
pub fn token_from_env(var: &str) -> Option<String> {
    let value = std::env::var(var).ok()?;
    let token = value.trim();

    if token.is_empty() {
        return None;
    }
    if !validate_token(token) {
        tracing::warn!("Ignoring malformed token in {}", var);
        return None;
    }

    Some(token.to_string())
}
