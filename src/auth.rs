//! Authentication collaborators: pluggable token verification and secret
//! retrieval. Neither has a production implementation bundled — both are
//! external dependencies a deployment wires in (an identity provider, a
//! secrets manager) — so the dispatcher and REST surface depend only on
//! these traits.

use crate::error::{AppError, ErrorCode};
use crate::types::TokenInfo;

#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenInfo, AppError>;
}

#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, key: &str) -> Result<String, AppError>;
}

/// No-auth verifier: every token is rejected. Used when a deployment has no
/// identity provider wired in yet — callers simply can't pass an
/// `auth_token` and get group-scoped behavior.
pub struct NoopTokenVerifier;

#[async_trait::async_trait]
impl TokenVerifier for NoopTokenVerifier {
    async fn verify(&self, _token: &str) -> Result<TokenInfo, AppError> {
        Err(AppError::new(ErrorCode::AuthError, "no token verifier configured for this deployment"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_verifier_always_rejects() {
        let verifier = NoopTokenVerifier;
        let err = verifier.verify("anything").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthError);
    }
}
