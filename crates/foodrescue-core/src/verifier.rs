//! Seam for federated login: an external provider vouches for an email.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifierError {
    #[error("assertion rejected: {0}")]
    Invalid(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<VerifiedIdentity, VerifierError>;
}

/// Verifier for deployments without a provider: rejects every assertion.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledVerifier;

#[async_trait]
impl IdentityVerifier for DisabledVerifier {
    async fn verify(&self, _assertion: &str) -> Result<VerifiedIdentity, VerifierError> {
        Err(VerifierError::Invalid("federated login is not configured".to_string()))
    }
}
