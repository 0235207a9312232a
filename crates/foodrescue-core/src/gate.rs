//! Authentication entry points and token resolution.

use std::sync::Arc;

use entity::user;

use crate::accounts::Accounts;
use crate::crypto;
use crate::error::{AuthenticationError, Error, Result, TokenError};
use crate::ledger::EphemeralSecretLedger;
use crate::policy::Principal;
use crate::token::TokenIssuer;
use crate::util::now_ts;
use crate::verifier::{IdentityVerifier, VerifierError};

#[derive(Clone)]
pub enum Credentials {
    Password { email: String, password: String },
    /// Identity assertion issued by an external provider.
    Federated { assertion: String },
    Otp { email: String, code: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password { email, .. } => f.debug_struct("Password").field("email", email).finish_non_exhaustive(),
            Credentials::Federated { .. } => f.debug_struct("Federated").finish_non_exhaustive(),
            Credentials::Otp { email, .. } => f.debug_struct("Otp").field("email", email).finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub expires_at: i64,
    pub user: user::Model,
}

#[derive(Clone)]
pub struct AuthorizationGate {
    accounts: Accounts,
    ledger: EphemeralSecretLedger,
    tokens: TokenIssuer,
    verifier: Arc<dyn IdentityVerifier>,
}

impl AuthorizationGate {
    pub fn new(
        accounts: Accounts,
        ledger: EphemeralSecretLedger,
        tokens: TokenIssuer,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            tokens,
            verifier,
        }
    }

    pub async fn authenticate(&self, credentials: Credentials) -> Result<Session> {
        self.authenticate_at(credentials, now_ts()).await
    }

    /// Check credentials through one of three paths and mint a session token.
    ///
    /// All paths end with the same account-state check.
    pub async fn authenticate_at(&self, credentials: Credentials, now: i64) -> Result<Session> {
        let method = match &credentials {
            Credentials::Password { .. } => "password",
            Credentials::Federated { .. } => "federated",
            Credentials::Otp { .. } => "otp",
        };

        let account = match credentials {
            Credentials::Password { email, password } => self.check_password(&email, &password).await?,
            Credentials::Federated { assertion } => self.check_federated(&assertion).await?,
            Credentials::Otp { email, code } => self.ledger.consume_otp(&email, &code, now).await?,
        };

        if let Err(e) = ensure_may_sign_in(&account) {
            tracing::info!(user_id = %account.id, method, reason = %e, "sign-in refused");
            return Err(e.into());
        }

        let issued = self.tokens.issue_at(&account.id, now)?;
        tracing::info!(user_id = %account.id, method, "session issued");
        Ok(Session {
            token: issued.token,
            expires_at: issued.expires_at,
            user: account,
        })
    }

    pub async fn resolve(&self, token: &str) -> Result<Principal> {
        self.resolve_at(token, now_ts()).await
    }

    /// Turn a presented session token into the caller's identity and role.
    ///
    /// Accounts disabled or unverified after the token was issued are refused.
    pub async fn resolve_at(&self, token: &str, now: i64) -> Result<Principal> {
        let claims = self.tokens.verify_at(token, now)?;
        let Some(account) = self.accounts.find_by_id(&claims.sub).await? else {
            return Err(TokenError::Invalid.into());
        };
        ensure_may_sign_in(&account)?;
        Ok(Principal::from(&account))
    }

    async fn check_password(&self, email: &str, password: &str) -> Result<user::Model> {
        // Unknown emails and password-less accounts cost the same PBKDF2 work as a miss.
        let Some(account) = self.accounts.find_by_email(email).await? else {
            crypto::verify_against_dummy(password.as_bytes(), self.accounts.password_iterations());
            return Err(AuthenticationError::InvalidCredentials.into());
        };
        let (Some(hash), Some(salt)) = (account.password_hash.as_ref(), account.salt.as_ref()) else {
            crypto::verify_against_dummy(password.as_bytes(), self.accounts.password_iterations());
            return Err(AuthenticationError::InvalidCredentials.into());
        };
        let iterations = u32::try_from(account.password_iterations).unwrap_or(0);
        if !crypto::verify_password_hash(password.as_bytes(), salt, hash, iterations) {
            return Err(AuthenticationError::InvalidCredentials.into());
        }
        Ok(account)
    }

    async fn check_federated(&self, assertion: &str) -> Result<user::Model> {
        let verified = match self.verifier.verify(assertion).await {
            Ok(v) => v,
            Err(VerifierError::Invalid(reason)) => {
                tracing::info!(%reason, "federated assertion rejected");
                return Err(AuthenticationError::InvalidCredentials.into());
            }
            Err(VerifierError::Unavailable(reason)) => {
                return Err(Error::DependencyUnavailable(reason));
            }
        };
        if !verified.email.contains('@') {
            return Err(AuthenticationError::InvalidCredentials.into());
        }
        self.accounts.find_or_create_federated(&verified).await
    }
}

fn ensure_may_sign_in(account: &user::Model) -> Result<(), AuthenticationError> {
    if !account.active {
        return Err(AuthenticationError::InactiveAccount);
    }
    if !account.verified {
        return Err(AuthenticationError::UnverifiedAccount);
    }
    Ok(())
}
