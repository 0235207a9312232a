//! Error taxonomy.
//!
//! Every domain outcome is a value the caller matches on. Only
//! [`Error::DependencyUnavailable`] is worth retrying as-is.

use entity::Role;
use sea_orm::{DbErr, SqlErr};

use crate::policy::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    #[error("email or password is incorrect")]
    InvalidCredentials,
    #[error("account is disabled")]
    InactiveAccount,
    #[error("account is not yet verified by an admin")]
    UnverifiedAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("session token expired")]
    Expired,
    #[error("session token invalid")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("no matching code")]
    NotFound,
    #[error("code expired")]
    Expired,
    #[error("code already used")]
    AlreadyConsumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("donation or claim not found")]
    NotFound,
    /// Someone else got there first. Expected under contention.
    #[error("donation is no longer available")]
    NotAvailable,
    #[error("not authorized to change this claim")]
    Forbidden,
    #[error("status transition not allowed")]
    InvalidTransition,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("email already registered")]
    EmailTaken,
    #[error("account not found")]
    NotFound,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("signing key must be at least {min} bytes (got {len})")]
    SigningKeyTooShort { len: usize, min: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error("role {role:?} lacks capability {capability:?}")]
    Forbidden { role: Role, capability: Capability },

    /// Store or collaborator failure. Safe to retry the whole operation.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for both the capability gate and the claim-ownership check.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden { .. } | Error::Claim(ClaimError::Forbidden))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DependencyUnavailable(_))
    }
}

impl From<DbErr> for Error {
    fn from(e: DbErr) -> Self {
        Error::DependencyUnavailable(e.to_string())
    }
}

pub(crate) fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
