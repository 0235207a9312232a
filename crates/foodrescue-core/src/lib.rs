//! Core of the food rescue backend: session issuance, single-use secrets
//! and exclusive donation claiming.
//!
//! Components are built from an explicit [`CoreConfig`] and a shared
//! [`Store`]; nothing here is global. [`Services`] wires them together.

pub mod accounts;
pub mod claims;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod notifier;
pub mod policy;
pub mod store;
pub mod token;
pub mod util;
pub mod verifier;

use std::sync::Arc;

pub use accounts::{Accounts, NewAccount};
pub use claims::{Analytics, ClaimCoordinator, DonationView, LocationCount, NewDonation};
pub use config::CoreConfig;
pub use error::{
    AccountError, AuthenticationError, ClaimError, ConfigError, Error, Result, SecretError,
    TokenError,
};
pub use gate::{AuthorizationGate, Credentials, Session};
pub use ledger::{EphemeralSecretLedger, IssuedSecret};
pub use notifier::{Delivery, LogNotifier, Notifier, OutboundMessage};
pub use policy::{Capability, Principal};
pub use store::Store;
pub use token::{IssuedToken, SessionClaims, TokenIssuer};
pub use verifier::{DisabledVerifier, IdentityVerifier, VerifiedIdentity};

pub use entity::{DonationStatus, Role, SecretPurpose};

/// All core components over one store.
#[derive(Clone)]
pub struct Services {
    pub store: Store,
    pub accounts: Accounts,
    pub tokens: TokenIssuer,
    pub ledger: EphemeralSecretLedger,
    pub gate: AuthorizationGate,
    pub claims: ClaimCoordinator,
}

impl Services {
    /// Connect, apply migrations, and build every component.
    pub async fn connect(
        config: &CoreConfig,
        notifier: Arc<dyn Notifier>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Result<Self> {
        let store = Store::connect(config).await?;
        store.migrate().await?;
        Ok(Self::from_store(store, config, notifier, verifier))
    }

    pub fn from_store(
        store: Store,
        config: &CoreConfig,
        notifier: Arc<dyn Notifier>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let accounts = Accounts::new(store.clone(), config);
        let tokens = TokenIssuer::from_config(config);
        let ledger = EphemeralSecretLedger::new(store.clone(), accounts.clone(), notifier, config);
        let gate = AuthorizationGate::new(accounts.clone(), ledger.clone(), tokens.clone(), verifier);
        let claims = ClaimCoordinator::new(store.clone());

        Self {
            store,
            accounts,
            tokens,
            ledger,
            gate,
            claims,
        }
    }
}
