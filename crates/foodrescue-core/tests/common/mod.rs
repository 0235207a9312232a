#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use entity::user;
use foodrescue_core::notifier::NotifyError;
use foodrescue_core::verifier::VerifierError;
use foodrescue_core::{
    CoreConfig, IdentityVerifier, NewAccount, NewDonation, Notifier, OutboundMessage, Principal,
    Role, Services, VerifiedIdentity,
};

pub const SIGNING_KEY: &[u8] = b"test-signing-key-test-signing-key!!";
pub const PASSWORD: &str = "correct horse battery staple";

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("smtp down".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Accepts assertions registered up front; `"provider-down"` simulates an outage.
#[derive(Default)]
pub struct StaticVerifier {
    pub known: HashMap<String, VerifiedIdentity>,
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, assertion: &str) -> Result<VerifiedIdentity, VerifierError> {
        if assertion == "provider-down" {
            return Err(VerifierError::Unavailable("provider timeout".to_string()));
        }
        self.known
            .get(assertion)
            .cloned()
            .ok_or_else(|| VerifierError::Invalid("unknown assertion".to_string()))
    }
}

pub struct Harness {
    pub services: Services,
    pub notifier: Arc<RecordingNotifier>,
    pub config: CoreConfig,
    /// Keeps a file-backed database alive for the test's duration.
    _dir: Option<TempDir>,
}

fn known_identities() -> StaticVerifier {
    let mut verifier = StaticVerifier::default();
    verifier.known.insert(
        "google:bob".to_string(),
        VerifiedIdentity {
            email: "Bob@Example.com".to_string(),
            display_name: Some("Bob".to_string()),
        },
    );
    verifier.known.insert(
        "google:no-email".to_string(),
        VerifiedIdentity {
            email: String::new(),
            display_name: None,
        },
    );
    verifier
}

fn test_config(database_url: &str) -> CoreConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mut config = CoreConfig::new(database_url, SIGNING_KEY.to_vec()).unwrap();
    // Keep PBKDF2 cheap in tests.
    config.password_iterations = 1_000;
    config.store_timeout = Duration::from_secs(10);
    config
}

async fn build(config: CoreConfig, verifier: StaticVerifier, dir: Option<TempDir>) -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let services = Services::connect(&config, notifier.clone(), Arc::new(verifier))
        .await
        .unwrap();

    Harness {
        services,
        notifier,
        config,
        _dir: dir,
    }
}

pub async fn harness() -> Harness {
    harness_with(known_identities()).await
}

pub async fn harness_with(verifier: StaticVerifier) -> Harness {
    build(test_config("sqlite::memory:"), verifier, None).await
}

/// File-backed store with a real connection pool, so concurrent calls
/// overlap inside the database instead of queueing for one connection.
pub async fn pooled_harness(max_connections: u32) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("foodrescue.db").display());
    let mut config = test_config(&url);
    config.max_connections = max_connections;
    build(config, known_identities(), Some(dir)).await
}

impl Harness {
    pub async fn register(&self, email: &str, role: Role) -> user::Model {
        self.services
            .accounts
            .register(NewAccount {
                email: email.to_string(),
                name: email.split('@').next().unwrap_or("user").to_string(),
                password: PASSWORD.to_string(),
                role,
                location: Some("Whitefield, Bangalore".to_string()),
            })
            .await
            .unwrap()
    }

    pub async fn donor(&self, email: &str) -> Principal {
        Principal::from(&self.register(email, Role::Donor).await)
    }

    pub async fn ngo(&self, email: &str) -> Principal {
        Principal::from(&self.register(email, Role::Ngo).await)
    }

    pub async fn donation(&self, donor: &Principal, name: &str, location: &str, pickup_time: i64) -> String {
        self.services
            .claims
            .submit_donation(
                donor,
                NewDonation {
                    name: name.to_string(),
                    description: Some("fresh today".to_string()),
                    quantity: "20 packets".to_string(),
                    location: location.to_string(),
                    pickup_time,
                    image_url: None,
                },
            )
            .await
            .unwrap()
            .id
    }
}
