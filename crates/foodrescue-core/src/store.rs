use std::future::Future;
use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, TransactionTrait};

use crate::config::CoreConfig;
use crate::error::{Error, Result};

/// Handle to the transactional store.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
    timeout: Duration,
}

impl Store {
    pub async fn connect(config: &CoreConfig) -> Result<Self> {
        let url = config.database_url.clone();
        let in_memory = url.contains(":memory:");

        let mut options = ConnectOptions::new(url);
        options.max_connections(config.max_connections.max(1));
        options.connect_timeout(Duration::from_secs(5));
        options.acquire_timeout(config.store_timeout);
        options.sqlx_logging(false);
        if in_memory {
            // An in-memory database lives and dies with its connection.
            options.min_connections(1);
        } else {
            options.min_connections(0);
            options.idle_timeout(Duration::from_secs(30));
        }

        let db = Database::connect(options).await?;
        tracing::debug!(max_connections = config.max_connections, "store connected");
        Ok(Self::from_connection(db, config.store_timeout))
    }

    pub fn from_connection(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    pub async fn migrate(&self) -> Result<()> {
        Migrator::up(&self.db, None).await?;
        Ok(())
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        Ok(self.db.begin().await?)
    }

    /// Run one store operation under the configured timeout.
    ///
    /// On timeout the future is dropped, which rolls back any open
    /// transaction, and the caller sees [`Error::DependencyUnavailable`].
    pub async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store operation timed out");
                Err(Error::DependencyUnavailable(format!("{op} timed out")))
            }
        }
    }
}
