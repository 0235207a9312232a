pub use sea_orm_migration::prelude::*;

mod m20261018_000001_users;
mod m20261018_000002_donations_and_claims;
mod m20261018_000003_ephemeral_secrets;
mod m20261018_000004_system_flags;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261018_000001_users::Migration),
            Box::new(m20261018_000002_donations_and_claims::Migration),
            Box::new(m20261018_000003_ephemeral_secrets::Migration),
            Box::new(m20261018_000004_system_flags::Migration),
        ]
    }
}
