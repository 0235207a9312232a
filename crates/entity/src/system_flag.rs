use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Write-once system markers.
///
/// The primary key makes each flag claimable by exactly one transaction, which
/// is how one-time decisions such as the bootstrap admin are made race-free.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "system_flags")]
pub struct Model {
    /// Flag name (e.g., "bootstrap_admin").
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,

    pub value: String,

    /// Unix timestamp (seconds).
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
