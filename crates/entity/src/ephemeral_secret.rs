use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sea_orm_active_enums::SecretPurpose;

/// Single-use, time-bounded secret (login OTP or password-reset token).
///
/// Rows are append-only: `consumed` flips from `false` to `true` at most once
/// and nothing else is ever updated. Only the SHA-256 digest of the value is
/// stored.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ephemeral_secrets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub user_id: String,

    pub purpose: SecretPurpose,

    /// Hex SHA-256 of the secret value.
    #[serde(skip_serializing)]
    pub secret_digest: String,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub expires_at: i64,

    pub consumed: bool,

    /// Unix timestamp (seconds). `None` while unconsumed.
    pub consumed_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
