use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sea_orm_active_enums::Role;

/// Registered account.
///
/// Accounts created through federated login carry no local password; their
/// `password_hash` and `salt` stay `None`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub email: String,

    pub name: String,

    pub role: Role,

    pub location: Option<String>,

    #[serde(skip_serializing)]
    pub password_hash: Option<Vec<u8>>,
    #[serde(skip_serializing)]
    pub salt: Option<Vec<u8>>,
    pub password_iterations: i32,

    pub active: bool,

    /// Set by an admin, or at registration for donors and the bootstrap admin.
    pub verified: bool,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
