use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account role. Authorization is dispatched on this tag through a fixed
/// capability table, never through per-role types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[sea_orm(string_value = "donor")]
    Donor,
    #[sea_orm(string_value = "ngo")]
    Ngo,
    #[sea_orm(string_value = "admin")]
    Admin,
}

/// Lifecycle of a donation and of the claim that mirrors it.
///
/// `Pending` is initial, `Delivered` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "claimed")]
    Claimed,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DonationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DonationStatus::Delivered | DonationStatus::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "kebab-case")]
pub enum SecretPurpose {
    #[sea_orm(string_value = "login-otp")]
    LoginOtp,
    #[sea_orm(string_value = "password-reset")]
    PasswordReset,
}
