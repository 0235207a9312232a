pub mod sea_orm_active_enums;

pub mod user;
pub mod donation;
pub mod claim;
pub mod ephemeral_secret;
pub mod system_flag;

pub use sea_orm_active_enums::{DonationStatus, Role, SecretPurpose};

pub use user::Entity as User;
pub use donation::Entity as Donation;
pub use claim::Entity as Claim;
pub use ephemeral_secret::Entity as EphemeralSecret;
pub use system_flag::Entity as SystemFlag;
