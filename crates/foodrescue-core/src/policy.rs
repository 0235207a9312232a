//! Role capability table.

use entity::{user, Role};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    SubmitDonation,
    ViewOwnHistory,
    ViewAvailable,
    ClaimDonation,
    UpdateOwnClaims,
    VerifyUsers,
    ViewAnalytics,
}

impl Capability {
    pub fn granted_to(self, role: Role) -> bool {
        use Capability::*;
        matches!(
            (role, self),
            (Role::Donor, SubmitDonation | ViewOwnHistory)
                | (Role::Ngo, ViewAvailable | ClaimDonation | UpdateOwnClaims)
                | (Role::Admin, VerifyUsers | ViewAnalytics)
        )
    }
}

/// The authenticated caller, as resolved from a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn require(&self, capability: Capability) -> Result<()> {
        if capability.granted_to(self.role) {
            return Ok(());
        }
        tracing::debug!(user_id = %self.user_id, role = ?self.role, ?capability, "capability denied");
        Err(Error::Forbidden {
            role: self.role,
            capability,
        })
    }
}

impl From<&user::Model> for Principal {
    fn from(u: &user::Model) -> Self {
        Self {
            user_id: u.id.clone(),
            email: u.email.clone(),
            role: u.role,
        }
    }
}
