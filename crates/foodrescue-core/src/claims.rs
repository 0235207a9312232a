//! Donation lifecycle and exclusive claiming.
//!
//! `Pending -> Claimed -> {Delivered, Cancelled}`. A donation leaves
//! `Pending` exactly when its single claim row is created, in the same
//! transaction. Concurrent claims race on a conditional status update;
//! the loser sees [`ClaimError::NotAvailable`].

use entity::{claim, donation, DonationStatus, Role};
use sea_orm::sea_query::{Expr, Order};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Serialize;

use crate::error::{is_unique_violation, AccountError, ClaimError, Error, Result};
use crate::policy::{Capability, Principal};
use crate::store::Store;
use crate::util::{new_id, now_ts};

const MAX_FIELD_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub name: String,
    pub description: Option<String>,
    pub quantity: String,
    pub location: String,
    /// Unix timestamp (seconds).
    pub pickup_time: i64,
    pub image_url: Option<String>,
}

/// A donation together with its claim, if any.
#[derive(Debug, Clone, Serialize)]
pub struct DonationView {
    pub donation: donation::Model,
    pub claim: Option<claim::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
pub struct LocationCount {
    pub location: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analytics {
    pub total_delivered: u64,
    pub top_locations: Vec<LocationCount>,
}

#[derive(Clone)]
pub struct ClaimCoordinator {
    store: Store,
}

impl ClaimCoordinator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record a new donation. Donations always start `Pending`.
    pub async fn submit_donation(&self, actor: &Principal, new: NewDonation) -> Result<donation::Model> {
        actor.require(Capability::SubmitDonation)?;

        let name = required_field("name", &new.name)?;
        let quantity = required_field("quantity", &new.quantity)?;
        let location = required_field("location", &new.location)?;
        let description = optional_field(new.description.as_deref());
        let image_url = optional_field(new.image_url.as_deref());
        let id = new_id()?;
        let now = now_ts();

        self.store
            .run("submit_donation", async {
                let model = donation::ActiveModel {
                    id: Set(id.clone()),
                    donor_id: Set(actor.user_id.clone()),
                    name: Set(name.clone()),
                    description: Set(description.clone()),
                    quantity: Set(quantity.clone()),
                    location: Set(location.clone()),
                    image_url: Set(image_url.clone()),
                    pickup_time: Set(new.pickup_time),
                    status: Set(DonationStatus::Pending),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.store.connection())
                .await?;

                tracing::info!(donation_id = %model.id, donor_id = %actor.user_id, "donation submitted");
                Ok(model)
            })
            .await
    }

    /// The donor's own donations, newest first.
    pub async fn donor_history(&self, actor: &Principal) -> Result<Vec<donation::Model>> {
        actor.require(Capability::ViewOwnHistory)?;
        self.store
            .run("donor_history", async {
                Ok(donation::Entity::find()
                    .filter(donation::Column::DonorId.eq(&actor.user_id))
                    .order_by_desc(donation::Column::CreatedAt)
                    .order_by_desc(donation::Column::Id)
                    .all(self.store.connection())
                    .await?)
            })
            .await
    }

    /// Pending donations, soonest pickup first.
    pub async fn available(&self, actor: &Principal) -> Result<Vec<donation::Model>> {
        actor.require(Capability::ViewAvailable)?;
        self.store
            .run("available_donations", async {
                Ok(donation::Entity::find()
                    .filter(donation::Column::Status.eq(DonationStatus::Pending))
                    .order_by_asc(donation::Column::PickupTime)
                    .order_by_asc(donation::Column::Id)
                    .all(self.store.connection())
                    .await?)
            })
            .await
    }

    pub async fn claim(&self, actor: &Principal, donation_id: &str) -> Result<claim::Model> {
        self.claim_at(actor, donation_id, now_ts()).await
    }

    /// Claim a pending donation for the calling NGO.
    ///
    /// Retrying after a failure is safe: availability is re-evaluated from
    /// scratch, nothing is blindly re-applied.
    pub async fn claim_at(&self, actor: &Principal, donation_id: &str, now: i64) -> Result<claim::Model> {
        actor.require(Capability::ClaimDonation)?;
        let claim_id = new_id()?;

        self.store
            .run("claim_donation", async {
                let txn = self.store.begin().await?;

                // The conditional update is the first statement so the transaction
                // starts as a writer; only one can match `Pending`.
                let flipped = donation::Entity::update_many()
                    .col_expr(donation::Column::Status, Expr::value(DonationStatus::Claimed))
                    .col_expr(donation::Column::UpdatedAt, Expr::value(now))
                    .filter(donation::Column::Id.eq(donation_id))
                    .filter(donation::Column::Status.eq(DonationStatus::Pending))
                    .exec(&txn)
                    .await?;
                if flipped.rows_affected != 1 {
                    let exists = donation::Entity::find_by_id(donation_id.to_string())
                        .one(&txn)
                        .await?
                        .is_some();
                    if !exists {
                        return Err(ClaimError::NotFound.into());
                    }
                    tracing::debug!(donation_id, ngo_id = %actor.user_id, "claim lost at status swap");
                    return Err(ClaimError::NotAvailable.into());
                }

                let created = claim::ActiveModel {
                    id: Set(claim_id.clone()),
                    donation_id: Set(donation_id.to_string()),
                    ngo_id: Set(actor.user_id.clone()),
                    status: Set(DonationStatus::Claimed),
                    claimed_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(|e| -> Error {
                    if is_unique_violation(&e) {
                        ClaimError::NotAvailable.into()
                    } else {
                        e.into()
                    }
                })?;

                txn.commit().await?;

                tracing::info!(donation_id, claim_id = %created.id, ngo_id = %actor.user_id, "donation claimed");
                Ok(created)
            })
            .await
    }

    pub async fn update_status(
        &self,
        actor: &Principal,
        claim_id: &str,
        new_status: DonationStatus,
    ) -> Result<claim::Model> {
        self.update_status_at(actor, claim_id, new_status, now_ts()).await
    }

    /// Move the caller's own claim to `Delivered` or `Cancelled`, and its
    /// donation with it.
    ///
    /// Ownership is checked before the transition, so a non-owner always
    /// gets `Forbidden`.
    pub async fn update_status_at(
        &self,
        actor: &Principal,
        claim_id: &str,
        new_status: DonationStatus,
        now: i64,
    ) -> Result<claim::Model> {
        actor.require(Capability::UpdateOwnClaims)?;

        self.store
            .run("update_claim_status", async {
                let txn = self.store.begin().await?;

                // Owner, current state and target are all in the filter, so a
                // miss is classified afterwards rather than pre-checked.
                let flipped = if is_valid_transition(DonationStatus::Claimed, new_status) {
                    claim::Entity::update_many()
                        .col_expr(claim::Column::Status, Expr::value(new_status))
                        .col_expr(claim::Column::UpdatedAt, Expr::value(now))
                        .filter(claim::Column::Id.eq(claim_id))
                        .filter(claim::Column::NgoId.eq(&actor.user_id))
                        .filter(claim::Column::Status.eq(DonationStatus::Claimed))
                        .exec(&txn)
                        .await?
                        .rows_affected
                        == 1
                } else {
                    false
                };

                let Some(current) = claim::Entity::find_by_id(claim_id.to_string()).one(&txn).await? else {
                    return Err(ClaimError::NotFound.into());
                };
                if current.ngo_id != actor.user_id {
                    return Err(ClaimError::Forbidden.into());
                }
                if !flipped {
                    return Err(ClaimError::InvalidTransition.into());
                }

                let res = donation::Entity::update_many()
                    .col_expr(donation::Column::Status, Expr::value(new_status))
                    .col_expr(donation::Column::UpdatedAt, Expr::value(now))
                    .filter(donation::Column::Id.eq(&current.donation_id))
                    .filter(donation::Column::Status.eq(DonationStatus::Claimed))
                    .exec(&txn)
                    .await?;
                if res.rows_affected != 1 {
                    return Err(Error::Internal(format!(
                        "donation {} out of step with claim {}",
                        current.donation_id, current.id
                    )));
                }

                txn.commit().await?;

                tracing::info!(claim_id, donation_id = %current.donation_id, status = ?new_status, "claim status updated");
                Ok(current)
            })
            .await
    }

    /// The NGO's own claims, newest first.
    pub async fn ngo_history(&self, actor: &Principal) -> Result<Vec<claim::Model>> {
        actor.require(Capability::UpdateOwnClaims)?;
        self.store
            .run("ngo_history", async {
                Ok(claim::Entity::find()
                    .filter(claim::Column::NgoId.eq(&actor.user_id))
                    .order_by_desc(claim::Column::ClaimedAt)
                    .order_by_desc(claim::Column::Id)
                    .all(self.store.connection())
                    .await?)
            })
            .await
    }

    /// Read-only view for the owning donor, the claiming NGO, or an admin.
    pub async fn donation_view(&self, actor: &Principal, donation_id: &str) -> Result<DonationView> {
        self.store
            .run("donation_view", async {
                let db = self.store.connection();
                let Some(found) = donation::Entity::find_by_id(donation_id.to_string()).one(db).await? else {
                    return Err(ClaimError::NotFound.into());
                };
                let claim = claim::Entity::find()
                    .filter(claim::Column::DonationId.eq(donation_id))
                    .one(db)
                    .await?;

                let allowed = actor.role == Role::Admin
                    || found.donor_id == actor.user_id
                    || claim.as_ref().is_some_and(|c| c.ngo_id == actor.user_id);
                if !allowed {
                    return Err(ClaimError::Forbidden.into());
                }

                Ok(DonationView {
                    donation: found,
                    claim,
                })
            })
            .await
    }

    /// Delivered total and the three busiest donation locations.
    pub async fn analytics(&self, actor: &Principal) -> Result<Analytics> {
        actor.require(Capability::ViewAnalytics)?;
        self.store
            .run("analytics", async {
                let db = self.store.connection();
                let total_delivered = donation::Entity::find()
                    .filter(donation::Column::Status.eq(DonationStatus::Delivered))
                    .count(db)
                    .await?;

                let top_locations = donation::Entity::find()
                    .select_only()
                    .column(donation::Column::Location)
                    .column_as(Expr::col(donation::Column::Id).count(), "count")
                    .group_by(donation::Column::Location)
                    .order_by(Expr::col(donation::Column::Id).count(), Order::Desc)
                    .order_by(donation::Column::Location, Order::Asc)
                    .limit(3)
                    .into_model::<LocationCount>()
                    .all(db)
                    .await?;

                Ok(Analytics {
                    total_delivered,
                    top_locations,
                })
            })
            .await
    }
}

fn is_valid_transition(from: DonationStatus, to: DonationStatus) -> bool {
    matches!(
        (from, to),
        (DonationStatus::Claimed, DonationStatus::Delivered)
            | (DonationStatus::Claimed, DonationStatus::Cancelled)
    )
}

fn required_field(field: &str, raw: &str) -> Result<String> {
    let v = raw.trim();
    if v.is_empty() || v.len() > MAX_FIELD_LEN {
        return Err(AccountError::InvalidInput(format!(
            "{field} must be 1 to {MAX_FIELD_LEN} characters"
        ))
        .into());
    }
    Ok(v.to_string())
}

fn optional_field(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
