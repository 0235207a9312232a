//! Single-use, time-bounded secrets: login OTPs and password-reset tokens.
//!
//! Invariants, all enforced inside one store transaction per call:
//! - at most one live (unconsumed, unexpired) secret per `(user, purpose)`;
//!   issuing a new one consumes every earlier one;
//! - a secret flips to consumed at most once, through a conditional update
//!   whose affected-row count is checked;
//! - rows are never edited otherwise and only [`EphemeralSecretLedger::prune_at`]
//!   deletes them, long after expiry.

use std::sync::Arc;
use std::time::Duration;

use entity::{ephemeral_secret, user, SecretPurpose};
use sea_orm::sea_query::{Expr, Query, SelectStatement};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::accounts::Accounts;
use crate::config::CoreConfig;
use crate::error::{AccountError, Error, Result, SecretError};
use crate::notifier::{deliver, otp_message, reset_message, Delivery, Notifier};
use crate::store::Store;
use crate::util::{
    generate_otp_code, generate_reset_token, new_id, normalize_email, now_ts, sha256_hex, ts_to_rfc3339,
};

/// A freshly issued secret. `value` exists only here and in the outbound message.
#[derive(Debug, Clone)]
pub struct IssuedSecret {
    pub user_id: String,
    pub purpose: SecretPurpose,
    pub value: String,
    pub expires_at: i64,
    pub delivery: Delivery,
}

#[derive(Clone)]
pub struct EphemeralSecretLedger {
    store: Store,
    accounts: Accounts,
    notifier: Arc<dyn Notifier>,
    otp_ttl_secs: i64,
    reset_ttl_secs: i64,
    notify_timeout: Duration,
}

impl EphemeralSecretLedger {
    pub fn new(store: Store, accounts: Accounts, notifier: Arc<dyn Notifier>, config: &CoreConfig) -> Self {
        Self {
            store,
            accounts,
            notifier,
            otp_ttl_secs: secs_i64(config.otp_ttl),
            reset_ttl_secs: secs_i64(config.reset_ttl),
            notify_timeout: config.notify_timeout,
        }
    }

    pub fn ttl_secs(&self, purpose: SecretPurpose) -> i64 {
        match purpose {
            SecretPurpose::LoginOtp => self.otp_ttl_secs,
            SecretPurpose::PasswordReset => self.reset_ttl_secs,
        }
    }

    pub async fn request_login_otp(&self, email: &str) -> Result<IssuedSecret> {
        self.issue(email, SecretPurpose::LoginOtp, now_ts()).await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<IssuedSecret> {
        self.issue(email, SecretPurpose::PasswordReset, now_ts()).await
    }

    /// Issue a new secret for `(email, purpose)`, consuming any earlier one, then
    /// notify the user best-effort.
    ///
    /// Unknown emails fail with [`AccountError::NotFound`]; callers facing the
    /// public should answer identically either way.
    pub async fn issue(&self, email: &str, purpose: SecretPurpose, now: i64) -> Result<IssuedSecret> {
        let email = normalize_email(email);
        let value = match purpose {
            SecretPurpose::LoginOtp => generate_otp_code()?,
            SecretPurpose::PasswordReset => generate_reset_token()?,
        };
        let digest = sha256_hex(&value);
        let id = new_id()?;
        let ttl = self.ttl_secs(purpose);
        let expires_at = now.saturating_add(ttl);

        let holder = self
            .store
            .run("issue_secret", async {
                let txn = self.store.begin().await?;

                // Write first: the transaction takes the write lock before it reads.
                let invalidated = ephemeral_secret::Entity::update_many()
                    .col_expr(ephemeral_secret::Column::Consumed, Expr::value(true))
                    .col_expr(ephemeral_secret::Column::ConsumedAt, Expr::value(now))
                    .filter(ephemeral_secret::Column::UserId.in_subquery(user_id_by_email(&email)))
                    .filter(ephemeral_secret::Column::Purpose.eq(purpose))
                    .filter(ephemeral_secret::Column::Consumed.eq(false))
                    .exec(&txn)
                    .await?
                    .rows_affected;

                let Some(holder) = user::Entity::find()
                    .filter(user::Column::Email.eq(&email))
                    .one(&txn)
                    .await?
                else {
                    return Err(AccountError::NotFound.into());
                };

                ephemeral_secret::ActiveModel {
                    id: Set(id.clone()),
                    user_id: Set(holder.id.clone()),
                    purpose: Set(purpose),
                    secret_digest: Set(digest.clone()),
                    created_at: Set(now),
                    expires_at: Set(expires_at),
                    consumed: Set(false),
                    consumed_at: Set(None),
                }
                .insert(&txn)
                .await?;

                txn.commit().await?;

                tracing::info!(user_id = %holder.id, ?purpose, invalidated, expires_at = %ts_to_rfc3339(expires_at), "secret issued");
                Ok(holder)
            })
            .await?;

        let ttl_minutes = ttl / 60;
        let message = match purpose {
            SecretPurpose::LoginOtp => otp_message(&holder.email, Some(&holder.name), &value, ttl_minutes),
            SecretPurpose::PasswordReset => {
                reset_message(&holder.email, Some(&holder.name), &value, ttl_minutes)
            }
        };
        let delivery = deliver(self.notifier.as_ref(), message, self.notify_timeout).await;

        Ok(IssuedSecret {
            user_id: holder.id,
            purpose,
            value,
            expires_at,
            delivery,
        })
    }

    /// Redeem a login OTP. Returns the account it belongs to.
    pub async fn consume_otp(&self, email: &str, code: &str, now: i64) -> Result<user::Model> {
        let email = normalize_email(email);
        let digest = sha256_hex(code.trim());

        self.store
            .run("consume_otp", async {
                let txn = self.store.begin().await?;

                let redeemed = ephemeral_secret::Entity::update_many()
                    .col_expr(ephemeral_secret::Column::Consumed, Expr::value(true))
                    .col_expr(ephemeral_secret::Column::ConsumedAt, Expr::value(now))
                    .filter(ephemeral_secret::Column::UserId.in_subquery(user_id_by_email(&email)))
                    .filter(ephemeral_secret::Column::Purpose.eq(SecretPurpose::LoginOtp))
                    .filter(ephemeral_secret::Column::SecretDigest.eq(&digest))
                    .filter(ephemeral_secret::Column::Consumed.eq(false))
                    .filter(ephemeral_secret::Column::ExpiresAt.gt(now))
                    .exec(&txn)
                    .await?
                    .rows_affected;

                let Some(holder) = user::Entity::find()
                    .filter(user::Column::Email.eq(&email))
                    .one(&txn)
                    .await?
                else {
                    return Err(SecretError::NotFound.into());
                };

                if redeemed == 0 {
                    let latest = ephemeral_secret::Entity::find()
                        .filter(ephemeral_secret::Column::UserId.eq(&holder.id))
                        .filter(ephemeral_secret::Column::Purpose.eq(SecretPurpose::LoginOtp))
                        .filter(ephemeral_secret::Column::SecretDigest.eq(&digest))
                        // Prefer a live row if a six-digit value ever repeats.
                        .order_by_asc(ephemeral_secret::Column::Consumed)
                        .order_by_desc(ephemeral_secret::Column::CreatedAt)
                        .one(&txn)
                        .await?;
                    let err = classify_miss(latest.as_ref(), now);
                    tracing::debug!(user_id = %holder.id, reason = %err, "otp redemption refused");
                    return Err(err.into());
                }

                txn.commit().await?;

                tracing::info!(user_id = %holder.id, "otp redeemed");
                Ok(holder)
            })
            .await
    }

    /// Redeem a password-reset token and install `new_password`.
    ///
    /// Consuming the token and replacing the credential commit together or not
    /// at all.
    pub async fn confirm_password_reset(&self, token: &str, new_password: &str, now: i64) -> Result<user::Model> {
        let fields = self.accounts.password_fields(new_password)?;
        let digest = sha256_hex(token.trim());

        self.store
            .run("confirm_password_reset", async {
                let txn = self.store.begin().await?;

                let redeemed = ephemeral_secret::Entity::update_many()
                    .col_expr(ephemeral_secret::Column::Consumed, Expr::value(true))
                    .col_expr(ephemeral_secret::Column::ConsumedAt, Expr::value(now))
                    .filter(ephemeral_secret::Column::Purpose.eq(SecretPurpose::PasswordReset))
                    .filter(ephemeral_secret::Column::SecretDigest.eq(&digest))
                    .filter(ephemeral_secret::Column::Consumed.eq(false))
                    .filter(ephemeral_secret::Column::ExpiresAt.gt(now))
                    .exec(&txn)
                    .await?
                    .rows_affected;

                if redeemed == 0 {
                    let latest = ephemeral_secret::Entity::find()
                        .filter(ephemeral_secret::Column::Purpose.eq(SecretPurpose::PasswordReset))
                        .filter(ephemeral_secret::Column::SecretDigest.eq(&digest))
                        .order_by_asc(ephemeral_secret::Column::Consumed)
                        .order_by_desc(ephemeral_secret::Column::CreatedAt)
                        .one(&txn)
                        .await?;
                    return Err(classify_miss(latest.as_ref(), now).into());
                }

                let Some(secret) = ephemeral_secret::Entity::find()
                    .filter(ephemeral_secret::Column::Purpose.eq(SecretPurpose::PasswordReset))
                    .filter(ephemeral_secret::Column::SecretDigest.eq(&digest))
                    .filter(ephemeral_secret::Column::ConsumedAt.eq(now))
                    .order_by_desc(ephemeral_secret::Column::CreatedAt)
                    .one(&txn)
                    .await?
                else {
                    return Err(Error::Internal("redeemed reset token vanished".to_string()));
                };

                let res = user::Entity::update_many()
                    .col_expr(user::Column::PasswordHash, Expr::value(fields.hash.clone()))
                    .col_expr(user::Column::Salt, Expr::value(fields.salt.clone()))
                    .col_expr(user::Column::PasswordIterations, Expr::value(fields.iterations))
                    .col_expr(user::Column::UpdatedAt, Expr::value(now))
                    .filter(user::Column::Id.eq(&secret.user_id))
                    .exec(&txn)
                    .await?;
                if res.rows_affected != 1 {
                    return Err(AccountError::NotFound.into());
                }

                let Some(holder) = user::Entity::find_by_id(secret.user_id.clone()).one(&txn).await? else {
                    return Err(AccountError::NotFound.into());
                };

                txn.commit().await?;

                tracing::info!(user_id = %holder.id, "password reset completed");
                Ok(holder)
            })
            .await
    }

    /// Delete secrets that expired more than `retain` ago. Live secrets are never touched.
    pub async fn prune_at(&self, retain: Duration, now: i64) -> Result<u64> {
        let cutoff = now.saturating_sub(secs_i64(retain));
        self.store
            .run("prune_secrets", async {
                let res = ephemeral_secret::Entity::delete_many()
                    .filter(ephemeral_secret::Column::ExpiresAt.lt(cutoff))
                    .exec(self.store.connection())
                    .await?;
                if res.rows_affected > 0 {
                    tracing::debug!(pruned = res.rows_affected, cutoff, "pruned old secrets");
                }
                Ok(res.rows_affected)
            })
            .await
    }
}

fn secs_i64(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

fn user_id_by_email(email: &str) -> SelectStatement {
    Query::select()
        .column(user::Column::Id)
        .from(user::Entity)
        .and_where(user::Column::Email.eq(email))
        .to_owned()
}

/// Explain why a conditional redemption matched nothing.
///
/// Expired rows are never flipped, so they stay unconsumed.
fn classify_miss(latest: Option<&ephemeral_secret::Model>, now: i64) -> SecretError {
    match latest {
        None => SecretError::NotFound,
        Some(secret) if secret.consumed => SecretError::AlreadyConsumed,
        Some(secret) if now >= secret.expires_at => SecretError::Expired,
        // Live but unmatched only if another writer got there first.
        Some(_) => SecretError::AlreadyConsumed,
    }
}
