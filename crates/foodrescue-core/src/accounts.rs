//! Identity store operations: registration, lookup, admin verification.

use entity::{system_flag, user, Role};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::config::CoreConfig;
use crate::crypto::{self, SALT_LEN};
use crate::error::{is_unique_violation, AccountError, Error, Result};
use crate::policy::{Capability, Principal};
use crate::store::Store;
use crate::util::{new_id, normalize_email, now_ts, random_bytes};
use crate::verifier::VerifiedIdentity;

const BOOTSTRAP_ADMIN_FLAG: &str = "bootstrap_admin";
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub location: Option<String>,
}

/// Fresh credential material for one password.
pub(crate) struct PasswordFields {
    pub hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub iterations: i32,
}

#[derive(Clone)]
pub struct Accounts {
    store: Store,
    password_iterations: u32,
}

impl Accounts {
    pub fn new(store: Store, config: &CoreConfig) -> Self {
        Self {
            store,
            password_iterations: config.password_iterations,
        }
    }

    /// Create an account.
    ///
    /// Donors start verified. NGOs and admins wait for an admin, except the
    /// very first admin, who is verified on the spot so the system cannot be
    /// locked out.
    pub async fn register(&self, new: NewAccount) -> Result<user::Model> {
        let email = normalize_email(&new.email);
        if email.is_empty() || !email.contains('@') {
            return Err(AccountError::InvalidInput("email must be a valid address".to_string()).into());
        }
        let name = new.name.trim().to_string();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(AccountError::InvalidInput(format!(
                "name must be 1 to {MAX_NAME_LEN} characters"
            ))
            .into());
        }
        let fields = self.password_fields(&new.password)?;
        let id = new_id()?;
        let now = now_ts();

        self.store
            .run("register", async {
                let txn = self.store.begin().await?;

                // No read before the first write; a taken email surfaces as a
                // unique violation on insert and rolls back the bootstrap flag too.
                let verified = match new.role {
                    Role::Donor => true,
                    Role::Ngo => false,
                    Role::Admin => claim_bootstrap_admin(&txn, &id, now).await?,
                };

                let model = user::ActiveModel {
                    id: Set(id.clone()),
                    email: Set(email.clone()),
                    name: Set(name.clone()),
                    role: Set(new.role),
                    location: Set(new.location.clone().filter(|l| !l.trim().is_empty())),
                    password_hash: Set(Some(fields.hash.clone())),
                    salt: Set(Some(fields.salt.clone())),
                    password_iterations: Set(fields.iterations),
                    active: Set(true),
                    verified: Set(verified),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(|e| -> Error {
                    if is_unique_violation(&e) {
                        AccountError::EmailTaken.into()
                    } else {
                        e.into()
                    }
                })?;

                txn.commit().await?;

                if model.role == Role::Admin && model.verified {
                    tracing::info!(user_id = %model.id, "bootstrap admin registered and verified");
                }
                tracing::info!(user_id = %model.id, role = ?model.role, verified = model.verified, "account registered");
                Ok(model)
            })
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        let email = normalize_email(email);
        self.store
            .run("find_user_by_email", async {
                Ok(user::Entity::find()
                    .filter(user::Column::Email.eq(&email))
                    .one(self.store.connection())
                    .await?)
            })
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<user::Model>> {
        self.store
            .run("find_user_by_id", async {
                Ok(user::Entity::find_by_id(id.to_string())
                    .one(self.store.connection())
                    .await?)
            })
            .await
    }

    pub async fn list_users(&self, actor: &Principal) -> Result<Vec<user::Model>> {
        actor.require(Capability::VerifyUsers)?;
        self.store
            .run("list_users", async {
                Ok(user::Entity::find()
                    .order_by_asc(user::Column::CreatedAt)
                    .order_by_asc(user::Column::Email)
                    .all(self.store.connection())
                    .await?)
            })
            .await
    }

    /// Mark an account as verified. Idempotent.
    pub async fn verify_user(&self, actor: &Principal, user_id: &str) -> Result<user::Model> {
        actor.require(Capability::VerifyUsers)?;
        let now = now_ts();

        self.store
            .run("verify_user", async {
                let txn = self.store.begin().await?;
                let res = user::Entity::update_many()
                    .col_expr(user::Column::Verified, Expr::value(true))
                    .col_expr(user::Column::UpdatedAt, Expr::value(now))
                    .filter(user::Column::Id.eq(user_id))
                    .exec(&txn)
                    .await?;
                if res.rows_affected == 0 {
                    return Err(AccountError::NotFound.into());
                }
                let Some(model) = user::Entity::find_by_id(user_id.to_string()).one(&txn).await? else {
                    return Err(AccountError::NotFound.into());
                };
                txn.commit().await?;

                tracing::info!(admin_id = %actor.user_id, user_id = %model.id, "account verified");
                Ok(model)
            })
            .await
    }

    /// Look up the local account for a federated identity, creating it on first sight.
    ///
    /// New federated accounts are donors and are verified immediately: the
    /// provider has vouched for the email, and the donor role grants nothing
    /// beyond submitting food.
    pub(crate) async fn find_or_create_federated(&self, verified: &VerifiedIdentity) -> Result<user::Model> {
        let email = normalize_email(&verified.email);
        let name = verified
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Federated User")
            .chars()
            .take(MAX_NAME_LEN)
            .collect::<String>();
        let id = new_id()?;
        let now = now_ts();

        self.store
            .run("find_or_create_federated", async {
                let db = self.store.connection();
                if let Some(existing) = user::Entity::find()
                    .filter(user::Column::Email.eq(&email))
                    .one(db)
                    .await?
                {
                    return Ok(existing);
                }

                let inserted = user::ActiveModel {
                    id: Set(id.clone()),
                    email: Set(email.clone()),
                    name: Set(name.clone()),
                    role: Set(Role::Donor),
                    location: Set(None),
                    password_hash: Set(None),
                    salt: Set(None),
                    password_iterations: Set(0),
                    active: Set(true),
                    verified: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(db)
                .await;

                match inserted {
                    Ok(model) => {
                        tracing::info!(user_id = %model.id, "federated account created");
                        Ok(model)
                    }
                    // A concurrent login created it first.
                    Err(e) if is_unique_violation(&e) => user::Entity::find()
                        .filter(user::Column::Email.eq(&email))
                        .one(db)
                        .await?
                        .ok_or_else(|| Error::Internal("federated account vanished after insert race".to_string())),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    pub(crate) fn password_iterations(&self) -> u32 {
        self.password_iterations
    }

    pub(crate) fn password_fields(&self, password: &str) -> Result<PasswordFields> {
        if password.is_empty() {
            return Err(AccountError::InvalidInput("password cannot be blank".to_string()).into());
        }
        let iterations = i32::try_from(self.password_iterations).unwrap_or(i32::MAX);
        let salt = random_bytes(SALT_LEN)?;
        let hash = crypto::hash_password(password.as_bytes(), &salt, iterations as u32);
        Ok(PasswordFields {
            hash,
            salt,
            iterations,
        })
    }
}

/// Claim the one-time bootstrap flag. Exactly one transaction can ever win it.
async fn claim_bootstrap_admin<C: ConnectionTrait>(db: &C, user_id: &str, now: i64) -> Result<bool> {
    let inserted = system_flag::Entity::insert(system_flag::ActiveModel {
        name: Set(BOOTSTRAP_ADMIN_FLAG.to_string()),
        value: Set(user_id.to_string()),
        created_at: Set(now),
    })
    .on_conflict(
        OnConflict::column(system_flag::Column::Name)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(db)
    .await?;

    Ok(inserted == 1)
}
