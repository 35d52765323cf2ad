use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::BTreeSet;

use super::audit_log::insert_audit;
use super::error::{RepoError, RepoResult};
use super::role::{ensure_roles_exist, roles_for_users};
use crate::crypto::constant_time_eq;
use crate::domain::{
    AuditAction, AuditRecord, NewUser, Page, PageRequest, User, UserChanges, UserFilter,
    UserStatus, UserWithRoles,
};
use crate::entities::{user_roles, users};

impl TryFrom<users::Model> for User {
    type Error = RepoError;

    fn try_from(model: users::Model) -> Result<Self, Self::Error> {
        let status = model
            .status
            .parse::<UserStatus>()
            .map_err(RepoError::Database)?;
        let totp_recovery_hashes = decode_hashes(model.totp_recovery_hashes.as_deref())?;

        Ok(Self {
            id: model.id,
            username: model.username,
            email: model.email,
            password_hash: model.password_hash,
            full_name: model.full_name,
            avatar: model.avatar,
            bio: model.bio,
            status,
            totp_secret: model.totp_secret,
            totp_enabled: model.totp_enabled,
            totp_recovery_hashes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

fn decode_hashes(raw: Option<&str>) -> RepoResult<Vec<String>> {
    match raw {
        Some(raw) if !raw.is_empty() => Ok(serde_json::from_str(raw)?),
        _ => Ok(Vec::new()),
    }
}

fn encode_hashes(hashes: &[String]) -> RepoResult<Option<String>> {
    if hashes.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(hashes)?))
    }
}

async fn find_live<C: ConnectionTrait>(conn: &C, id: i64) -> RepoResult<users::Model> {
    users::Entity::find_by_id(id)
        .filter(users::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or(RepoError::NotFound)
}

async fn replace_roles<C: ConnectionTrait>(conn: &C, user_id: i64, role_ids: &[i64]) -> RepoResult<()> {
    ensure_roles_exist(conn, role_ids).await?;

    user_roles::Entity::delete_many()
        .filter(user_roles::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;

    let unique: BTreeSet<i64> = role_ids.iter().copied().collect();
    if !unique.is_empty() {
        user_roles::Entity::insert_many(unique.into_iter().map(|role_id| user_roles::ActiveModel {
            user_id: Set(user_id),
            role_id: Set(role_id),
        }))
        .exec_without_returning(conn)
        .await?;
    }

    Ok(())
}

/// Checks an identifier against every row, deleted ones included, so a
/// soft-deleted account keeps its name reserved.
async fn taken<C: ConnectionTrait>(conn: &C, column: users::Column, value: &str) -> RepoResult<bool> {
    let count = users::Entity::find()
        .filter(column.eq(value))
        .count(conn)
        .await?;
    Ok(count > 0)
}

#[async_trait]
pub trait UserQueryRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> RepoResult<User>;

    /// Looks up a live user by normalized username or email.
    async fn find_by_account(&self, account: &str) -> RepoResult<Option<User>>;

    async fn find_with_roles(&self, id: i64) -> RepoResult<UserWithRoles>;

    async fn list(&self, filter: &UserFilter, page: PageRequest) -> RepoResult<Page<UserWithRoles>>;

    async fn username_taken(&self, username: &str) -> RepoResult<bool>;

    async fn email_taken(&self, email: &str) -> RepoResult<bool>;

    async fn count_by_status(&self) -> RepoResult<Vec<(UserStatus, u64)>>;
}

#[async_trait]
pub trait UserCommandRepository: Send + Sync {
    /// Inserts the user and its role links in one transaction.
    async fn create(&self, user: NewUser, role_ids: &[i64], audit: AuditRecord) -> RepoResult<User>;

    async fn update(&self, id: i64, changes: UserChanges, audit: AuditRecord) -> RepoResult<User>;

    async fn update_password(&self, id: i64, password_hash: &str, audit: AuditRecord)
    -> RepoResult<()>;

    /// Silent hash upgrade after a successful login; not audited.
    async fn rehash_password(&self, id: i64, password_hash: &str) -> RepoResult<()>;

    /// Stores a secret awaiting verification. 2FA stays disabled.
    async fn set_pending_totp(&self, id: i64, secret: &str, audit: AuditRecord) -> RepoResult<()>;

    async fn enable_totp(
        &self,
        id: i64,
        recovery_hashes: &[String],
        audit: AuditRecord,
    ) -> RepoResult<()>;

    async fn disable_totp(&self, id: i64, audit: AuditRecord) -> RepoResult<()>;

    /// Removes one recovery hash. Returns false when it was not present,
    /// including when a concurrent request consumed it first.
    async fn consume_recovery_hash(&self, id: i64, hash: &str) -> RepoResult<bool>;

    async fn set_roles(&self, id: i64, role_ids: &[i64], audit: AuditRecord) -> RepoResult<()>;

    async fn soft_delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()>;
}

pub struct SeaOrmUserRepository {
    conn: DatabaseConnection,
}

impl SeaOrmUserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn modify<F>(&self, id: i64, audit: AuditRecord, apply: F) -> RepoResult<users::Model>
    where
        F: FnOnce(&mut users::ActiveModel) + Send,
    {
        let txn = self.conn.begin().await?;

        let mut active: users::ActiveModel = find_live(&txn, id).await?.into();
        apply(&mut active);
        active.updated_at = Set(chrono::Utc::now());
        let model = active.update(&txn).await?;

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(model)
    }
}

#[async_trait]
impl UserQueryRepository for SeaOrmUserRepository {
    async fn find_by_id(&self, id: i64) -> RepoResult<User> {
        User::try_from(find_live(&self.conn, id).await?)
    }

    async fn find_by_account(&self, account: &str) -> RepoResult<Option<User>> {
        let model = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(account))
                    .add(users::Column::Email.eq(account)),
            )
            .filter(users::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;

        model.map(User::try_from).transpose()
    }

    async fn find_with_roles(&self, id: i64) -> RepoResult<UserWithRoles> {
        let user = User::try_from(find_live(&self.conn, id).await?)?;
        let roles = roles_for_users(&self.conn, &[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        Ok(UserWithRoles { user, roles })
    }

    async fn list(&self, filter: &UserFilter, page: PageRequest) -> RepoResult<Page<UserWithRoles>> {
        let mut query = users::Entity::find().filter(users::Column::DeletedAt.is_null());

        if let Some(keyword) = filter.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(users::Column::Username.contains(keyword))
                    .add(users::Column::Email.contains(keyword))
                    .add(users::Column::FullName.contains(keyword)),
            );
        }
        if let Some(status) = filter.status {
            query = query.filter(users::Column::Status.eq(status.as_str()));
        }

        let total = query.clone().count(&self.conn).await?;
        let models = query
            .order_by_asc(users::Column::Id)
            .offset(page.offset())
            .limit(page.per_page)
            .all(&self.conn)
            .await?;

        let ids: Vec<i64> = models.iter().map(|m| m.id).collect();
        let mut roles = roles_for_users(&self.conn, &ids).await?;

        let items = models
            .into_iter()
            .map(|model| {
                let roles = roles.remove(&model.id).unwrap_or_default();
                User::try_from(model).map(|user| UserWithRoles { user, roles })
            })
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(Page::new(items, total, page))
    }

    async fn username_taken(&self, username: &str) -> RepoResult<bool> {
        taken(&self.conn, users::Column::Username, username).await
    }

    async fn email_taken(&self, email: &str) -> RepoResult<bool> {
        taken(&self.conn, users::Column::Email, email).await
    }

    async fn count_by_status(&self) -> RepoResult<Vec<(UserStatus, u64)>> {
        let mut counts = Vec::with_capacity(UserStatus::ALL.len());
        for status in UserStatus::ALL {
            let count = users::Entity::find()
                .filter(users::Column::DeletedAt.is_null())
                .filter(users::Column::Status.eq(status.as_str()))
                .count(&self.conn)
                .await?;
            counts.push((status, count));
        }
        Ok(counts)
    }
}

#[async_trait]
impl UserCommandRepository for SeaOrmUserRepository {
    async fn create(&self, user: NewUser, role_ids: &[i64], audit: AuditRecord) -> RepoResult<User> {
        let txn = self.conn.begin().await?;

        if taken(&txn, users::Column::Username, &user.username).await? {
            return Err(RepoError::conflict("username"));
        }
        if taken(&txn, users::Column::Email, &user.email).await? {
            return Err(RepoError::conflict("email"));
        }

        let now = chrono::Utc::now();
        let model = users::ActiveModel {
            username: Set(user.username),
            email: Set(user.email),
            password_hash: Set(user.password_hash),
            full_name: Set(user.full_name),
            avatar: Set(None),
            bio: Set(None),
            status: Set(user.status.as_str().to_string()),
            totp_secret: Set(None),
            totp_enabled: Set(false),
            totp_recovery_hashes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        replace_roles(&txn, model.id, role_ids).await?;

        let mut audit = audit.resource_id(model.id);
        // A self-registration is performed by the account it creates.
        if audit.action == AuditAction::Register {
            audit = audit.actor(model.id, &model.username);
        }
        insert_audit(&txn, &audit).await?;
        txn.commit().await?;

        User::try_from(model)
    }

    async fn update(&self, id: i64, changes: UserChanges, audit: AuditRecord) -> RepoResult<User> {
        if let Some(email) = &changes.email {
            let current = find_live(&self.conn, id).await?;
            if &current.email != email && taken(&self.conn, users::Column::Email, email).await? {
                return Err(RepoError::conflict("email"));
            }
        }

        let model = self
            .modify(id, audit, move |active| {
                if let Some(email) = changes.email {
                    active.email = Set(email);
                }
                if let Some(full_name) = changes.full_name {
                    active.full_name = Set(full_name);
                }
                if let Some(avatar) = changes.avatar {
                    active.avatar = Set(avatar);
                }
                if let Some(bio) = changes.bio {
                    active.bio = Set(bio);
                }
                if let Some(status) = changes.status {
                    active.status = Set(status.as_str().to_string());
                }
            })
            .await?;

        User::try_from(model)
    }

    async fn update_password(
        &self,
        id: i64,
        password_hash: &str,
        audit: AuditRecord,
    ) -> RepoResult<()> {
        let hash = password_hash.to_string();
        self.modify(id, audit, move |active| active.password_hash = Set(hash))
            .await?;
        Ok(())
    }

    async fn rehash_password(&self, id: i64, password_hash: &str) -> RepoResult<()> {
        users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn set_pending_totp(&self, id: i64, secret: &str, audit: AuditRecord) -> RepoResult<()> {
        let secret = secret.to_string();
        self.modify(id, audit, move |active| {
            active.totp_secret = Set(Some(secret));
            active.totp_enabled = Set(false);
            active.totp_recovery_hashes = Set(None);
        })
        .await?;
        Ok(())
    }

    async fn enable_totp(
        &self,
        id: i64,
        recovery_hashes: &[String],
        audit: AuditRecord,
    ) -> RepoResult<()> {
        let encoded = encode_hashes(recovery_hashes)?;
        self.modify(id, audit, move |active| {
            active.totp_enabled = Set(true);
            active.totp_recovery_hashes = Set(encoded);
        })
        .await?;
        Ok(())
    }

    async fn disable_totp(&self, id: i64, audit: AuditRecord) -> RepoResult<()> {
        self.modify(id, audit, |active| {
            active.totp_secret = Set(None);
            active.totp_enabled = Set(false);
            active.totp_recovery_hashes = Set(None);
        })
        .await?;
        Ok(())
    }

    async fn consume_recovery_hash(&self, id: i64, hash: &str) -> RepoResult<bool> {
        let model = find_live(&self.conn, id).await?;
        let Some(current) = model.totp_recovery_hashes else {
            return Ok(false);
        };

        let mut hashes = decode_hashes(Some(&current))?;
        let Some(index) = hashes
            .iter()
            .position(|h| constant_time_eq(h.as_bytes(), hash.as_bytes()))
        else {
            return Ok(false);
        };
        hashes.remove(index);

        // Compare-and-swap on the stored list so a code is spent at most once.
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::TotpRecoveryHashes,
                Expr::value(encode_hashes(&hashes)?),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::TotpRecoveryHashes.eq(current))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn set_roles(&self, id: i64, role_ids: &[i64], audit: AuditRecord) -> RepoResult<()> {
        let txn = self.conn.begin().await?;

        let model = find_live(&txn, id).await?;
        replace_roles(&txn, id, role_ids).await?;

        let mut active: users::ActiveModel = model.into();
        active.updated_at = Set(chrono::Utc::now());
        active.update(&txn).await?;

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn soft_delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()> {
        let txn = self.conn.begin().await?;

        let model = find_live(&txn, id).await?;
        user_roles::Entity::delete_many()
            .filter(user_roles::Column::UserId.eq(id))
            .exec(&txn)
            .await?;

        let now = chrono::Utc::now();
        let mut active: users::ActiveModel = model.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }
}
