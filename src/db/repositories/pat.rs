use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use super::audit_log::insert_audit;
use super::error::{RepoError, RepoResult};
use crate::domain::{AuditRecord, NewPersonalAccessToken, PatStatus, PersonalAccessToken};
use crate::entities::personal_access_tokens;

impl TryFrom<personal_access_tokens::Model> for PersonalAccessToken {
    type Error = RepoError;

    fn try_from(model: personal_access_tokens::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            name: model.name,
            token_prefix: model.token_prefix,
            token_hash: model.token_hash,
            permissions: serde_json::from_str(&model.permissions)?,
            status: model.status.parse().map_err(RepoError::Database)?,
            expires_at: model.expires_at,
            last_used_at: model.last_used_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

fn convert_all(models: Vec<personal_access_tokens::Model>) -> RepoResult<Vec<PersonalAccessToken>> {
    models.into_iter().map(PersonalAccessToken::try_from).collect()
}

#[async_trait]
pub trait PatQueryRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> RepoResult<PersonalAccessToken>;

    /// Candidates sharing the indexed lookup prefix.
    async fn find_by_prefix(&self, prefix: &str) -> RepoResult<Vec<PersonalAccessToken>>;

    async fn list_by_user(&self, user_id: i64) -> RepoResult<Vec<PersonalAccessToken>>;
}

#[async_trait]
pub trait PatCommandRepository: Send + Sync {
    async fn create(
        &self,
        token: NewPersonalAccessToken,
        audit: AuditRecord,
    ) -> RepoResult<PersonalAccessToken>;

    async fn set_status(
        &self,
        id: i64,
        status: PatStatus,
        audit: AuditRecord,
    ) -> RepoResult<PersonalAccessToken>;

    async fn delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()>;

    /// Best-effort usage stamp. Concurrent stamps may overwrite each other.
    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> RepoResult<()>;

    /// Physically removes tokens that expired before `before`.
    async fn delete_expired(&self, before: DateTime<Utc>) -> RepoResult<u64>;
}

pub struct SeaOrmPatRepository {
    conn: DatabaseConnection,
}

impl SeaOrmPatRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl PatQueryRepository for SeaOrmPatRepository {
    async fn find_by_id(&self, id: i64) -> RepoResult<PersonalAccessToken> {
        personal_access_tokens::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or(RepoError::NotFound)
            .and_then(PersonalAccessToken::try_from)
    }

    async fn find_by_prefix(&self, prefix: &str) -> RepoResult<Vec<PersonalAccessToken>> {
        let models = personal_access_tokens::Entity::find()
            .filter(personal_access_tokens::Column::TokenPrefix.eq(prefix))
            .all(&self.conn)
            .await?;
        convert_all(models)
    }

    async fn list_by_user(&self, user_id: i64) -> RepoResult<Vec<PersonalAccessToken>> {
        let models = personal_access_tokens::Entity::find()
            .filter(personal_access_tokens::Column::UserId.eq(user_id))
            .order_by_desc(personal_access_tokens::Column::CreatedAt)
            .order_by_desc(personal_access_tokens::Column::Id)
            .all(&self.conn)
            .await?;
        convert_all(models)
    }
}

#[async_trait]
impl PatCommandRepository for SeaOrmPatRepository {
    async fn create(
        &self,
        token: NewPersonalAccessToken,
        audit: AuditRecord,
    ) -> RepoResult<PersonalAccessToken> {
        let permissions = serde_json::to_string(&token.permissions)?;
        let now = Utc::now();
        let txn = self.conn.begin().await?;

        let duplicate = personal_access_tokens::Entity::find()
            .filter(personal_access_tokens::Column::UserId.eq(token.user_id))
            .filter(personal_access_tokens::Column::Name.eq(token.name.as_str()))
            .one(&txn)
            .await?;
        if duplicate.is_some() {
            return Err(RepoError::conflict("name"));
        }

        let model = personal_access_tokens::ActiveModel {
            user_id: Set(token.user_id),
            name: Set(token.name),
            token_prefix: Set(token.token_prefix),
            token_hash: Set(token.token_hash),
            permissions: Set(permissions),
            status: Set(PatStatus::Active.as_str().to_string()),
            expires_at: Set(token.expires_at),
            last_used_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        insert_audit(&txn, &audit.resource_id(model.id)).await?;
        txn.commit().await?;

        PersonalAccessToken::try_from(model)
    }

    async fn set_status(
        &self,
        id: i64,
        status: PatStatus,
        audit: AuditRecord,
    ) -> RepoResult<PersonalAccessToken> {
        let txn = self.conn.begin().await?;

        let model = personal_access_tokens::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(RepoError::NotFound)?;

        let mut active: personal_access_tokens::ActiveModel = model.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;

        PersonalAccessToken::try_from(model)
    }

    async fn delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()> {
        let txn = self.conn.begin().await?;

        let result = personal_access_tokens::Entity::delete_by_id(id)
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(RepoError::NotFound);
        }

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> RepoResult<()> {
        personal_access_tokens::Entity::update_many()
            .col_expr(personal_access_tokens::Column::LastUsedAt, Expr::value(at))
            .filter(personal_access_tokens::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> RepoResult<u64> {
        let result = personal_access_tokens::Entity::delete_many()
            .filter(personal_access_tokens::Column::ExpiresAt.lt(before))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
