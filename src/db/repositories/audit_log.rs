use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value;

use super::error::{RepoError, RepoResult};
use crate::domain::{AuditEntry, AuditFilter, AuditRecord, Page, PageRequest};
use crate::entities::audit_logs;

impl From<audit_logs::Model> for AuditEntry {
    fn from(model: audit_logs::Model) -> Self {
        Self {
            id: model.id,
            created_at: model.created_at,
            user_id: model.user_id,
            username: model.username,
            action: model.action,
            resource: model.resource,
            resource_id: model.resource_id,
            status: model.status,
            ip: model.ip,
            user_agent: model.user_agent,
            details: model
                .details
                .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw))),
        }
    }
}

/// Inserts one audit row on `conn`, which may be an open transaction so
/// the entry commits or rolls back with the change it describes.
pub async fn insert_audit<C: ConnectionTrait>(conn: &C, record: &AuditRecord) -> Result<i64, DbErr> {
    let details = record
        .detail
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DbErr::Custom(format!("audit detail is not serializable: {e}")))?;

    let model = audit_logs::ActiveModel {
        created_at: Set(record.occurred_at),
        user_id: Set(record.user_id),
        username: Set(record.username.clone()),
        action: Set(record.action.as_str().to_string()),
        resource: Set(record.resource.as_str().to_string()),
        resource_id: Set(record.resource_id.clone()),
        status: Set(record.status.as_str().to_string()),
        ip: Set(record.ip.clone()),
        user_agent: Set(record.user_agent.clone()),
        details: Set(details),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    Ok(model.id)
}

#[async_trait]
pub trait AuditLogCommandRepository: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> RepoResult<i64>;
}

#[async_trait]
pub trait AuditLogQueryRepository: Send + Sync {
    /// Newest first.
    async fn list(&self, filter: &AuditFilter, page: PageRequest) -> RepoResult<Page<AuditEntry>>;

    async fn find_by_id(&self, id: i64) -> RepoResult<AuditEntry>;

    async fn recent(&self, limit: u64) -> RepoResult<Vec<AuditEntry>>;
}

pub struct SeaOrmAuditLogRepository {
    conn: DatabaseConnection,
}

impl SeaOrmAuditLogRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AuditLogCommandRepository for SeaOrmAuditLogRepository {
    async fn append(&self, record: &AuditRecord) -> RepoResult<i64> {
        Ok(insert_audit(&self.conn, record).await?)
    }
}

#[async_trait]
impl AuditLogQueryRepository for SeaOrmAuditLogRepository {
    async fn list(&self, filter: &AuditFilter, page: PageRequest) -> RepoResult<Page<AuditEntry>> {
        let mut query = audit_logs::Entity::find();

        if let Some(user_id) = filter.user_id {
            query = query.filter(audit_logs::Column::UserId.eq(user_id));
        }
        if let Some(action) = &filter.action {
            query = query.filter(audit_logs::Column::Action.eq(action.as_str()));
        }
        if let Some(resource) = &filter.resource {
            query = query.filter(audit_logs::Column::Resource.eq(resource.as_str()));
        }
        if let Some(status) = &filter.status {
            query = query.filter(audit_logs::Column::Status.eq(status.as_str()));
        }
        if let Some(start) = filter.start_date {
            query = query.filter(audit_logs::Column::CreatedAt.gte(start));
        }
        if let Some(end) = filter.end_date {
            query = query.filter(audit_logs::Column::CreatedAt.lte(end));
        }

        let total = query.clone().count(&self.conn).await?;
        let rows = query
            .order_by_desc(audit_logs::Column::CreatedAt)
            .order_by_desc(audit_logs::Column::Id)
            .offset(page.offset())
            .limit(page.per_page)
            .all(&self.conn)
            .await?;

        Ok(Page::new(
            rows.into_iter().map(AuditEntry::from).collect(),
            total,
            page,
        ))
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<AuditEntry> {
        audit_logs::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
            .map(AuditEntry::from)
            .ok_or(RepoError::NotFound)
    }

    async fn recent(&self, limit: u64) -> RepoResult<Vec<AuditEntry>> {
        let rows = audit_logs::Entity::find()
            .order_by_desc(audit_logs::Column::CreatedAt)
            .order_by_desc(audit_logs::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}
