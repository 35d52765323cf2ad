use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::BTreeSet;

use super::audit_log::insert_audit;
use super::error::{RepoError, RepoResult};
use crate::domain::permission::split_code;
use crate::domain::{AuditRecord, Page, PageRequest, Permission};
use crate::entities::{permissions, role_permissions};

impl From<permissions::Model> for Permission {
    fn from(model: permissions::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            resource: model.resource,
            action: model.action,
            description: model.description,
            created_at: model.created_at,
        }
    }
}

/// Fails with `NotFound` unless every id names a live permission.
pub async fn ensure_permissions_exist<C: ConnectionTrait>(
    conn: &C,
    ids: &BTreeSet<i64>,
) -> RepoResult<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let found = permissions::Entity::find()
        .filter(permissions::Column::Id.is_in(ids.iter().copied()))
        .filter(permissions::Column::DeletedAt.is_null())
        .count(conn)
        .await?;

    if found == ids.len() as u64 {
        Ok(())
    } else {
        Err(RepoError::NotFound)
    }
}

#[async_trait]
pub trait PermissionQueryRepository: Send + Sync {
    async fn list(&self, resource: Option<&str>, page: PageRequest) -> RepoResult<Page<Permission>>;

    async fn find_by_id(&self, id: i64) -> RepoResult<Permission>;

    async fn count(&self) -> RepoResult<u64>;
}

#[async_trait]
pub trait PermissionCommandRepository: Send + Sync {
    async fn create(&self, code: &str, description: &str, audit: AuditRecord)
    -> RepoResult<Permission>;

    /// Soft-deletes the permission and detaches it from every role.
    async fn soft_delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()>;
}

pub struct SeaOrmPermissionRepository {
    conn: DatabaseConnection,
}

impl SeaOrmPermissionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl PermissionQueryRepository for SeaOrmPermissionRepository {
    async fn list(&self, resource: Option<&str>, page: PageRequest) -> RepoResult<Page<Permission>> {
        let mut query =
            permissions::Entity::find().filter(permissions::Column::DeletedAt.is_null());
        if let Some(resource) = resource.filter(|r| !r.is_empty()) {
            query = query.filter(permissions::Column::Resource.eq(resource));
        }

        let total = query.clone().count(&self.conn).await?;
        let rows = query
            .order_by_asc(permissions::Column::Code)
            .offset(page.offset())
            .limit(page.per_page)
            .all(&self.conn)
            .await?;

        Ok(Page::new(
            rows.into_iter().map(Permission::from).collect(),
            total,
            page,
        ))
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Permission> {
        permissions::Entity::find_by_id(id)
            .filter(permissions::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?
            .map(Permission::from)
            .ok_or(RepoError::NotFound)
    }

    async fn count(&self) -> RepoResult<u64> {
        Ok(permissions::Entity::find()
            .filter(permissions::Column::DeletedAt.is_null())
            .count(&self.conn)
            .await?)
    }
}

#[async_trait]
impl PermissionCommandRepository for SeaOrmPermissionRepository {
    async fn create(
        &self,
        code: &str,
        description: &str,
        audit: AuditRecord,
    ) -> RepoResult<Permission> {
        let (resource, action) = split_code(code);
        let now = chrono::Utc::now();
        let txn = self.conn.begin().await?;

        let model = permissions::ActiveModel {
            code: Set(code.to_string()),
            resource: Set(resource),
            action: Set(action),
            description: Set(description.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        insert_audit(&txn, &audit.resource_id(model.id)).await?;
        txn.commit().await?;

        Ok(Permission::from(model))
    }

    async fn soft_delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()> {
        let txn = self.conn.begin().await?;

        let model = permissions::Entity::find_by_id(id)
            .filter(permissions::Column::DeletedAt.is_null())
            .one(&txn)
            .await?
            .ok_or(RepoError::NotFound)?;

        role_permissions::Entity::delete_many()
            .filter(role_permissions::Column::PermissionId.eq(id))
            .exec(&txn)
            .await?;

        let now = chrono::Utc::now();
        let mut active: permissions::ActiveModel = model.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }
}
