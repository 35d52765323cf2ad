use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use super::audit_log::insert_audit;
use super::error::{RepoError, RepoResult};
use crate::domain::{AuditRecord, Menu, MenuChanges, MenuOrder, NewMenu};
use crate::entities::menus;

impl From<menus::Model> for Menu {
    fn from(model: menus::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            path: model.path,
            icon: model.icon,
            parent_id: model.parent_id,
            sort_order: model.sort_order,
            visible: model.visible,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

async fn find<C: ConnectionTrait>(conn: &C, id: i64) -> RepoResult<menus::Model> {
    menus::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(RepoError::NotFound)
}

#[async_trait]
pub trait MenuQueryRepository: Send + Sync {
    async fn list_all(&self) -> RepoResult<Vec<Menu>>;

    async fn find_by_id(&self, id: i64) -> RepoResult<Menu>;

    async fn count(&self) -> RepoResult<u64>;
}

#[async_trait]
pub trait MenuCommandRepository: Send + Sync {
    async fn create(&self, menu: NewMenu, audit: AuditRecord) -> RepoResult<Menu>;

    async fn update(&self, id: i64, changes: MenuChanges, audit: AuditRecord) -> RepoResult<Menu>;

    /// Physical delete. Fails with `InUse` while the menu has children.
    async fn delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()>;

    /// Applies every placement or none of them.
    async fn reorder(&self, items: &[MenuOrder], audit: AuditRecord) -> RepoResult<()>;
}

pub struct SeaOrmMenuRepository {
    conn: DatabaseConnection,
}

impl SeaOrmMenuRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl MenuQueryRepository for SeaOrmMenuRepository {
    async fn list_all(&self) -> RepoResult<Vec<Menu>> {
        let rows = menus::Entity::find()
            .order_by_asc(menus::Column::SortOrder)
            .order_by_asc(menus::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(Menu::from).collect())
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Menu> {
        find(&self.conn, id).await.map(Menu::from)
    }

    async fn count(&self) -> RepoResult<u64> {
        Ok(menus::Entity::find().count(&self.conn).await?)
    }
}

#[async_trait]
impl MenuCommandRepository for SeaOrmMenuRepository {
    async fn create(&self, menu: NewMenu, audit: AuditRecord) -> RepoResult<Menu> {
        let txn = self.conn.begin().await?;
        if let Some(parent_id) = menu.parent_id {
            find(&txn, parent_id).await?;
        }

        let now = chrono::Utc::now();
        let model = menus::ActiveModel {
            title: Set(menu.title),
            path: Set(menu.path),
            icon: Set(menu.icon),
            parent_id: Set(menu.parent_id),
            sort_order: Set(menu.sort_order),
            visible: Set(menu.visible),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        insert_audit(&txn, &audit.resource_id(model.id)).await?;
        txn.commit().await?;

        Ok(Menu::from(model))
    }

    async fn update(&self, id: i64, changes: MenuChanges, audit: AuditRecord) -> RepoResult<Menu> {
        let txn = self.conn.begin().await?;

        let mut active: menus::ActiveModel = find(&txn, id).await?.into();
        if let Some(Some(parent_id)) = changes.parent_id {
            find(&txn, parent_id).await?;
        }

        if let Some(title) = changes.title {
            active.title = Set(title);
        }
        if let Some(path) = changes.path {
            active.path = Set(path);
        }
        if let Some(icon) = changes.icon {
            active.icon = Set(icon);
        }
        if let Some(parent_id) = changes.parent_id {
            active.parent_id = Set(parent_id);
        }
        if let Some(sort_order) = changes.sort_order {
            active.sort_order = Set(sort_order);
        }
        if let Some(visible) = changes.visible {
            active.visible = Set(visible);
        }
        active.updated_at = Set(chrono::Utc::now());

        let model = active.update(&txn).await?;
        insert_audit(&txn, &audit).await?;
        txn.commit().await?;

        Ok(Menu::from(model))
    }

    async fn delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()> {
        let txn = self.conn.begin().await?;

        find(&txn, id).await?;
        let children = menus::Entity::find()
            .filter(menus::Column::ParentId.eq(id))
            .count(&txn)
            .await?;
        if children > 0 {
            return Err(RepoError::in_use("child menus"));
        }

        menus::Entity::delete_by_id(id).exec(&txn).await?;
        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn reorder(&self, items: &[MenuOrder], audit: AuditRecord) -> RepoResult<()> {
        let txn = self.conn.begin().await?;
        let now = chrono::Utc::now();

        for item in items {
            let mut active: menus::ActiveModel = find(&txn, item.id).await?.into();
            active.sort_order = Set(item.sort_order);
            active.parent_id = Set(item.parent_id);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }
}
