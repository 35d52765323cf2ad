use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::{BTreeSet, HashMap};

use super::audit_log::insert_audit;
use super::error::{RepoError, RepoResult};
use super::permission::ensure_permissions_exist;
use crate::domain::{AuditRecord, NewRole, Page, PageRequest, Permission, Role, RoleChanges};
use crate::entities::{permissions, role_permissions, roles, user_roles};

impl From<roles::Model> for Role {
    fn from(model: roles::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            display_name: model.display_name,
            description: model.description,
            is_system: model.is_system,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Live roles of each user in `user_ids`. Deleted roles are skipped.
pub async fn roles_for_users<C: ConnectionTrait>(
    conn: &C,
    user_ids: &[i64],
) -> RepoResult<HashMap<i64, Vec<Role>>> {
    let mut out: HashMap<i64, Vec<Role>> = HashMap::new();
    if user_ids.is_empty() {
        return Ok(out);
    }

    let links = user_roles::Entity::find()
        .filter(user_roles::Column::UserId.is_in(user_ids.iter().copied()))
        .all(conn)
        .await?;
    let role_ids: BTreeSet<i64> = links.iter().map(|l| l.role_id).collect();
    if role_ids.is_empty() {
        return Ok(out);
    }

    let roles: HashMap<i64, Role> = roles::Entity::find()
        .filter(roles::Column::Id.is_in(role_ids))
        .filter(roles::Column::DeletedAt.is_null())
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.id, Role::from(m)))
        .collect();

    for link in links {
        if let Some(role) = roles.get(&link.role_id) {
            out.entry(link.user_id).or_default().push(role.clone());
        }
    }
    for list in out.values_mut() {
        list.sort_by_key(|r| r.id);
    }

    Ok(out)
}

/// Fails with `NotFound` unless every id names a live role.
pub async fn ensure_roles_exist<C: ConnectionTrait>(conn: &C, role_ids: &[i64]) -> RepoResult<()> {
    let wanted: BTreeSet<i64> = role_ids.iter().copied().collect();
    if wanted.is_empty() {
        return Ok(());
    }

    let found = roles::Entity::find()
        .filter(roles::Column::Id.is_in(wanted.iter().copied()))
        .filter(roles::Column::DeletedAt.is_null())
        .count(conn)
        .await?;

    if found == wanted.len() as u64 {
        Ok(())
    } else {
        Err(RepoError::NotFound)
    }
}

async fn find_live<C: ConnectionTrait>(conn: &C, id: i64) -> RepoResult<roles::Model> {
    roles::Entity::find_by_id(id)
        .filter(roles::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or(RepoError::NotFound)
}

async fn replace_permissions<C: ConnectionTrait>(
    conn: &C,
    role_id: i64,
    permission_ids: &[i64],
) -> RepoResult<()> {
    let unique: BTreeSet<i64> = permission_ids.iter().copied().collect();
    ensure_permissions_exist(conn, &unique).await?;

    role_permissions::Entity::delete_many()
        .filter(role_permissions::Column::RoleId.eq(role_id))
        .exec(conn)
        .await?;

    if !unique.is_empty() {
        role_permissions::Entity::insert_many(unique.into_iter().map(|permission_id| {
            role_permissions::ActiveModel {
                role_id: Set(role_id),
                permission_id: Set(permission_id),
            }
        }))
        .exec_without_returning(conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
pub trait RoleQueryRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> RepoResult<Role>;

    async fn find_by_name(&self, name: &str) -> RepoResult<Option<Role>>;

    async fn list(&self, keyword: Option<&str>, page: PageRequest) -> RepoResult<Page<Role>>;

    async fn roles_of_user(&self, user_id: i64) -> RepoResult<Vec<Role>>;

    async fn permissions_of_role(&self, role_id: i64) -> RepoResult<Vec<Permission>>;

    /// Distinct permission codes granted by the live roles in `role_ids`.
    async fn permission_codes(&self, role_ids: &[i64]) -> RepoResult<Vec<String>>;

    async fn count(&self) -> RepoResult<u64>;
}

#[async_trait]
pub trait RoleCommandRepository: Send + Sync {
    async fn create(
        &self,
        role: NewRole,
        permission_ids: &[i64],
        audit: AuditRecord,
    ) -> RepoResult<Role>;

    async fn update(&self, id: i64, changes: RoleChanges, audit: AuditRecord) -> RepoResult<Role>;

    /// Soft-deletes the role. Fails with `InUse` while users still hold it.
    async fn soft_delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()>;

    async fn set_permissions(
        &self,
        id: i64,
        permission_ids: &[i64],
        audit: AuditRecord,
    ) -> RepoResult<()>;
}

pub struct SeaOrmRoleRepository {
    conn: DatabaseConnection,
}

impl SeaOrmRoleRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RoleQueryRepository for SeaOrmRoleRepository {
    async fn find_by_id(&self, id: i64) -> RepoResult<Role> {
        find_live(&self.conn, id).await.map(Role::from)
    }

    async fn find_by_name(&self, name: &str) -> RepoResult<Option<Role>> {
        let role = roles::Entity::find()
            .filter(roles::Column::Name.eq(name))
            .filter(roles::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(role.map(Role::from))
    }

    async fn list(&self, keyword: Option<&str>, page: PageRequest) -> RepoResult<Page<Role>> {
        let mut query = roles::Entity::find().filter(roles::Column::DeletedAt.is_null());
        if let Some(keyword) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(roles::Column::Name.contains(keyword))
                    .add(roles::Column::DisplayName.contains(keyword)),
            );
        }

        let total = query.clone().count(&self.conn).await?;
        let rows = query
            .order_by_asc(roles::Column::Id)
            .offset(page.offset())
            .limit(page.per_page)
            .all(&self.conn)
            .await?;

        Ok(Page::new(rows.into_iter().map(Role::from).collect(), total, page))
    }

    async fn roles_of_user(&self, user_id: i64) -> RepoResult<Vec<Role>> {
        let mut by_user = roles_for_users(&self.conn, &[user_id]).await?;
        Ok(by_user.remove(&user_id).unwrap_or_default())
    }

    async fn permissions_of_role(&self, role_id: i64) -> RepoResult<Vec<Permission>> {
        find_live(&self.conn, role_id).await?;

        let permission_ids: Vec<i64> = role_permissions::Entity::find()
            .filter(role_permissions::Column::RoleId.eq(role_id))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|rp| rp.permission_id)
            .collect();
        if permission_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = permissions::Entity::find()
            .filter(permissions::Column::Id.is_in(permission_ids))
            .filter(permissions::Column::DeletedAt.is_null())
            .order_by_asc(permissions::Column::Code)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn permission_codes(&self, role_ids: &[i64]) -> RepoResult<Vec<String>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let live_roles: Vec<i64> = roles::Entity::find()
            .filter(roles::Column::Id.is_in(role_ids.iter().copied()))
            .filter(roles::Column::DeletedAt.is_null())
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        if live_roles.is_empty() {
            return Ok(Vec::new());
        }

        let permission_ids: BTreeSet<i64> = role_permissions::Entity::find()
            .filter(role_permissions::Column::RoleId.is_in(live_roles))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|rp| rp.permission_id)
            .collect();
        if permission_ids.is_empty() {
            return Ok(Vec::new());
        }

        let codes = permissions::Entity::find()
            .filter(permissions::Column::Id.is_in(permission_ids))
            .filter(permissions::Column::DeletedAt.is_null())
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|p| p.code)
            .collect();

        Ok(codes)
    }

    async fn count(&self) -> RepoResult<u64> {
        Ok(roles::Entity::find()
            .filter(roles::Column::DeletedAt.is_null())
            .count(&self.conn)
            .await?)
    }
}

#[async_trait]
impl RoleCommandRepository for SeaOrmRoleRepository {
    async fn create(
        &self,
        role: NewRole,
        permission_ids: &[i64],
        audit: AuditRecord,
    ) -> RepoResult<Role> {
        let txn = self.conn.begin().await?;
        let now = chrono::Utc::now();

        let model = roles::ActiveModel {
            name: Set(role.name),
            display_name: Set(role.display_name),
            description: Set(role.description),
            is_system: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        replace_permissions(&txn, model.id, permission_ids).await?;
        insert_audit(&txn, &audit.resource_id(model.id)).await?;
        txn.commit().await?;

        Ok(Role::from(model))
    }

    async fn update(&self, id: i64, changes: RoleChanges, audit: AuditRecord) -> RepoResult<Role> {
        let txn = self.conn.begin().await?;

        let mut active: roles::ActiveModel = find_live(&txn, id).await?.into();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(display_name) = changes.display_name {
            active.display_name = Set(display_name);
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        active.updated_at = Set(chrono::Utc::now());

        let model = active.update(&txn).await?;
        insert_audit(&txn, &audit).await?;
        txn.commit().await?;

        Ok(Role::from(model))
    }

    async fn soft_delete(&self, id: i64, audit: AuditRecord) -> RepoResult<()> {
        let txn = self.conn.begin().await?;

        let model = find_live(&txn, id).await?;
        let holders = user_roles::Entity::find()
            .filter(user_roles::Column::RoleId.eq(id))
            .count(&txn)
            .await?;
        if holders > 0 {
            return Err(RepoError::in_use("users"));
        }

        let now = chrono::Utc::now();
        let mut active: roles::ActiveModel = model.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn set_permissions(
        &self,
        id: i64,
        permission_ids: &[i64],
        audit: AuditRecord,
    ) -> RepoResult<()> {
        let txn = self.conn.begin().await?;

        let model = find_live(&txn, id).await?;
        replace_permissions(&txn, id, permission_ids).await?;

        let mut active: roles::ActiveModel = model.into();
        active.updated_at = Set(chrono::Utc::now());
        active.update(&txn).await?;

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }
}
