use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

use super::audit_log::insert_audit;
use super::error::{RepoError, RepoResult};
use crate::domain::{AuditRecord, NewSetting, Setting, SettingCategory};
use crate::entities::settings;

impl TryFrom<settings::Model> for Setting {
    type Error = RepoError;

    fn try_from(model: settings::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            key: model.key,
            value: model.value,
            category: model.category.parse().map_err(RepoError::Database)?,
            value_type: model.value_type.parse().map_err(RepoError::Database)?,
            label: model.label,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

async fn find<C: ConnectionTrait>(conn: &C, key: &str) -> RepoResult<settings::Model> {
    settings::Entity::find()
        .filter(settings::Column::Key.eq(key))
        .one(conn)
        .await?
        .ok_or(RepoError::NotFound)
}

async fn write_value<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    value: Option<String>,
    label: Option<String>,
) -> RepoResult<settings::Model> {
    let mut active: settings::ActiveModel = find(conn, key).await?.into();
    if let Some(value) = value {
        active.value = Set(value);
    }
    if let Some(label) = label {
        active.label = Set(label);
    }
    active.updated_at = Set(chrono::Utc::now());
    Ok(active.update(conn).await?)
}

#[async_trait]
pub trait SettingQueryRepository: Send + Sync {
    async fn list(&self, category: Option<SettingCategory>) -> RepoResult<Vec<Setting>>;

    async fn find_by_key(&self, key: &str) -> RepoResult<Setting>;
}

#[async_trait]
pub trait SettingCommandRepository: Send + Sync {
    async fn create(&self, setting: NewSetting, audit: AuditRecord) -> RepoResult<Setting>;

    async fn update(
        &self,
        key: &str,
        value: Option<String>,
        label: Option<String>,
        audit: AuditRecord,
    ) -> RepoResult<Setting>;

    /// Writes every `(key, value)` pair or none of them.
    async fn batch_update(
        &self,
        values: Vec<(String, String)>,
        audit: AuditRecord,
    ) -> RepoResult<Vec<Setting>>;

    async fn delete(&self, key: &str, audit: AuditRecord) -> RepoResult<()>;
}

pub struct SeaOrmSettingRepository {
    conn: DatabaseConnection,
}

impl SeaOrmSettingRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SettingQueryRepository for SeaOrmSettingRepository {
    async fn list(&self, category: Option<SettingCategory>) -> RepoResult<Vec<Setting>> {
        let mut query = settings::Entity::find();
        if let Some(category) = category {
            query = query.filter(settings::Column::Category.eq(category.as_str()));
        }

        query
            .order_by_asc(settings::Column::Category)
            .order_by_asc(settings::Column::Key)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(Setting::try_from)
            .collect()
    }

    async fn find_by_key(&self, key: &str) -> RepoResult<Setting> {
        Setting::try_from(find(&self.conn, key).await?)
    }
}

#[async_trait]
impl SettingCommandRepository for SeaOrmSettingRepository {
    async fn create(&self, setting: NewSetting, audit: AuditRecord) -> RepoResult<Setting> {
        let now = chrono::Utc::now();
        let txn = self.conn.begin().await?;

        let model = settings::ActiveModel {
            key: Set(setting.key),
            value: Set(setting.value),
            category: Set(setting.category.as_str().to_string()),
            value_type: Set(setting.value_type.as_str().to_string()),
            label: Set(setting.label),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;

        Setting::try_from(model)
    }

    async fn update(
        &self,
        key: &str,
        value: Option<String>,
        label: Option<String>,
        audit: AuditRecord,
    ) -> RepoResult<Setting> {
        let txn = self.conn.begin().await?;
        let model = write_value(&txn, key, value, label).await?;
        insert_audit(&txn, &audit).await?;
        txn.commit().await?;

        Setting::try_from(model)
    }

    async fn batch_update(
        &self,
        values: Vec<(String, String)>,
        audit: AuditRecord,
    ) -> RepoResult<Vec<Setting>> {
        let txn = self.conn.begin().await?;

        let mut updated = Vec::with_capacity(values.len());
        for (key, value) in values {
            updated.push(write_value(&txn, &key, Some(value), None).await?);
        }

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;

        updated.into_iter().map(Setting::try_from).collect()
    }

    async fn delete(&self, key: &str, audit: AuditRecord) -> RepoResult<()> {
        let txn = self.conn.begin().await?;

        let result = settings::Entity::delete_many()
            .filter(settings::Column::Key.eq(key))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(RepoError::NotFound);
        }

        insert_audit(&txn, &audit).await?;
        txn.commit().await?;
        Ok(())
    }
}
