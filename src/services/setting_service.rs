//! Domain service for key-value settings.

use crate::domain::{ClientInfo, NewSetting, Principal, Setting, SettingCategory};
use crate::services::error::ServiceError;

#[async_trait::async_trait]
pub trait SettingService: Send + Sync {
    async fn list(&self, category: Option<SettingCategory>) -> Result<Vec<Setting>, ServiceError>;

    async fn get(&self, key: &str) -> Result<Setting, ServiceError>;

    /// Creates a setting after checking its value against its type.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed key or value and `Conflict` when
    /// the key exists.
    async fn create(
        &self,
        principal: &Principal,
        setting: NewSetting,
        client: &ClientInfo,
    ) -> Result<Setting, ServiceError>;

    async fn update(
        &self,
        principal: &Principal,
        key: &str,
        value: Option<String>,
        label: Option<String>,
        client: &ClientInfo,
    ) -> Result<Setting, ServiceError>;

    /// Updates several values at once. Either all of them are written or
    /// none is.
    async fn batch_update(
        &self,
        principal: &Principal,
        values: Vec<(String, String)>,
        client: &ClientInfo,
    ) -> Result<Vec<Setting>, ServiceError>;

    async fn delete(
        &self,
        principal: &Principal,
        key: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError>;
}
