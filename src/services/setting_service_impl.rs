//! `SeaORM`-backed implementation of the `SettingService` trait.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use crate::db::repositories::{Repositories, SettingCommandRepository, SettingQueryRepository};
use crate::domain::{
    AuditAction, AuditRecord, AuditResource, ClientInfo, NewSetting, Principal, Setting,
    SettingCategory,
};
use crate::services::error::{NotFoundExt, ServiceError};
use crate::services::setting_service::SettingService;

fn key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_.]{0,99}$").expect("Invalid regex"))
}

pub struct SeaOrmSettingService {
    settings: Arc<dyn SettingQueryRepository>,
    commands: Arc<dyn SettingCommandRepository>,
}

impl SeaOrmSettingService {
    #[must_use]
    pub fn new(repos: &Repositories) -> Self {
        Self {
            settings: repos.settings.clone(),
            commands: repos.settings.clone(),
        }
    }

    fn record(action: AuditAction, principal: &Principal, client: &ClientInfo) -> AuditRecord {
        AuditRecord::new(action, AuditResource::Setting)
            .by(principal)
            .client(client)
    }

    async fn current(&self, key: &str) -> Result<Setting, ServiceError> {
        self.settings.find_by_key(key).await.or_not_found("setting")
    }

    fn check_value(setting: &Setting, value: &str) -> Result<(), ServiceError> {
        setting
            .value_type
            .check(value)
            .map_err(|e| ServiceError::validation(format!("{}: {e}", setting.key)))
    }
}

#[async_trait]
impl SettingService for SeaOrmSettingService {
    async fn list(&self, category: Option<SettingCategory>) -> Result<Vec<Setting>, ServiceError> {
        Ok(self.settings.list(category).await?)
    }

    async fn get(&self, key: &str) -> Result<Setting, ServiceError> {
        self.current(key).await
    }

    async fn create(
        &self,
        principal: &Principal,
        mut setting: NewSetting,
        client: &ClientInfo,
    ) -> Result<Setting, ServiceError> {
        setting.key = setting.key.trim().to_string();
        if !key_regex().is_match(&setting.key) {
            return Err(ServiceError::validation(
                "key must start with a letter and contain only a-z, 0-9, '_' or '.'",
            ));
        }
        setting
            .value_type
            .check(&setting.value)
            .map_err(|e| ServiceError::validation(format!("{}: {e}", setting.key)))?;

        let detail = json!({
            "key": setting.key,
            "category": setting.category.as_str(),
            "value_type": setting.value_type.as_str(),
        });
        Ok(self
            .commands
            .create(
                setting,
                Self::record(AuditAction::Create, principal, client).detail(detail),
            )
            .await?)
    }

    async fn update(
        &self,
        principal: &Principal,
        key: &str,
        value: Option<String>,
        label: Option<String>,
        client: &ClientInfo,
    ) -> Result<Setting, ServiceError> {
        let current = self.current(key).await?;
        if let Some(value) = &value {
            Self::check_value(&current, value)?;
        }
        if value.is_none() && label.is_none() {
            return Ok(current);
        }

        self.commands
            .update(
                key,
                value.clone(),
                label,
                Self::record(AuditAction::Update, principal, client)
                    .resource_id(current.id)
                    .detail(json!({ "key": key, "old": current.value, "new": value })),
            )
            .await
            .or_not_found("setting")
    }

    async fn batch_update(
        &self,
        principal: &Principal,
        values: Vec<(String, String)>,
        client: &ClientInfo,
    ) -> Result<Vec<Setting>, ServiceError> {
        if values.is_empty() {
            return Err(ServiceError::validation("settings must not be empty"));
        }

        let mut seen = HashSet::with_capacity(values.len());
        for (key, value) in &values {
            if !seen.insert(key.as_str()) {
                return Err(ServiceError::validation(format!(
                    "{key} appears more than once"
                )));
            }
            let current = self.current(key).await?;
            Self::check_value(&current, value)?;
        }

        let keys: Vec<&str> = values.iter().map(|(k, _)| k.as_str()).collect();
        let detail = json!({ "keys": keys });
        self.commands
            .batch_update(
                values,
                Self::record(AuditAction::Update, principal, client).detail(detail),
            )
            .await
            .or_not_found("setting")
    }

    async fn delete(
        &self,
        principal: &Principal,
        key: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let current = self.current(key).await?;
        self.commands
            .delete(
                key,
                Self::record(AuditAction::Delete, principal, client)
                    .resource_id(current.id)
                    .detail(json!({ "key": key })),
            )
            .await
            .or_not_found("setting")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_keys() {
        assert!(key_regex().is_match("site.name"));
        assert!(key_regex().is_match("session_timeout"));
        assert!(!key_regex().is_match("Site"));
        assert!(!key_regex().is_match("9lives"));
        assert!(!key_regex().is_match("a b"));
        assert!(!key_regex().is_match(""));
    }
}
