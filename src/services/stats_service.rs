//! Dashboard overview numbers.

use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::{
    AuditLogQueryRepository, MenuQueryRepository, PermissionQueryRepository, Repositories,
    RoleQueryRepository, UserQueryRepository,
};
use crate::domain::{AuditEntry, UserStatus};
use crate::services::error::ServiceError;

pub const DEFAULT_RECENT_LIMIT: u64 = 5;
const MAX_RECENT_LIMIT: u64 = 50;

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserCounts {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub banned: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub users: UserCounts,
    pub roles: u64,
    pub permissions: u64,
    pub menus: u64,
    pub recent_activity: Vec<AuditEntry>,
}

pub struct StatsService {
    users: Arc<dyn UserQueryRepository>,
    roles: Arc<dyn RoleQueryRepository>,
    permissions: Arc<dyn PermissionQueryRepository>,
    menus: Arc<dyn MenuQueryRepository>,
    logs: Arc<dyn AuditLogQueryRepository>,
}

impl StatsService {
    #[must_use]
    pub fn new(repos: &Repositories) -> Self {
        Self {
            users: repos.users.clone(),
            roles: repos.roles.clone(),
            permissions: repos.permissions.clone(),
            menus: repos.menus.clone(),
            logs: repos.audit_logs.clone(),
        }
    }

    pub async fn overview(&self, recent: Option<u64>) -> Result<Overview, ServiceError> {
        let limit = recent
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .clamp(1, MAX_RECENT_LIMIT);

        let (by_status, roles, permissions, menus, recent_activity) = tokio::try_join!(
            self.users.count_by_status(),
            self.roles.count(),
            self.permissions.count(),
            self.menus.count(),
            self.logs.recent(limit),
        )?;

        let mut users = UserCounts::default();
        for (status, count) in by_status {
            users.total += count;
            match status {
                UserStatus::Active => users.active = count,
                UserStatus::Inactive => users.inactive = count,
                UserStatus::Banned => users.banned = count,
            }
        }

        Ok(Overview {
            users,
            roles,
            permissions,
            menus,
            recent_activity,
        })
    }
}
