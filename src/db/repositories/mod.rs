//! Persistence contracts, split into command (mutating) and query (reading)
//! traits per aggregate, with their `SeaORM` and in-memory implementations.
//!
//! Command methods that change state take the [`AuditRecord`] describing the
//! change and persist it in the same transaction.
//!
//! [`AuditRecord`]: crate::domain::AuditRecord

use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod audit_log;
pub mod cache;
pub mod captcha;
pub mod error;
pub mod menu;
pub mod pat;
pub mod permission;
pub mod role;
pub mod setting;
pub mod user;

pub use audit_log::{AuditLogCommandRepository, AuditLogQueryRepository, SeaOrmAuditLogRepository};
pub use cache::{CacheRepository, MemoryCache};
pub use captcha::{CacheCaptchaRepository, CaptchaRepository};
pub use error::{RepoError, RepoResult};
pub use menu::{MenuCommandRepository, MenuQueryRepository, SeaOrmMenuRepository};
pub use pat::{PatCommandRepository, PatQueryRepository, SeaOrmPatRepository};
pub use permission::{
    PermissionCommandRepository, PermissionQueryRepository, SeaOrmPermissionRepository,
};
pub use role::{RoleCommandRepository, RoleQueryRepository, SeaOrmRoleRepository};
pub use setting::{SeaOrmSettingRepository, SettingCommandRepository, SettingQueryRepository};
pub use user::{SeaOrmUserRepository, UserCommandRepository, UserQueryRepository};

/// One instance of every repository, sharing the connection pool.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<SeaOrmUserRepository>,
    pub roles: Arc<SeaOrmRoleRepository>,
    pub permissions: Arc<SeaOrmPermissionRepository>,
    pub pats: Arc<SeaOrmPatRepository>,
    pub menus: Arc<SeaOrmMenuRepository>,
    pub settings: Arc<SeaOrmSettingRepository>,
    pub audit_logs: Arc<SeaOrmAuditLogRepository>,
    pub cache: Arc<MemoryCache>,
    pub captcha: Arc<CacheCaptchaRepository>,
}

impl Repositories {
    #[must_use]
    pub fn new(conn: &DatabaseConnection) -> Self {
        let cache = Arc::new(MemoryCache::new());
        Self {
            users: Arc::new(SeaOrmUserRepository::new(conn.clone())),
            roles: Arc::new(SeaOrmRoleRepository::new(conn.clone())),
            permissions: Arc::new(SeaOrmPermissionRepository::new(conn.clone())),
            pats: Arc::new(SeaOrmPatRepository::new(conn.clone())),
            menus: Arc::new(SeaOrmMenuRepository::new(conn.clone())),
            settings: Arc::new(SeaOrmSettingRepository::new(conn.clone())),
            audit_logs: Arc::new(SeaOrmAuditLogRepository::new(conn.clone())),
            captcha: Arc::new(CacheCaptchaRepository::new(cache.clone())),
            cache,
        }
    }
}
