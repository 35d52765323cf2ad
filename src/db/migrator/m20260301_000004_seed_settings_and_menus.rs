use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::entities::{menus, settings};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// `(key, value, category, value_type, label)`
const DEFAULT_SETTINGS: &[(&str, &str, &str, &str, &str)] = &[
    ("general.site_name", "", "general", "string", "Site name"),
    ("general.site_url", "", "general", "string", "Site URL"),
    ("general.admin_email", "", "general", "string", "Administrator email"),
    ("general.timezone", "UTC", "general", "string", "Timezone"),
    ("general.language", "en-US", "general", "string", "Language"),
    ("general.theme", "light", "general", "string", "Theme"),
    ("security.session_timeout", "30", "security", "number", "Session timeout (minutes)"),
    ("security.password_min_length", "8", "security", "number", "Minimum password length"),
    ("security.enable_twofa", "false", "security", "boolean", "Require two-factor authentication"),
    ("security.max_login_attempts", "5", "security", "number", "Maximum login attempts"),
    ("notification.enable_notifications", "true", "notification", "boolean", "Enable system notifications"),
    ("notification.enable_email", "true", "notification", "boolean", "Enable email notifications"),
    ("notification.enable_sms", "false", "notification", "boolean", "Enable SMS notifications"),
    ("backup.enable_backup", "false", "backup", "boolean", "Enable automatic backups"),
    ("backup.backup_frequency", "24", "backup", "number", "Backup frequency (hours)"),
    ("backup.retention_days", "30", "backup", "number", "Backup retention (days)"),
];

/// `(title, path, icon, sort_order)` under the "System" root.
const SYSTEM_MENUS: &[(&str, &str, &str, i32)] = &[
    ("Users", "/system/users", "users", 1),
    ("Roles", "/system/roles", "shield", 2),
    ("Permissions", "/system/permissions", "key", 3),
    ("Menus", "/system/menus", "menu", 4),
    ("Settings", "/system/settings", "settings", 5),
    ("Audit Logs", "/system/audit-logs", "file-text", 6),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let now = chrono::Utc::now();

        settings::Entity::insert_many(DEFAULT_SETTINGS.iter().map(
            |(key, value, category, value_type, label)| settings::ActiveModel {
                key: Set((*key).to_string()),
                value: Set((*value).to_string()),
                category: Set((*category).to_string()),
                value_type: Set((*value_type).to_string()),
                label: Set((*label).to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            },
        ))
        .exec_without_returning(db)
        .await?;

        menus::ActiveModel {
            title: Set("Dashboard".to_string()),
            path: Set("/dashboard".to_string()),
            icon: Set(Some("layout-dashboard".to_string())),
            parent_id: Set(None),
            sort_order: Set(0),
            visible: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        let system = menus::ActiveModel {
            title: Set("System".to_string()),
            path: Set("/system".to_string()),
            icon: Set(Some("cog".to_string())),
            parent_id: Set(None),
            sort_order: Set(1),
            visible: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        menus::Entity::insert_many(SYSTEM_MENUS.iter().map(|(title, path, icon, sort_order)| {
            menus::ActiveModel {
                title: Set((*title).to_string()),
                path: Set((*path).to_string()),
                icon: Set(Some((*icon).to_string())),
                parent_id: Set(Some(system.id)),
                sort_order: Set(*sort_order),
                visible: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
        }))
        .exec_without_returning(db)
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        menus::Entity::delete_many().exec(db).await?;
        settings::Entity::delete_many().exec(db).await?;
        Ok(())
    }
}
