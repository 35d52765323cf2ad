use argon2::Params;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::crypto::password::hash_with_params;
use crate::domain::permission::split_code;
use crate::entities::{permissions, role_permissions, roles, user_roles, users};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Permission codes guarding every protected route.
pub const SEED_PERMISSIONS: &[(&str, &str)] = &[
    ("admin:users:create", "Create users"),
    ("admin:users:read", "View users"),
    ("admin:users:update", "Update users and their roles"),
    ("admin:users:delete", "Delete users"),
    ("admin:roles:create", "Create roles"),
    ("admin:roles:read", "View roles"),
    ("admin:roles:update", "Update roles and their permissions"),
    ("admin:roles:delete", "Delete roles"),
    ("admin:permissions:create", "Create permissions"),
    ("admin:permissions:read", "View permissions"),
    ("admin:permissions:delete", "Delete permissions"),
    ("admin:audit_logs:read", "View audit logs"),
    ("admin:menus:create", "Create menus"),
    ("admin:menus:read", "View menus"),
    ("admin:menus:update", "Update and reorder menus"),
    ("admin:menus:delete", "Delete menus"),
    ("admin:settings:create", "Create settings"),
    ("admin:settings:read", "View settings"),
    ("admin:settings:update", "Update settings"),
    ("admin:settings:delete", "Delete settings"),
    ("admin:overview:read", "View system overview and metrics"),
    ("admin:pat:revoke", "Revoke other users' access tokens"),
    ("user:profile:read", "View own profile"),
    ("user:profile:update", "Update own profile"),
    ("user:profile:delete", "Delete own account"),
    ("user:password:update", "Change own password"),
    ("user:2fa:manage", "Manage own two-factor authentication"),
    ("user:tokens:create", "Create own access tokens"),
    ("user:tokens:read", "View own access tokens"),
    ("user:tokens:update", "Enable or disable own access tokens"),
    ("user:tokens:delete", "Delete own access tokens"),
];

const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "admin123";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let now = chrono::Utc::now();

        let mut seeded = Vec::with_capacity(SEED_PERMISSIONS.len());
        for (code, description) in SEED_PERMISSIONS {
            let (resource, action) = split_code(code);
            let model = permissions::ActiveModel {
                code: Set((*code).to_string()),
                resource: Set(resource),
                action: Set(action),
                description: Set((*description).to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                deleted_at: Set(None),
                ..Default::default()
            }
            .insert(db)
            .await?;
            seeded.push((*code, model.id));
        }

        let admin_role = roles::ActiveModel {
            name: Set("admin".to_string()),
            display_name: Set("Administrator".to_string()),
            description: Set("Full access to every administrative function".to_string()),
            is_system: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await?;

        let user_role = roles::ActiveModel {
            name: Set("user".to_string()),
            display_name: Set("User".to_string()),
            description: Set("Self-service access to one's own account".to_string()),
            is_system: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await?;

        role_permissions::Entity::insert_many(seeded.iter().map(|(_, permission_id)| {
            role_permissions::ActiveModel {
                role_id: Set(admin_role.id),
                permission_id: Set(*permission_id),
            }
        }))
        .exec_without_returning(db)
        .await?;

        role_permissions::Entity::insert_many(
            seeded
                .iter()
                .filter(|(code, _)| code.starts_with("user:"))
                .map(|(_, permission_id)| role_permissions::ActiveModel {
                    role_id: Set(user_role.id),
                    permission_id: Set(*permission_id),
                }),
        )
        .exec_without_returning(db)
        .await?;

        let password_hash = hash_with_params(ADMIN_PASSWORD, Params::default())
            .map_err(|e| DbErr::Custom(e.to_string()))?;

        let admin = users::ActiveModel {
            username: Set(ADMIN_USERNAME.to_string()),
            email: Set("admin@example.com".to_string()),
            password_hash: Set(password_hash),
            full_name: Set("Administrator".to_string()),
            avatar: Set(None),
            bio: Set(None),
            status: Set("active".to_string()),
            totp_secret: Set(None),
            totp_enabled: Set(false),
            totp_recovery_hashes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await?;

        user_roles::Entity::insert(user_roles::ActiveModel {
            user_id: Set(admin.id),
            role_id: Set(admin_role.id),
        })
        .exec_without_returning(db)
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        user_roles::Entity::delete_many().exec(db).await?;
        role_permissions::Entity::delete_many().exec(db).await?;
        users::Entity::delete_many().exec(db).await?;
        roles::Entity::delete_many().exec(db).await?;
        permissions::Entity::delete_many().exec(db).await?;
        Ok(())
    }
}
