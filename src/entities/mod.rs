pub mod audit_logs;
pub mod menus;
pub mod permissions;
pub mod personal_access_tokens;
pub mod role_permissions;
pub mod roles;
pub mod settings;
pub mod user_roles;
pub mod users;
