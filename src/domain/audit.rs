//! Audit trail records. Entries are append-only: application code creates
//! them and reads them, never updates or deletes them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use super::principal::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    Register,
    Refresh,
    Authenticate,
    Enable,
    Disable,
    ChangePassword,
    AssignRoles,
    SetPermissions,
    Reorder,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Register => "register",
            Self::Refresh => "refresh",
            Self::Authenticate => "authenticate",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::ChangePassword => "change_password",
            Self::AssignRoles => "assign_roles",
            Self::SetPermissions => "set_permissions",
            Self::Reorder => "reorder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResource {
    User,
    Role,
    Permission,
    Menu,
    Setting,
    Session,
    Token,
    TwoFactor,
}

impl AuditResource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Role => "role",
            Self::Permission => "permission",
            Self::Menu => "menu",
            Self::Setting => "setting",
            Self::Session => "session",
            Self::Token => "token",
            Self::TwoFactor => "two_factor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Where a request came from, as far as the server can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// An audit entry about to be written.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub occurred_at: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,
    pub status: AuditStatus,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub detail: Option<Value>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(action: AuditAction, resource: AuditResource) -> Self {
        Self {
            occurred_at: Utc::now(),
            user_id: None,
            username: None,
            action,
            resource,
            resource_id: None,
            status: AuditStatus::Success,
            ip: None,
            user_agent: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn actor(mut self, user_id: i64, username: &str) -> Self {
        self.user_id = Some(user_id);
        self.username = Some(username.to_string());
        self
    }

    #[must_use]
    pub fn by(self, principal: &Principal) -> Self {
        self.actor(principal.user_id, &principal.username)
    }

    #[must_use]
    pub fn client(mut self, client: &ClientInfo) -> Self {
        self.ip.clone_from(&client.ip);
        self.user_agent.clone_from(&client.user_agent);
        self
    }

    #[must_use]
    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Marks the record failed with a short machine-readable reason.
    #[must_use]
    pub fn failure(mut self, reason: &str) -> Self {
        self.status = AuditStatus::Failure;
        match self.detail.as_mut().and_then(Value::as_object_mut) {
            Some(map) => {
                map.insert("reason".to_string(), Value::String(reason.to_string()));
            }
            None => self.detail = Some(json!({ "reason": reason })),
        }
        self
    }
}

/// A persisted audit entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub status: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user_id: Option<i64>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_merges_reason_into_detail() {
        let record = AuditRecord::new(AuditAction::Login, AuditResource::Session)
            .detail(json!({ "account": "admin" }))
            .failure("captcha_mismatch");

        assert_eq!(record.status, AuditStatus::Failure);
        assert_eq!(
            record.detail,
            Some(json!({ "account": "admin", "reason": "captcha_mismatch" }))
        );
    }

    #[test]
    fn optional_fields_stay_empty() {
        let record = AuditRecord::new(AuditAction::Create, AuditResource::Menu)
            .client(&ClientInfo::default());
        assert!(record.user_id.is_none());
        assert!(record.ip.is_none());
        assert!(record.detail.is_none());
    }
}
