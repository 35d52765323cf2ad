use serde::Serialize;
use std::sync::Arc;

use super::permission::PermissionSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Access token from an interactive login.
    Session,
    PersonalAccessToken,
}

/// The authenticated identity attached to a request.
///
/// `permissions` is expanded once when the request is authenticated and
/// shared by every authorization check made while serving it.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub role_ids: Vec<i64>,
    pub permissions: Arc<PermissionSet>,
    pub credential: CredentialKind,
    /// Session id for session principals, PAT id for PAT bearers.
    pub credential_id: String,
}

impl Principal {
    #[must_use]
    pub fn has(&self, required: &str) -> bool {
        self.permissions.has(required)
    }

    #[must_use]
    pub const fn is_session(&self) -> bool {
        matches!(self.credential, CredentialKind::Session)
    }
}
