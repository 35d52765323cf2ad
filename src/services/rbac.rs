//! Expands role ids into the permission set checked by route guards.
//!
//! Nothing is cached here. The authentication middleware expands once per
//! request and shares the result through the [`Principal`], so a role or
//! permission change is visible to the very next request.
//!
//! [`Principal`]: crate::domain::Principal

use std::sync::Arc;

use crate::db::repositories::{RepoResult, RoleQueryRepository};
use crate::domain::{PermissionSet, Role};

pub struct PermissionEvaluator {
    roles: Arc<dyn RoleQueryRepository>,
}

impl PermissionEvaluator {
    #[must_use]
    pub fn new(roles: Arc<dyn RoleQueryRepository>) -> Self {
        Self { roles }
    }

    /// Grants held through `role_ids`. No roles means no permissions.
    pub async fn expand(&self, role_ids: &[i64]) -> RepoResult<PermissionSet> {
        if role_ids.is_empty() {
            return Ok(PermissionSet::default());
        }
        let codes = self.roles.permission_codes(role_ids).await?;
        Ok(PermissionSet::new(codes))
    }

    /// Live roles of a user together with the grants they carry.
    pub async fn for_user(&self, user_id: i64) -> RepoResult<(Vec<Role>, Arc<PermissionSet>)> {
        let roles = self.roles.roles_of_user(user_id).await?;
        let ids: Vec<i64> = roles.iter().map(|r| r.id).collect();
        let permissions = self.expand(&ids).await?;
        Ok((roles, Arc::new(permissions)))
    }
}
