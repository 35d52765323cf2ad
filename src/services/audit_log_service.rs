//! Read side of the audit trail.

use std::sync::Arc;

use crate::db::repositories::{AuditLogQueryRepository, Repositories};
use crate::domain::{AuditEntry, AuditFilter, Page, PageRequest};
use crate::services::error::{NotFoundExt, ServiceError};

pub struct AuditLogService {
    logs: Arc<dyn AuditLogQueryRepository>,
}

impl AuditLogService {
    #[must_use]
    pub fn new(repos: &Repositories) -> Self {
        Self {
            logs: repos.audit_logs.clone(),
        }
    }

    /// Lists entries newest first.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when `start_date` is after `end_date`.
    pub async fn list(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> Result<Page<AuditEntry>, ServiceError> {
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date)
            && start > end
        {
            return Err(ServiceError::validation(
                "start_date must not be after end_date",
            ));
        }
        Ok(self.logs.list(filter, page).await?)
    }

    pub async fn get(&self, id: i64) -> Result<AuditEntry, ServiceError> {
        self.logs.find_by_id(id).await.or_not_found("audit log")
    }
}
