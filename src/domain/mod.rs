//! Domain types shared by repositories, services and the HTTP layer.

pub mod audit;
pub mod menu;
pub mod pat;
pub mod permission;
pub mod principal;
pub mod role;
pub mod setting;
pub mod user;

pub use audit::{
    AuditAction, AuditEntry, AuditFilter, AuditRecord, AuditResource, AuditStatus, ClientInfo,
};
pub use menu::{Menu, MenuChanges, MenuNode, MenuOrder, NewMenu};
pub use pat::{NewPersonalAccessToken, PatStatus, PersonalAccessToken};
pub use permission::PermissionSet;
pub use principal::{CredentialKind, Principal};
pub use role::{NewRole, Permission, Role, RoleChanges};
pub use setting::{NewSetting, Setting, SettingCategory, SettingValueType};
pub use user::{NewUser, User, UserChanges, UserFilter, UserStatus, UserWithRoles};

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u64 = 20;
pub const MAX_PER_PAGE: u64 = 100;

/// One-based page request, clamped to `1..=MAX_PER_PAGE` items per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    #[must_use]
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        }
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
        }
    }

    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.per_page)
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_defaults_and_clamps() {
        let req = PageRequest::new(None, None);
        assert_eq!((req.page, req.per_page), (1, 20));

        let req = PageRequest::new(Some(0), Some(500));
        assert_eq!((req.page, req.per_page), (1, 100));
        assert_eq!(PageRequest::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn page_meta() {
        let page = Page::new(vec![1, 2], 41, PageRequest::new(Some(2), Some(20)));
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_more());

        let last = Page::new(vec![1], 41, PageRequest::new(Some(3), Some(20)));
        assert!(!last.has_more());

        let empty: Page<i32> = Page::new(vec![], 0, PageRequest::default());
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_more());
    }
}
