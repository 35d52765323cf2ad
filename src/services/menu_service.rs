//! Domain service for the navigation menu tree.

use crate::domain::{ClientInfo, Menu, MenuChanges, MenuNode, MenuOrder, NewMenu, Principal};
use crate::services::error::ServiceError;

#[async_trait::async_trait]
pub trait MenuService: Send + Sync {
    /// Returns every menu arranged as a forest, siblings by `sort_order`.
    async fn tree(&self) -> Result<Vec<MenuNode>, ServiceError>;

    async fn get(&self, id: i64) -> Result<Menu, ServiceError>;

    /// Creates a menu.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when `parent_id` names a menu that does not exist.
    async fn create(
        &self,
        principal: &Principal,
        menu: NewMenu,
        client: &ClientInfo,
    ) -> Result<Menu, ServiceError>;

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the new parent is the menu itself or one of
    /// its descendants.
    async fn update(
        &self,
        principal: &Principal,
        id: i64,
        changes: MenuChanges,
        client: &ClientInfo,
    ) -> Result<Menu, ServiceError>;

    /// Deletes a leaf menu. Menus with children are refused with `Conflict`.
    async fn delete(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError>;

    /// Moves and re-sorts several menus in one transaction.
    async fn reorder(
        &self,
        principal: &Principal,
        items: Vec<MenuOrder>,
        client: &ClientInfo,
    ) -> Result<Vec<MenuNode>, ServiceError>;
}
