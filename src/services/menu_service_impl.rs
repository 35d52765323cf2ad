//! `SeaORM`-backed implementation of the `MenuService` trait.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::db::repositories::{
    MenuCommandRepository, MenuQueryRepository, RepoError, Repositories,
};
use crate::domain::menu::{build_tree, creates_cycle};
use crate::domain::{
    AuditAction, AuditRecord, AuditResource, ClientInfo, Menu, MenuChanges, MenuNode, MenuOrder,
    NewMenu, Principal,
};
use crate::services::error::{NotFoundExt, ServiceError};
use crate::services::menu_service::MenuService;

const CYCLE_MESSAGE: &str = "cannot set a menu as its own parent or descendant";

pub struct SeaOrmMenuService {
    menus: Arc<dyn MenuQueryRepository>,
    commands: Arc<dyn MenuCommandRepository>,
}

impl SeaOrmMenuService {
    #[must_use]
    pub fn new(repos: &Repositories) -> Self {
        Self {
            menus: repos.menus.clone(),
            commands: repos.menus.clone(),
        }
    }

    async fn parent_links(&self) -> Result<HashMap<i64, Option<i64>>, ServiceError> {
        Ok(self
            .menus
            .list_all()
            .await?
            .into_iter()
            .map(|m| (m.id, m.parent_id))
            .collect())
    }

    fn record(action: AuditAction, principal: &Principal, client: &ClientInfo) -> AuditRecord {
        AuditRecord::new(action, AuditResource::Menu)
            .by(principal)
            .client(client)
    }

    fn check_fields(title: Option<&str>, path: Option<&str>) -> Result<(), ServiceError> {
        if title.is_some_and(|t| t.trim().is_empty()) {
            return Err(ServiceError::validation("title must not be empty"));
        }
        if path.is_some_and(|p| p.trim().is_empty()) {
            return Err(ServiceError::validation("path must not be empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl MenuService for SeaOrmMenuService {
    async fn tree(&self) -> Result<Vec<MenuNode>, ServiceError> {
        Ok(build_tree(self.menus.list_all().await?))
    }

    async fn get(&self, id: i64) -> Result<Menu, ServiceError> {
        self.menus.find_by_id(id).await.or_not_found("menu")
    }

    async fn create(
        &self,
        principal: &Principal,
        mut menu: NewMenu,
        client: &ClientInfo,
    ) -> Result<Menu, ServiceError> {
        Self::check_fields(Some(&menu.title), Some(&menu.path))?;
        menu.title = menu.title.trim().to_string();
        menu.path = menu.path.trim().to_string();

        let detail = json!({ "title": menu.title, "path": menu.path, "parent_id": menu.parent_id });
        self.commands
            .create(
                menu,
                Self::record(AuditAction::Create, principal, client).detail(detail),
            )
            .await
            .or_not_found("parent menu")
    }

    async fn update(
        &self,
        principal: &Principal,
        id: i64,
        changes: MenuChanges,
        client: &ClientInfo,
    ) -> Result<Menu, ServiceError> {
        Self::check_fields(changes.title.as_deref(), changes.path.as_deref())?;

        if let Some(Some(parent_id)) = changes.parent_id {
            let links = self.parent_links().await?;
            if !links.contains_key(&id) {
                return Err(ServiceError::not_found("menu"));
            }
            if creates_cycle(&links, id, parent_id) {
                return Err(ServiceError::validation(CYCLE_MESSAGE));
            }
        }

        let detail = json!({
            "title": changes.title,
            "path": changes.path,
            "parent_id": changes.parent_id,
            "sort_order": changes.sort_order,
            "visible": changes.visible,
        });
        let changes = MenuChanges {
            title: changes.title.map(|t| t.trim().to_string()),
            path: changes.path.map(|p| p.trim().to_string()),
            ..changes
        };

        match self
            .commands
            .update(
                id,
                changes,
                Self::record(AuditAction::Update, principal, client)
                    .resource_id(id)
                    .detail(detail),
            )
            .await
        {
            Ok(menu) => Ok(menu),
            Err(RepoError::NotFound) => {
                // Either the menu or its new parent vanished.
                self.menus.find_by_id(id).await.or_not_found("menu")?;
                Err(ServiceError::not_found("parent menu"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        self.commands
            .delete(
                id,
                Self::record(AuditAction::Delete, principal, client).resource_id(id),
            )
            .await
            .or_not_found("menu")
    }

    async fn reorder(
        &self,
        principal: &Principal,
        items: Vec<MenuOrder>,
        client: &ClientInfo,
    ) -> Result<Vec<MenuNode>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::validation("items must not be empty"));
        }
        let mut seen = HashSet::with_capacity(items.len());
        if let Some(dup) = items.iter().find(|item| !seen.insert(item.id)) {
            return Err(ServiceError::validation(format!(
                "menu {} appears more than once",
                dup.id
            )));
        }

        // Apply every move to a copy of the link table, then verify it is
        // still a forest.
        let mut links = self.parent_links().await?;
        for item in &items {
            if !links.contains_key(&item.id) {
                return Err(ServiceError::not_found("menu"));
            }
            if let Some(parent_id) = item.parent_id
                && !links.contains_key(&parent_id)
            {
                return Err(ServiceError::not_found("parent menu"));
            }
        }
        for item in &items {
            links.insert(item.id, item.parent_id);
        }
        for item in &items {
            if let Some(parent_id) = item.parent_id
                && creates_cycle(&links, item.id, parent_id)
            {
                return Err(ServiceError::validation(CYCLE_MESSAGE));
            }
        }

        self.commands
            .reorder(
                &items,
                Self::record(AuditAction::Reorder, principal, client)
                    .detail(json!({ "items": items.len() })),
            )
            .await
            .or_not_found("menu")?;

        self.tree().await
    }
}
