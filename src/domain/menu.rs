//! Navigation menu items stored as flat `(id, parent_id)` rows and
//! rebuilt into a tree on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Menu {
    pub id: i64,
    pub title: String,
    pub path: String,
    pub icon: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: i32,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMenu {
    pub title: String,
    pub path: String,
    pub icon: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: i32,
    pub visible: bool,
}

/// Partial update. `parent_id: Some(None)` moves the menu to the root.
#[derive(Debug, Clone, Default)]
pub struct MenuChanges {
    pub title: Option<String>,
    pub path: Option<String>,
    pub icon: Option<Option<String>>,
    pub parent_id: Option<Option<i64>>,
    pub sort_order: Option<i32>,
    pub visible: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MenuOrder {
    pub id: i64,
    pub sort_order: i32,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuNode {
    #[serde(flatten)]
    pub menu: Menu,
    pub children: Vec<MenuNode>,
}

/// Builds the menu forest from flat rows. Siblings are ordered by
/// `(sort_order, id)`; rows whose parent is missing become roots.
#[must_use]
pub fn build_tree(menus: Vec<Menu>) -> Vec<MenuNode> {
    let known: std::collections::HashSet<i64> = menus.iter().map(|m| m.id).collect();
    let mut by_parent: HashMap<Option<i64>, Vec<Menu>> = HashMap::new();

    for menu in menus {
        let parent = menu.parent_id.filter(|p| known.contains(p) && *p != menu.id);
        by_parent.entry(parent).or_default().push(menu);
    }

    attach(None, &mut by_parent)
}

fn attach(parent: Option<i64>, by_parent: &mut HashMap<Option<i64>, Vec<Menu>>) -> Vec<MenuNode> {
    let mut level = by_parent.remove(&parent).unwrap_or_default();
    level.sort_by_key(|m| (m.sort_order, m.id));

    level
        .into_iter()
        .map(|menu| {
            let children = attach(Some(menu.id), by_parent);
            MenuNode { menu, children }
        })
        .collect()
}

/// True when giving `id` the parent `new_parent` would close a loop, given
/// the current `parent_of` links. Covers the self-parent case.
#[must_use]
pub fn creates_cycle(parent_of: &HashMap<i64, Option<i64>>, id: i64, new_parent: i64) -> bool {
    let mut cursor = Some(new_parent);
    let mut hops = 0usize;

    while let Some(current) = cursor {
        if current == id {
            return true;
        }
        hops += 1;
        if hops > parent_of.len() {
            // Already cyclic data; refuse rather than loop.
            return true;
        }
        cursor = parent_of.get(&current).copied().flatten();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu(id: i64, parent_id: Option<i64>, sort_order: i32) -> Menu {
        Menu {
            id,
            title: format!("m{id}"),
            path: format!("/m{id}"),
            icon: None,
            parent_id,
            sort_order,
            visible: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn builds_ordered_tree() {
        let tree = build_tree(vec![
            menu(1, None, 2),
            menu(2, None, 1),
            menu(3, Some(1), 5),
            menu(4, Some(1), 0),
            menu(5, Some(4), 0),
        ]);

        assert_eq!(tree.iter().map(|n| n.menu.id).collect::<Vec<_>>(), [2, 1]);
        let children: Vec<_> = tree[1].children.iter().map(|n| n.menu.id).collect();
        assert_eq!(children, [4, 3]);
        assert_eq!(tree[1].children[0].children[0].menu.id, 5);
    }

    #[test]
    fn orphans_become_roots() {
        let tree = build_tree(vec![menu(1, Some(99), 0), menu(2, None, 1)]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn detects_cycles() {
        let parent_of: HashMap<i64, Option<i64>> =
            [(1, None), (2, Some(1)), (3, Some(2))].into_iter().collect();

        assert!(creates_cycle(&parent_of, 1, 1));
        assert!(creates_cycle(&parent_of, 1, 3));
        assert!(!creates_cycle(&parent_of, 3, 1));
        assert!(!creates_cycle(&parent_of, 2, 1));
    }
}
