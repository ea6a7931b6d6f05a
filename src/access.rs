use std::collections::{BTreeMap, BTreeSet};

use crate::compliance::{OKR_GROUP_PREFIX, PRODMGT_GROUP_PREFIX};
use crate::hierarchy::{FolderNode, FolderTree};
use crate::model::{Permission, Role, Workspace};
use crate::registry::Registry;

/// Direct (non-group) grants per user.
#[derive(Debug, Clone, Default)]
pub struct AccessMap {
    workspaces: BTreeMap<String, Vec<String>>,
    folders: BTreeMap<String, Vec<String>>,
}

impl AccessMap {
    pub fn build(workspaces: &[Workspace], tree: &FolderTree<'_>) -> Self {
        let mut map = Self::default();
        for ws in workspaces {
            for user_id in ws.embedded.permissions.keys() {
                map.workspaces
                    .entry(user_id.clone())
                    .or_default()
                    .push(ws.id.clone());
            }
        }
        for folder in tree.all_folders() {
            for user_id in folder.grants().permissions.keys() {
                map.folders
                    .entry(user_id.clone())
                    .or_default()
                    .push(folder.id.to_string());
            }
        }
        map
    }

    pub fn workspace_ids(&self, user_id: &str) -> &[String] {
        self.workspaces
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn folder_ids(&self, user_id: &str) -> &[String] {
        self.folders
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_access(&self, user_id: &str) -> bool {
        !self.workspace_ids(user_id).is_empty() || !self.folder_ids(user_id).is_empty()
    }
}

/// Editors outside the OKR and product-management groups (comment-only
/// groups do not count).
pub fn editors_outside_groups(registry: &Registry) -> BTreeSet<String> {
    registry.users_not_in_groups(
        &[OKR_GROUP_PREFIX, PRODMGT_GROUP_PREFIX],
        Some("_C_U"),
        Some(&Role::Editor),
    )
}

/// Editors outside the groups that also hold no direct workspace or folder grant.
pub fn orphaned_users(registry: &Registry, access: &AccessMap) -> Vec<String> {
    editors_outside_groups(registry)
        .into_iter()
        .filter(|id| !access.has_access(id))
        .collect()
}

/// Folders and workspaces the user is granted directly, with the folders
/// leading to them shown without a permission.
pub fn user_hierarchy_lines(tree: &FolderTree<'_>, user_id: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for folder in &tree.folders {
        folder_lines(folder, user_id, 0, &mut lines);
    }
    for ws in &tree.unfiled {
        if let Some(perm) = ws.embedded.permissions.get(user_id) {
            lines.push(format!("{} ({})", ws.display_name(), label(perm)));
        }
    }
    lines
}

fn reachable(folder: &FolderNode<'_>, user_id: &str) -> bool {
    folder.grants().permissions.contains_key(user_id)
        || folder
            .workspaces
            .iter()
            .any(|w| w.embedded.permissions.contains_key(user_id))
        || folder.children.iter().any(|c| reachable(c, user_id))
}

fn folder_lines(folder: &FolderNode<'_>, user_id: &str, depth: usize, out: &mut Vec<String>) {
    if !reachable(folder, user_id) {
        return;
    }

    let indent = "..".repeat(depth);
    match folder.grants().permissions.get(user_id) {
        Some(perm) => out.push(format!("{indent}📁 {} ({})", folder.name, label(perm))),
        None => out.push(format!("{indent}📁 {}", folder.name)),
    }

    let ws_indent = "..".repeat(depth + 1);
    for ws in &folder.workspaces {
        if let Some(perm) = ws.embedded.permissions.get(user_id) {
            out.push(format!("{ws_indent}{} ({})", ws.display_name(), label(perm)));
        }
    }
    for child in &folder.children {
        folder_lines(child, user_id, depth + 1, out);
    }
}

/// Permission label, `Unknown` when the API sent an empty value.
fn label(perm: &Permission) -> &str {
    match perm.label() {
        "" => "Unknown",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::build_folder_tree;
    use crate::model::{FolderDetail, FolderSummary};
    use crate::registry::fixtures::registry;
    use serde_json::json;

    fn folders() -> (Vec<FolderSummary>, Vec<FolderDetail>) {
        let summaries = serde_json::from_value(json!([
            {"id": "folder-1", "name": "Main Folder"},
            {"id": "folder-2", "name": "Sub Folder", "parentId": "folder-1"}
        ]))
        .unwrap();
        let details = serde_json::from_value(json!([
            {"id": "folder-1", "_embedded": {"workspaces": [{"id": "ws-prod-1"}]}},
            {"id": "folder-2", "_embedded": {
                "workspaces": [{"id": "ws-prod-2"}],
                "permissions": {"user-4": "write"}
            }}
        ]))
        .unwrap();
        (summaries, details)
    }

    #[test]
    fn maps_direct_grants_per_user() {
        let reg = registry();
        let (summaries, details) = folders();
        let tree = build_folder_tree(reg.workspaces(), &summaries, &details);
        let access = AccessMap::build(reg.workspaces(), &tree);

        assert_eq!(access.workspace_ids("user-2"), ["ws-okr-1"]);
        assert_eq!(access.workspace_ids("user-3"), ["ws-prod-2"]);
        assert_eq!(access.folder_ids("user-4"), ["folder-2"]);
        assert!(!access.has_access("user-5"));
    }

    #[test]
    fn orphaned_users_have_no_access_at_all() {
        let reg = registry();
        let (summaries, details) = folders();
        let tree = build_folder_tree(reg.workspaces(), &summaries, &details);
        let access = AccessMap::build(reg.workspaces(), &tree);

        assert_eq!(orphaned_users(&reg, &access), ["user-5"]);
    }

    #[test]
    fn hierarchy_shows_path_to_granted_items() {
        let reg = registry();
        let (summaries, details) = folders();
        let tree = build_folder_tree(reg.workspaces(), &summaries, &details);

        assert_eq!(
            user_hierarchy_lines(&tree, "user-3"),
            ["📁 Main Folder", "..📁 Sub Folder", "....Portal Product (Write)"]
        );
        assert_eq!(
            user_hierarchy_lines(&tree, "user-4"),
            ["📁 Main Folder", "..📁 Sub Folder (Write)"]
        );
        assert_eq!(user_hierarchy_lines(&tree, "user-2"), ["OKR Main (Write)"]);
        assert!(user_hierarchy_lines(&tree, "user-5").is_empty());
    }
}
