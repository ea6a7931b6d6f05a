use anyhow::{Context, Result};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::client::ApiClient;
use crate::model::{FolderDetail, FolderSummary, Grants, Page, Workspace, WorkspaceRelation};

static NO_GRANTS: Grants = Grants {
    permissions: BTreeMap::new(),
    user_group_permissions: BTreeMap::new(),
};

#[derive(Debug, Clone)]
pub struct WorkspaceNode<'a> {
    pub workspace: &'a Workspace,
    pub children: Vec<WorkspaceNode<'a>>,
}

impl<'a> WorkspaceNode<'a> {
    /// Depth-first search over this node and its descendants.
    pub fn any(&self, pred: &impl Fn(&Workspace) -> bool) -> bool {
        pred(self.workspace) || self.children.iter().any(|c| c.any(pred))
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceTree<'a> {
    pub roots: Vec<WorkspaceNode<'a>>,
}

#[derive(Debug, Clone)]
pub struct FolderNode<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub detail: Option<&'a FolderDetail>,
    pub workspaces: Vec<&'a Workspace>,
    pub children: Vec<FolderNode<'a>>,
}

impl<'a> FolderNode<'a> {
    pub fn grants(&self) -> &'a Grants {
        self.detail.map_or(&NO_GRANTS, |d| &d.embedded.grants)
    }

    /// This folder and every sub-folder, parents first.
    pub fn walk(&self) -> Vec<&FolderNode<'a>> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct FolderTree<'a> {
    pub folders: Vec<FolderNode<'a>>,
    /// Workspaces that belong to no reachable folder.
    pub unfiled: Vec<&'a Workspace>,
}

impl<'a> FolderTree<'a> {
    pub fn all_folders(&self) -> Vec<&FolderNode<'a>> {
        self.folders.iter().flat_map(FolderNode::walk).collect()
    }
}

pub fn fetch_relations(client: &ApiClient) -> Result<Vec<WorkspaceRelation>> {
    let page: Page<WorkspaceRelation> = client
        .post_json("/api/workspaces/workspace-relations/search", &[], Some(&json!({})))?
        .decode()
        .context("decoding workspace relations")?;
    Ok(page.items)
}

pub fn fetch_folders(client: &ApiClient) -> Result<(Vec<FolderSummary>, Vec<FolderDetail>)> {
    let summaries: Vec<FolderSummary> = client
        .fetch_all_pages("/api/workspaces/groups/search", &json!({}))
        .context("searching folders")?;
    let details: Vec<FolderDetail> = client
        .post_json("/api/workspaces/groups/list", &[], Some(&json!({})))?
        .decode::<Option<Vec<FolderDetail>>>()
        .context("decoding folder list")?
        .unwrap_or_default();
    tracing::debug!(folders = summaries.len(), details = details.len(), "fetched folders");
    Ok((summaries, details))
}

pub fn build_workspace_tree<'a>(
    workspaces: &'a [Workspace],
    relations: &[WorkspaceRelation],
) -> WorkspaceTree<'a> {
    let by_id: HashMap<&str, &Workspace> =
        workspaces.iter().map(|w| (w.id.as_str(), w)).collect();

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_parent: HashSet<&str> = HashSet::new();

    for relation in relations {
        let (Some(parent), Some(child)) = (relation.parent_id.as_deref(), relation.child_id.as_deref())
        else {
            continue;
        };
        let (Some(&parent), Some(&child)) = (by_id.get(parent), by_id.get(child)) else {
            tracing::debug!("skipping relation {parent} -> {child}: unknown workspace");
            continue;
        };
        children
            .entry(parent.id.as_str())
            .or_default()
            .push(child.id.as_str());
        has_parent.insert(child.id.as_str());
    }

    fn build<'a>(
        id: &str,
        by_id: &HashMap<&str, &'a Workspace>,
        children: &HashMap<&str, Vec<&str>>,
        path: &mut Vec<String>,
    ) -> Option<WorkspaceNode<'a>> {
        let workspace = *by_id.get(id)?;
        if path.iter().any(|p| p == id) {
            return Some(WorkspaceNode {
                workspace,
                children: Vec::new(),
            });
        }

        path.push(id.to_string());
        let kids = children
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|child| build(child, by_id, children, path))
                    .collect()
            })
            .unwrap_or_default();
        path.pop();

        Some(WorkspaceNode {
            workspace,
            children: kids,
        })
    }

    let mut path = Vec::new();
    let roots = workspaces
        .iter()
        .filter(|w| !has_parent.contains(w.id.as_str()))
        .filter_map(|w| build(&w.id, &by_id, &children, &mut path))
        .collect();

    WorkspaceTree { roots }
}

pub fn build_folder_tree<'a>(
    workspaces: &'a [Workspace],
    folders: &'a [FolderSummary],
    details: &'a [FolderDetail],
) -> FolderTree<'a> {
    let workspace_by_id: HashMap<&str, &Workspace> =
        workspaces.iter().map(|w| (w.id.as_str(), w)).collect();
    let detail_by_id: HashMap<&str, &FolderDetail> =
        details.iter().map(|d| (d.id.as_str(), d)).collect();
    let known: HashSet<&str> = folders.iter().map(|f| f.id.as_str()).collect();

    let mut sub_folders: HashMap<&str, Vec<&FolderSummary>> = HashMap::new();
    let mut roots: Vec<&FolderSummary> = Vec::new();
    for folder in folders {
        match folder.parent_id.as_deref() {
            Some(parent) if known.contains(parent) => {
                sub_folders.entry(parent).or_default().push(folder)
            }
            _ => roots.push(folder),
        }
    }

    struct Ctx<'a, 'm> {
        workspace_by_id: &'m HashMap<&'a str, &'a Workspace>,
        detail_by_id: &'m HashMap<&'a str, &'a FolderDetail>,
        sub_folders: &'m HashMap<&'a str, Vec<&'a FolderSummary>>,
    }

    fn build<'a>(
        folder: &'a FolderSummary,
        ctx: &Ctx<'a, '_>,
        path: &mut Vec<&'a str>,
        placed: &mut HashSet<&'a str>,
    ) -> FolderNode<'a> {
        let detail = ctx.detail_by_id.get(folder.id.as_str()).copied();
        let name = folder
            .name
            .as_deref()
            .or_else(|| detail.and_then(|d| d.name.as_deref()))
            .unwrap_or("Unnamed");

        let workspaces: Vec<&Workspace> = detail
            .map(|d| {
                d.embedded
                    .workspaces
                    .iter()
                    .filter_map(|r| ctx.workspace_by_id.get(r.id.as_str()).copied())
                    .collect()
            })
            .unwrap_or_default();
        placed.extend(workspaces.iter().map(|&w| w.id.as_str()));

        let mut node = FolderNode {
            id: &folder.id,
            name,
            detail,
            workspaces,
            children: Vec::new(),
        };

        if path.contains(&folder.id.as_str()) {
            return node;
        }

        path.push(&folder.id);
        if let Some(subs) = ctx.sub_folders.get(folder.id.as_str()) {
            node.children = subs
                .iter()
                .map(|&sub| build(sub, ctx, path, placed))
                .collect();
        }
        path.pop();
        node
    }

    let ctx = Ctx {
        workspace_by_id: &workspace_by_id,
        detail_by_id: &detail_by_id,
        sub_folders: &sub_folders,
    };
    let mut path = Vec::new();
    let mut placed = HashSet::new();
    let tree_roots: Vec<FolderNode<'a>> = roots
        .into_iter()
        .map(|f| build(f, &ctx, &mut path, &mut placed))
        .collect();

    let unfiled = workspaces
        .iter()
        .filter(|w| !placed.contains(w.id.as_str()))
        .collect();

    FolderTree {
        folders: tree_roots,
        unfiled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::workspaces_json;
    use httpmock::prelude::*;

    fn workspaces() -> Vec<Workspace> {
        serde_json::from_value(workspaces_json()).unwrap()
    }

    fn relation(parent: &str, child: &str) -> WorkspaceRelation {
        WorkspaceRelation {
            parent_id: Some(parent.into()),
            child_id: Some(child.into()),
        }
    }

    fn names(nodes: &[WorkspaceNode<'_>]) -> Vec<String> {
        nodes.iter().map(|n| n.workspace.id.clone()).collect()
    }

    #[test]
    fn roots_keep_input_order_and_children_follow_relations() {
        let ws = workspaces();
        let tree = build_workspace_tree(
            &ws,
            &[relation("ws-okr-1", "ws-okr-2"), relation("ws-okr-1", "ws-prod-2")],
        );

        assert_eq!(names(&tree.roots), ["ws-okr-1", "ws-prod-1"]);
        assert_eq!(names(&tree.roots[0].children), ["ws-okr-2", "ws-prod-2"]);
        assert!(tree.roots[0].any(&|w| w.id == "ws-prod-2"));
        assert!(!tree.roots[1].any(&|w| w.id == "ws-okr-2"));
    }

    #[test]
    fn ignores_relations_to_unknown_workspaces() {
        let ws = workspaces();
        let tree = build_workspace_tree(
            &ws,
            &[
                relation("ghost", "ws-okr-2"),
                WorkspaceRelation {
                    parent_id: None,
                    child_id: Some("ws-prod-1".into()),
                },
            ],
        );
        assert_eq!(tree.roots.len(), 4);
    }

    #[test]
    fn cuts_cycles() {
        let ws = workspaces();
        let tree = build_workspace_tree(
            &ws,
            &[
                relation("ws-okr-1", "ws-okr-2"),
                relation("ws-okr-2", "ws-prod-1"),
                relation("ws-prod-1", "ws-okr-2"),
            ],
        );

        let okr2 = &tree.roots[0].children[0];
        let prod1 = &okr2.children[0];
        assert_eq!(prod1.workspace.id, "ws-prod-1");
        assert_eq!(prod1.children[0].workspace.id, "ws-okr-2");
        assert!(prod1.children[0].children.is_empty());
    }

    fn folders() -> (Vec<FolderSummary>, Vec<FolderDetail>) {
        let summaries = serde_json::from_value(serde_json::json!([
            {"id": "folder-1", "name": "Main Folder", "parentId": null},
            {"id": "folder-2", "name": "Sub Folder", "parentId": "folder-1"},
            {"id": "folder-3", "name": "Stray", "parentId": "folder-gone"}
        ]))
        .unwrap();
        let details = serde_json::from_value(serde_json::json!([
            {"id": "folder-1", "name": "Main Folder", "_embedded": {
                "workspaces": [{"id": "ws-prod-1"}, {"id": "ws-unknown"}],
                "permissions": {},
                "userGroupPermissions": {"grp-prodmgt-cms-f-u": "full"}
            }},
            {"id": "folder-2", "name": "Sub Folder", "_embedded": {
                "workspaces": [{"id": "ws-prod-2"}],
                "permissions": {"user-4": "write"},
                "userGroupPermissions": {}
            }}
        ]))
        .unwrap();
        (summaries, details)
    }

    #[test]
    fn nests_folders_and_collects_unfiled_workspaces() {
        let ws = workspaces();
        let (summaries, details) = folders();
        let tree = build_folder_tree(&ws, &summaries, &details);

        let roots: Vec<&str> = tree.folders.iter().map(|f| f.id).collect();
        assert_eq!(roots, ["folder-1", "folder-3"]);

        let main = &tree.folders[0];
        assert_eq!(main.workspaces.len(), 1);
        assert_eq!(main.children[0].name, "Sub Folder");
        assert_eq!(main.children[0].workspaces[0].id, "ws-prod-2");
        assert_eq!(main.children[0].grants().permissions.len(), 1);
        assert!(tree.folders[1].grants().permissions.is_empty());

        let unfiled: Vec<&str> = tree.unfiled.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(unfiled, ["ws-okr-1", "ws-okr-2"]);
        assert_eq!(tree.all_folders().len(), 3);
    }

    #[test]
    fn fetches_relations_and_folders() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/workspaces/workspace-relations/search");
            then.status(200).json_body(serde_json::json!({
                "items": [{"parentId": "ws-okr-1", "childId": "ws-okr-2"}]
            }));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/workspaces/groups/search");
            then.status(200).json_body(serde_json::json!({
                "items": [{"id": "folder-1", "name": "Main Folder"}],
                "totalItems": 1
            }));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/workspaces/groups/list");
            then.status(200)
                .json_body(serde_json::json!([{"id": "folder-1", "_embedded": null}]));
        });

        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let relations = fetch_relations(&client).unwrap();
        assert_eq!(relations[0].child_id.as_deref(), Some("ws-okr-2"));

        let (summaries, details) = fetch_folders(&client).unwrap();
        assert_eq!(summaries[0].name.as_deref(), Some("Main Folder"));
        assert!(details[0].embedded.workspaces.is_empty());
    }
}
