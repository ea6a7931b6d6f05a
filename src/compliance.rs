// afadmin - administration CLI for airfocus teams
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Access conventions for OKR and product-management workspaces.
//!
//! A node is assessed once into an [`Assessment`]; the report module only
//! decides which of its lines to print.

use serde::Serialize;

use crate::hierarchy::FolderNode;
use crate::model::{Grants, Permission, Workspace};
use crate::registry::Registry;
use crate::style::Tint;

pub const ADMIN_GROUP: &str = "Airfocus Admins";
pub const OKR_GROUP_PREFIX: &str = "SP_OKR_";
pub const PRODMGT_GROUP_PREFIX: &str = "SP_ProdMgt_";

const OKR_COLORS: [&str; 4] = ["yellow", "orange", "great", "blue"];

/// True when the namespace or item type mentions `okr`, in any case.
pub fn is_okr(workspace: &Workspace) -> bool {
    let mentions_okr = |s: &str| s.to_lowercase().contains("okr");
    workspace
        .namespace
        .as_ref()
        .is_some_and(|ns| mentions_okr(ns.as_str()))
        || workspace.item_type.as_deref().is_some_and(mentions_okr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSet {
    Okr,
    ProdMgt,
}

impl RuleSet {
    pub fn group_prefix(&self) -> &'static str {
        match self {
            RuleSet::Okr => OKR_GROUP_PREFIX,
            RuleSet::ProdMgt => PRODMGT_GROUP_PREFIX,
        }
    }

    fn required_for_suffix(&self, group_name: &str) -> Option<Permission> {
        match self {
            RuleSet::Okr if group_name.ends_with("_F") => Some(Permission::Full),
            RuleSet::Okr if group_name.ends_with("_W") => Some(Permission::Write),
            RuleSet::ProdMgt if group_name.ends_with("_F_U") => Some(Permission::Full),
            RuleSet::ProdMgt if group_name.ends_with("_W_U") => Some(Permission::Write),
            RuleSet::ProdMgt if group_name.ends_with("_C_U") => Some(Permission::Comment),
            _ => None,
        }
    }

    /// A group grant is wrong when the name is off-convention or the suffix
    /// demands a different permission.
    pub fn group_is_wrong(&self, group_name: &str, permission: &Permission) -> bool {
        if !group_name.starts_with(self.group_prefix()) && group_name != ADMIN_GROUP {
            return true;
        }
        self.required_for_suffix(group_name)
            .is_some_and(|required| &required != permission)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Workspace,
    Folder,
    /// Ancestor shown only to place its descendants.
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckField {
    #[serde(rename = "color")]
    Color,
    #[serde(rename = "itemKey")]
    ItemKey,
    #[serde(rename = "default")]
    Default,
}

impl CheckField {
    pub fn label(&self) -> &'static str {
        match self {
            CheckField::Color => "Color",
            CheckField::ItemKey => "Item Key",
            CheckField::Default => "Default",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub field: CheckField,
    pub value: String,
    pub wrong: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrantLine {
    pub id: String,
    pub name: String,
    pub permission: Permission,
    pub wrong: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub kind: NodeKind,
    pub name: String,
    pub tint: Option<Tint>,
    pub checks: Vec<Check>,
    pub users: Vec<GrantLine>,
    pub groups: Vec<GrantLine>,
}

impl Assessment {
    pub fn workspace(
        workspace: &Workspace,
        rules: RuleSet,
        registry: &Registry,
        current_user: &str,
    ) -> Self {
        let color = workspace.item_color();
        let alias = workspace.alias();

        let mut checks = vec![
            Check {
                field: CheckField::Color,
                value: or_empty(color),
                wrong: rules == RuleSet::Okr && !OKR_COLORS.contains(&color),
            },
            Check {
                field: CheckField::ItemKey,
                value: or_empty(alias),
                wrong: rules == RuleSet::Okr && !alias.starts_with("OKR"),
            },
        ];
        if let Some(default) = workspace
            .default_permission
            .as_ref()
            .filter(|p| !p.as_api_str().is_empty())
        {
            checks.push(Check {
                field: CheckField::Default,
                value: default.label().to_string(),
                wrong: rules == RuleSet::Okr && *default != Permission::Comment,
            });
        }

        let (users, groups) = grant_lines(&workspace.embedded, rules, registry, current_user);
        Self {
            kind: NodeKind::Workspace,
            name: workspace.display_name().to_string(),
            tint: Tint::for_item_color(color),
            checks,
            users,
            groups,
        }
    }

    /// Folders follow the product-management group rules.
    pub fn folder(folder: &FolderNode<'_>, registry: &Registry, current_user: &str) -> Self {
        let (users, groups) = grant_lines(folder.grants(), RuleSet::ProdMgt, registry, current_user);
        Self {
            kind: NodeKind::Folder,
            name: folder.name.to_string(),
            tint: Some(Tint::Yellow),
            checks: Vec::new(),
            users,
            groups,
        }
    }

    pub fn context(workspace: &Workspace) -> Self {
        Self {
            kind: NodeKind::Context,
            name: workspace.display_name().to_string(),
            tint: Tint::for_item_color(workspace.item_color()),
            checks: Vec::new(),
            users: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.checks.iter().any(|c| c.wrong)
            || self.users.iter().any(|u| u.wrong)
            || self.groups.iter().any(|g| g.wrong)
    }
}

fn or_empty(value: &str) -> String {
    if value.is_empty() {
        "(empty)".to_string()
    } else {
        value.to_string()
    }
}

fn grant_lines(
    grants: &Grants,
    rules: RuleSet,
    registry: &Registry,
    current_user: &str,
) -> (Vec<GrantLine>, Vec<GrantLine>) {
    let users = grants
        .permissions
        .iter()
        .filter(|(id, _)| id.as_str() != current_user)
        .map(|(id, permission)| GrantLine {
            id: id.clone(),
            name: registry.user_name(id).to_string(),
            permission: permission.clone(),
            wrong: true,
        })
        .collect();

    let groups = grants
        .user_group_permissions
        .iter()
        .map(|(id, permission)| {
            let name = registry.group_name(id);
            GrantLine {
                id: id.clone(),
                name: name.to_string(),
                permission: permission.clone(),
                wrong: rules.group_is_wrong(name, permission),
            }
        })
        .collect();

    (users, groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Namespace;
    use crate::registry::fixtures::registry;
    use serde_json::json;

    fn workspace(value: serde_json::Value) -> Workspace {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn detects_okr_workspaces() {
        assert!(is_okr(&workspace(json!({"id": "a", "namespace": "app:OKR"}))));
        assert!(is_okr(&workspace(json!({"id": "b", "namespace": {"typeId": "okr-v2"}}))));
        assert!(is_okr(&workspace(json!({"id": "c", "itemType": "Okr Objective"}))));
        assert!(!is_okr(&workspace(json!({"id": "d", "namespace": "app:default", "itemType": "feature"}))));
        assert!(!is_okr(&Workspace {
            namespace: Some(Namespace::Name(String::new())),
            ..Workspace::default()
        }));
    }

    #[test]
    fn okr_group_rules() {
        let rules = RuleSet::Okr;
        assert!(!rules.group_is_wrong("SP_OKR_ERA_F", &Permission::Full));
        assert!(rules.group_is_wrong("SP_OKR_ERA_F", &Permission::Write));
        assert!(!rules.group_is_wrong("SP_OKR_ERA_W", &Permission::Write));
        assert!(rules.group_is_wrong("SP_OKR_ERA_W", &Permission::Comment));
        assert!(!rules.group_is_wrong("SP_OKR_Readers", &Permission::Read));
        assert!(!rules.group_is_wrong(ADMIN_GROUP, &Permission::Read));
        assert!(rules.group_is_wrong("SP_ProdMgt_CMS_F_U", &Permission::Full));
        assert!(rules.group_is_wrong("RandomGroup", &Permission::Comment));
    }

    #[test]
    fn prodmgt_group_rules() {
        let rules = RuleSet::ProdMgt;
        assert!(!rules.group_is_wrong("SP_ProdMgt_CMS_F_U", &Permission::Full));
        assert!(rules.group_is_wrong("SP_ProdMgt_CMS_W_U", &Permission::Full));
        assert!(!rules.group_is_wrong("SP_ProdMgt_CMS_C_U", &Permission::Comment));
        assert!(rules.group_is_wrong("SP_ProdMgt_CMS_C_U", &Permission::Read));
        assert!(!rules.group_is_wrong(ADMIN_GROUP, &Permission::Full));
        assert!(rules.group_is_wrong("SP_OKR_ERA_F", &Permission::Full));
    }

    #[test]
    fn okr_workspace_with_direct_user_is_flagged() {
        let reg = registry();
        let ws = reg.workspace("ws-okr-1").unwrap();
        let a = Assessment::workspace(ws, RuleSet::Okr, &reg, "user-1");

        assert!(a.is_flagged());
        assert_eq!(a.tint, Some(Tint::Yellow));
        assert!(a.checks.iter().all(|c| !c.wrong));
        assert_eq!(a.users.len(), 1);
        assert_eq!(a.users[0].name, "Bob Editor");
        let groups: Vec<(&str, bool)> = a.groups.iter().map(|g| (g.name.as_str(), g.wrong)).collect();
        assert_eq!(groups, [("Airfocus Admins", false), ("SP_OKR_ERA_F", false)]);
    }

    #[test]
    fn current_user_grant_is_not_wrong() {
        let reg = registry();
        let ws = reg.workspace("ws-okr-1").unwrap();
        let a = Assessment::workspace(ws, RuleSet::Okr, &reg, "user-2");
        assert!(a.users.is_empty());
        assert!(!a.is_flagged());
    }

    #[test]
    fn okr_checks_on_color_key_and_default() {
        let reg = registry();
        let ws = workspace(json!({
            "id": "x", "name": "Stray OKR", "namespace": "app:okr",
            "alias": "KR-9", "itemColor": "green", "defaultPermission": "read"
        }));
        let a = Assessment::workspace(&ws, RuleSet::Okr, &reg, "user-1");

        let wrong: Vec<(&str, &str)> = a
            .checks
            .iter()
            .filter(|c| c.wrong)
            .map(|c| (c.field.label(), c.value.as_str()))
            .collect();
        assert_eq!(wrong, [("Color", "green"), ("Item Key", "KR-9"), ("Default", "Read")]);
        assert_eq!(a.tint, None);
    }

    #[test]
    fn empty_default_permission_is_not_checked() {
        let reg = registry();
        let ws = workspace(json!({
            "id": "x", "name": "Quiet OKR", "namespace": "app:okr",
            "alias": "OKR-1", "itemColor": "blue", "defaultPermission": ""
        }));
        let a = Assessment::workspace(&ws, RuleSet::Okr, &reg, "user-1");

        assert!(a.checks.iter().all(|c| c.field != CheckField::Default));
        assert!(!a.is_flagged());
    }

    #[test]
    fn empty_color_and_key_are_wrong_for_okr_only() {
        let reg = registry();
        let ws = workspace(json!({"id": "x", "name": "Bare"}));

        let okr = Assessment::workspace(&ws, RuleSet::Okr, &reg, "user-1");
        assert_eq!(okr.checks.len(), 2);
        assert!(okr.checks.iter().all(|c| c.wrong && c.value == "(empty)"));

        let prodmgt = Assessment::workspace(&ws, RuleSet::ProdMgt, &reg, "user-1");
        assert!(!prodmgt.is_flagged());
    }

    #[test]
    fn prodmgt_workspace_flags_user_and_random_group() {
        let reg = registry();
        let ws = reg.workspace("ws-prod-2").unwrap();
        let a = Assessment::workspace(ws, RuleSet::ProdMgt, &reg, "user-1");

        assert_eq!(a.tint, Some(Tint::Orange));
        assert!(a.checks.iter().all(|c| !c.wrong));
        assert_eq!(a.users[0].name, "Carol Contributor");
        let wrong: Vec<&str> = a
            .groups
            .iter()
            .filter(|g| g.wrong)
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(wrong, ["RandomGroup"]);

        let clean = Assessment::workspace(reg.workspace("ws-prod-1").unwrap(), RuleSet::ProdMgt, &reg, "user-1");
        assert!(!clean.is_flagged());
    }

    #[test]
    fn context_nodes_never_flag() {
        let reg = registry();
        let a = Assessment::context(reg.workspace("ws-prod-2").unwrap());
        assert_eq!(a.kind, NodeKind::Context);
        assert!(!a.is_flagged());
    }
}
