use anyhow::{Context, Result};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

use crate::client::{ApiClient, active_search};
use crate::model::{Role, User, UserGroup, Workspace};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Multiple workspaces match '{name}': {}", candidates.join(", "))]
    AmbiguousWorkspace {
        name: String,
        candidates: Vec<String>,
    },
}

/// Users, user groups and workspaces fetched once and indexed by id.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    users: Vec<User>,
    user_index: HashMap<String, usize>,
    groups: Vec<UserGroup>,
    group_index: HashMap<String, usize>,
    workspaces: Vec<Workspace>,
    workspace_index: HashMap<String, usize>,
    group_overrides: BTreeMap<String, String>,
}

impl Registry {
    pub fn load(client: &ApiClient, group_overrides: BTreeMap<String, String>) -> Result<Self> {
        tracing::info!("Loading registries (users, user groups, workspaces)...");

        let users: Vec<User> = client
            .get("/api/team/users", &[])?
            .decode()
            .context("decoding team users")?;
        let groups: Vec<UserGroup> = client
            .fetch_all_pages("/api/team/user-groups/search", &active_search())
            .context("fetching user groups")?;
        let workspaces: Vec<Workspace> = client
            .fetch_all_pages(
                "/api/workspaces/search",
                &json!({
                    "archived": false,
                    "sort": {"type": "name", "direction": "asc"}
                }),
            )
            .context("fetching workspaces")?;

        tracing::debug!(
            users = users.len(),
            groups = groups.len(),
            workspaces = workspaces.len(),
            "registries loaded"
        );

        Ok(Self::from_parts(users, groups, workspaces, group_overrides))
    }

    pub fn from_parts(
        users: Vec<User>,
        groups: Vec<UserGroup>,
        workspaces: Vec<Workspace>,
        group_overrides: BTreeMap<String, String>,
    ) -> Self {
        let user_index = users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.user_id.clone(), i))
            .collect();
        let group_index = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.clone(), i))
            .collect();
        let workspace_index = workspaces
            .iter()
            .enumerate()
            .map(|(i, w)| (w.id.clone(), i))
            .collect();

        Self {
            users,
            user_index,
            groups,
            group_index,
            workspaces,
            workspace_index,
            group_overrides,
        }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn groups(&self) -> &[UserGroup] {
        &self.groups
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.user_index.get(user_id).map(|&i| &self.users[i])
    }

    pub fn group(&self, group_id: &str) -> Option<&UserGroup> {
        self.group_index.get(group_id).map(|&i| &self.groups[i])
    }

    pub fn workspace(&self, workspace_id: &str) -> Option<&Workspace> {
        self.workspace_index
            .get(workspace_id)
            .map(|&i| &self.workspaces[i])
    }

    pub fn user_name<'a>(&'a self, user_id: &'a str) -> &'a str {
        self.user(user_id).map_or(user_id, User::display_name)
    }

    /// Registry name first, then a configured override, then the raw id.
    pub fn group_name<'a>(&'a self, group_id: &'a str) -> &'a str {
        self.known_group_name(group_id).unwrap_or(group_id)
    }

    pub fn known_group_name(&self, group_id: &str) -> Option<&str> {
        match self.group(group_id) {
            Some(group) => Some(&group.name),
            None => self.group_overrides.get(group_id).map(String::as_str),
        }
    }

    pub fn workspace_name<'a>(&'a self, workspace_id: &'a str) -> &'a str {
        self.workspace(workspace_id)
            .and_then(|w| w.name.as_deref())
            .unwrap_or(workspace_id)
    }

    pub fn user_role(&self, user_id: &str) -> Role {
        self.user(user_id)
            .map(|u| u.role.clone())
            .unwrap_or_default()
    }

    /// Records a role change that the API already accepted.
    pub fn set_role(&mut self, user_id: &str, role: Role) {
        if let Some(&i) = self.user_index.get(user_id) {
            self.users[i].role = role;
        }
    }

    /// Case-insensitive match on workspace names, exact or substring.
    pub fn find_workspaces(&self, name: &str, partial: bool) -> Vec<&Workspace> {
        let needle = name.to_lowercase();
        self.workspaces
            .iter()
            .filter(|ws| {
                let Some(ws_name) = ws.name.as_deref() else {
                    return false;
                };
                let hay = ws_name.to_lowercase();
                if partial {
                    hay.contains(&needle)
                } else {
                    hay == needle
                }
            })
            .collect()
    }

    pub fn workspace_id_by_name(&self, name: &str, exact: bool) -> Result<Option<String>> {
        let matches = self.find_workspaces(name, !exact);
        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only.id.clone())),
            many if exact => Ok(Some(many[0].id.clone())),
            many => Err(RegistryError::AmbiguousWorkspace {
                name: name.to_string(),
                candidates: many
                    .iter()
                    .map(|w| w.display_name().to_string())
                    .collect(),
            }
            .into()),
        }
    }

    pub fn group_members(&self, group_id: &str) -> &[String] {
        self.group(group_id)
            .map(UserGroup::members)
            .unwrap_or_default()
    }

    pub fn group_by_name(&self, name: &str) -> Option<&UserGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn groups_by_prefix(&self, prefix: &str) -> Vec<&UserGroup> {
        self.groups_matching(prefix, None)
    }

    /// Groups whose name starts with `prefix` and does not end with `exclude_suffix`.
    pub fn groups_matching(&self, prefix: &str, exclude_suffix: Option<&str>) -> Vec<&UserGroup> {
        self.groups
            .iter()
            .filter(|g| g.name.starts_with(prefix))
            .filter(|g| exclude_suffix.is_none_or(|suffix| !g.name.ends_with(suffix)))
            .collect()
    }

    pub fn user_groups(&self, user_id: &str) -> Vec<&UserGroup> {
        self.groups
            .iter()
            .filter(|g| g.members().iter().any(|m| m == user_id))
            .collect()
    }

    pub fn unique_members_by_prefix(
        &self,
        prefix: &str,
        exclude_suffix: Option<&str>,
    ) -> BTreeSet<String> {
        self.groups_matching(prefix, exclude_suffix)
            .into_iter()
            .flat_map(|g| g.members().iter().cloned())
            .collect()
    }

    /// Users (optionally of one role) outside every group matched by `prefixes`.
    pub fn users_not_in_groups(
        &self,
        prefixes: &[&str],
        exclude_suffix: Option<&str>,
        role: Option<&Role>,
    ) -> BTreeSet<String> {
        let covered: BTreeSet<String> = prefixes
            .iter()
            .flat_map(|prefix| self.unique_members_by_prefix(prefix, exclude_suffix))
            .collect();

        self.users
            .iter()
            .filter(|u| role.is_none_or(|r| &u.role == r))
            .filter(|u| !covered.contains(&u.user_id))
            .map(|u| u.user_id.clone())
            .collect()
    }

    /// Contributor-role members of `groups`, keyed by display name, with the
    /// names of the groups they were found in.
    pub fn contributors_by_user(&self, groups: &[&UserGroup]) -> BTreeMap<String, Vec<String>> {
        let mut by_user: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for group in groups {
            for member in group.members() {
                if self.user_role(member) == Role::Contributor {
                    by_user
                        .entry(self.user_name(member).to_string())
                        .or_default()
                        .push(group.name.clone());
                }
            }
        }
        by_user
    }

    /// Sorted contributor names per group.
    pub fn contributors_by_group(&self, groups: &[&UserGroup]) -> BTreeMap<String, Vec<String>> {
        groups
            .iter()
            .map(|group| {
                let mut names: Vec<String> = group
                    .members()
                    .iter()
                    .filter(|m| self.user_role(m) == Role::Contributor)
                    .map(|m| self.user_name(m).to_string())
                    .collect();
                names.sort();
                (group.name.clone(), names)
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn resolves_names_with_fallbacks() {
        let reg = registry();
        assert_eq!(reg.user_name("user-2"), "Bob Editor");
        assert_eq!(reg.user_name("ghost"), "ghost");
        assert_eq!(reg.group_name("grp-okr-era-w"), "SP_OKR_ERA_W");
        assert_eq!(reg.group_name("grp-legacy"), "SP_OKR_Legacy_F");
        assert_eq!(reg.group_name("grp-gone"), "grp-gone");
        assert_eq!(reg.workspace_name("ws-prod-1"), "CMS Product");
        assert_eq!(reg.user_role("user-3"), Role::Contributor);
        assert_eq!(reg.user_role("ghost"), Role::Unknown);
    }

    #[test]
    fn workspace_lookup_by_name() {
        let reg = registry();
        assert_eq!(
            reg.workspace_id_by_name("okr main", true).unwrap().as_deref(),
            Some("ws-okr-1")
        );
        assert_eq!(
            reg.workspace_id_by_name("portal", false).unwrap().as_deref(),
            Some("ws-prod-2")
        );
        assert!(reg.workspace_id_by_name("nowhere", false).unwrap().is_none());

        let err = reg.workspace_id_by_name("OKR", false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Multiple workspaces"));
        assert!(msg.contains("OKR Main") && msg.contains("OKR Child"));
    }

    #[test]
    fn group_queries() {
        let reg = registry();
        assert_eq!(reg.groups_by_prefix("SP_OKR_").len(), 2);
        assert_eq!(reg.groups_matching("SP_ProdMgt_", Some("_C_U")).len(), 1);
        assert_eq!(reg.group_members("grp-okr-era-f"), ["user-2", "user-3"]);
        assert!(reg.group_members("missing").is_empty());
        assert_eq!(
            reg.group_by_name("Airfocus Admins").map(|g| g.id.as_str()),
            Some("grp-admins")
        );

        let bob: Vec<&str> = reg
            .user_groups("user-2")
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(bob, ["SP_OKR_ERA_F", "SP_ProdMgt_CMS_F_U"]);
    }

    #[test]
    fn members_and_outsiders() {
        let reg = registry();
        let okr = reg.unique_members_by_prefix("SP_OKR_", None);
        assert_eq!(okr.len(), 3);

        let prodmgt = reg.unique_members_by_prefix("SP_ProdMgt_", Some("_C_U"));
        assert_eq!(
            prodmgt.into_iter().collect::<Vec<_>>(),
            ["user-2", "user-4"]
        );

        let outside = reg.users_not_in_groups(
            &["SP_OKR_", "SP_ProdMgt_"],
            Some("_C_U"),
            Some(&Role::Editor),
        );
        assert_eq!(outside.into_iter().collect::<Vec<_>>(), ["user-5"]);
    }

    #[test]
    fn contributors_per_group_and_user() {
        let reg = registry();
        let groups = reg.groups_by_prefix("SP_OKR_");

        let by_group = reg.contributors_by_group(&groups);
        assert_eq!(by_group["SP_OKR_ERA_F"], ["Carol Contributor"]);
        assert!(by_group["SP_OKR_ERA_W"].is_empty());

        let by_user = reg.contributors_by_user(&groups);
        assert_eq!(by_user["Carol Contributor"], ["SP_OKR_ERA_F"]);
    }

    #[test]
    fn set_role_updates_cached_user() {
        let mut reg = registry();
        reg.set_role("user-3", Role::Editor);
        assert_eq!(reg.user_role("user-3"), Role::Editor);
        reg.set_role("ghost", Role::Admin);
        assert_eq!(reg.user_role("ghost"), Role::Unknown);
    }

    #[test]
    fn loads_from_api() {
        let server = MockServer::start();
        let users = server.mock(|when, then| {
            when.method(GET).path("/api/team/users");
            then.status(200).json_body(users_json());
        });
        let groups = server.mock(|when, then| {
            when.method(POST)
                .path("/api/team/user-groups/search")
                .json_body(json!({"archived": false}));
            then.status(200)
                .json_body(json!({"items": groups_json(), "totalItems": 6}));
        });
        let workspaces = server.mock(|when, then| {
            when.method(POST).path("/api/workspaces/search").json_body(json!({
                "archived": false,
                "sort": {"type": "name", "direction": "asc"}
            }));
            then.status(200)
                .json_body(json!({"items": workspaces_json(), "totalItems": 4}));
        });

        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let reg = Registry::load(&client, BTreeMap::new()).unwrap();

        users.assert();
        groups.assert();
        workspaces.assert();
        assert_eq!(reg.users().len(), 5);
        assert_eq!(reg.groups().len(), 6);
        assert_eq!(reg.workspaces()[3].id, "ws-prod-2");
    }
}
