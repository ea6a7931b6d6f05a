use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::compliance::{OKR_GROUP_PREFIX, PRODMGT_GROUP_PREFIX};
use crate::model::Workspace;
use crate::registry::Registry;

const WIDE_RULE: &str =
    "================================================================================";

/// `find-workspace` result listing with the `--objective-workspaces` hint.
pub struct WorkspaceMatches<'a> {
    pub name: &'a str,
    pub partial: bool,
    pub matches: &'a [&'a Workspace],
}

impl fmt::Display for WorkspaceMatches<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matches.is_empty() {
            let kind = if self.partial { "partial" } else { "exact" };
            return writeln!(f, "\nNo workspaces found with {kind} name: '{}'", self.name);
        }

        writeln!(f, "\n{WIDE_RULE}\nFound {} workspace(s):\n{WIDE_RULE}\n", self.matches.len())?;
        for ws in self.matches {
            let status = if ws.archived { " [ARCHIVED]" } else { "" };
            writeln!(f, "Name: {}{status}", ws.display_name())?;
            writeln!(f, "ID:   {}\n", ws.id)?;
        }
        writeln!(f, "{WIDE_RULE}\n\nUse the ID with --objective-workspaces:")?;
        match self.matches {
            [only] => writeln!(f, "  --objective-workspaces \"{}\"", only.id),
            _ => writeln!(f, "  --objective-workspaces \"<workspace-id>\""),
        }
    }
}

/// Every user-group id granted on any workspace.
pub fn granted_group_ids(workspaces: &[Workspace]) -> BTreeSet<&str> {
    workspaces
        .iter()
        .flat_map(|ws| ws.embedded.user_group_permissions.keys())
        .map(String::as_str)
        .collect()
}

/// `usergroup_<id> = <name>` lines for the config file. Ids with no group
/// and no configured name get an empty name to fill in.
pub struct GroupIds<'a>(pub &'a Registry);

impl fmt::Display for GroupIds<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.0;
        let ids = granted_group_ids(registry.workspaces());
        write!(f, "\nFound {} unique user group IDs:\n\n", ids.len())?;
        for id in ids {
            let name = registry.known_group_name(id).unwrap_or("");
            writeln!(f, "usergroup_{id} = {name}")?;
        }
        Ok(())
    }
}

/// Contributors per group, or per user with `by_user`. Without a group the
/// OKR and product-management groups are scanned.
pub fn contributors(
    registry: &Registry,
    group: Option<&str>,
    by_user: bool,
) -> Result<BTreeMap<String, Vec<String>>> {
    let groups = match group {
        Some(name) => match registry.group_by_name(name) {
            Some(g) => vec![g],
            None => bail!("Group '{name}' not found."),
        },
        None => {
            let mut groups = registry.groups_by_prefix(OKR_GROUP_PREFIX);
            groups.extend(registry.groups_by_prefix(PRODMGT_GROUP_PREFIX));
            groups
        }
    };

    let mut listing = if by_user {
        registry.contributors_by_user(&groups)
    } else {
        registry.contributors_by_group(&groups)
    };
    listing.retain(|_, names| !names.is_empty());
    Ok(listing)
}

pub struct ContributorListing<'a> {
    pub listing: &'a BTreeMap<String, Vec<String>>,
    pub group: Option<&'a str>,
}

impl fmt::Display for ContributorListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.listing.is_empty() {
            return match self.group {
                Some(name) => writeln!(f, "No contributors found in group '{name}'."),
                None => writeln!(f, "No contributors found in SP_OKR_ or SP_ProdMgt_ groups."),
            };
        }
        for (key, names) in self.listing {
            writeln!(f, "\n{key}:")?;
            for name in names {
                writeln!(f, "  - {name}")?;
            }
        }
        Ok(())
    }
}
