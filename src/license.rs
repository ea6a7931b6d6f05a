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

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::access::{editors_outside_groups, user_hierarchy_lines};
use crate::compliance::{OKR_GROUP_PREFIX, PRODMGT_GROUP_PREFIX};
use crate::hierarchy::FolderTree;
use crate::model::{Role, Seats};
use crate::registry::Registry;
use crate::style::{Tint, paint};

#[derive(Debug, Clone, Serialize)]
pub struct LicenseUsage {
    pub seats: Seats,
    pub admin_count: usize,
    pub okr_count: usize,
    pub prodmgt_count: usize,
    pub editors_outside_count: usize,
    pub shared_count: usize,
    pub okr_only_count: usize,
    pub effective_count: usize,
    #[serde(skip)]
    pub editors_outside: BTreeSet<String>,
}

impl LicenseUsage {
    pub fn analyze(registry: &Registry, seats: Seats) -> Self {
        let okr = registry.unique_members_by_prefix(OKR_GROUP_PREFIX, None);
        let prodmgt = registry.unique_members_by_prefix(PRODMGT_GROUP_PREFIX, Some("_C_U"));
        let editors_outside = editors_outside_groups(registry);
        let admin_count = registry
            .users()
            .iter()
            .filter(|u| u.role == Role::Admin)
            .count();

        let effective: BTreeSet<&String> = okr
            .iter()
            .chain(prodmgt.iter())
            .chain(editors_outside.iter())
            .collect();

        Self {
            seats,
            admin_count,
            okr_count: okr.len(),
            prodmgt_count: prodmgt.len(),
            editors_outside_count: editors_outside.len(),
            shared_count: okr.intersection(&prodmgt).count(),
            okr_only_count: okr.difference(&prodmgt).count(),
            effective_count: effective.len() + admin_count,
            editors_outside,
        }
    }

    /// Product-management licenses include editors outside every group.
    pub fn prodmgt_licenses(&self) -> usize {
        self.prodmgt_count + self.editors_outside_count
    }
}

impl fmt::Display for LicenseUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cyan = Some(Tint::Cyan);
        let yellow = Some(Tint::Yellow);

        writeln!(f, "{}", paint("\n=== License Usage Analysis ===\n", cyan))?;
        writeln!(f, "{}", paint("Total Licenses:", yellow))?;
        writeln!(f, "  Total:     {}", self.seats.total)?;
        writeln!(f, "  Used:      {}", self.seats.used)?;
        writeln!(f, "  Free:      {}", self.seats.free)?;

        writeln!(f, "{}", paint("\nLicense Distribution:", yellow))?;
        row(f, "Administrators:", self.admin_count)?;
        row(f, "SP_OKR Groups Editors:", self.okr_count)?;
        row(f, "SP_ProdMgt Groups Editors:", self.prodmgt_count)?;
        row(f, "Duplicates (counted in both):", self.shared_count)?;
        row(f, "Editors not in SP_OKR/SP_ProdMgt:", self.editors_outside_count)?;

        writeln!(f, "{}", paint("\nEffective License Usage:", Some(Tint::Green)))?;
        row(f, "OKR Licenses:", self.okr_only_count)?;
        row(f, "PrdMgt Licenses:", self.prodmgt_licenses())?;
        row(f, "Total Unique Users:", self.effective_count)?;
        writeln!(
            f,
            "    ({} Admin + {} OKR + {} ProdMgt)",
            self.admin_count,
            self.okr_only_count,
            self.prodmgt_licenses()
        )?;

        let effective = i64::try_from(self.effective_count).unwrap_or(i64::MAX);
        if self.seats.used != effective {
            let magenta = Some(Tint::Magenta);
            let diff = self.seats.used - effective;
            let note = format!(
                "\nNote: API reports {} used licenses, difference of {diff}",
                self.seats.used
            );
            writeln!(f, "{}", paint(&note, magenta))?;
            writeln!(
                f,
                "{}",
                paint("      (This may include disabled users that are still editors)", magenta)
            )?;
        }
        Ok(())
    }
}

fn row(f: &mut fmt::Formatter<'_>, label: &str, value: usize) -> fmt::Result {
    writeln!(f, "  {label:<55}{value:>6}")
}

/// Role histogram and group coverage, printed with `--debug`.
pub struct DebugSummary<'a> {
    pub registry: &'a Registry,
    pub usage: &'a LicenseUsage,
}

impl fmt::Display for DebugSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry;
        let mut roles: BTreeMap<String, usize> = BTreeMap::new();
        for user in registry.users() {
            *roles.entry(user.role.to_string()).or_default() += 1;
        }
        let histogram = roles
            .iter()
            .map(|(role, n)| format!("{role}={n}"))
            .collect::<Vec<_>>()
            .join(", ");

        let in_any_group = registry
            .users()
            .iter()
            .filter(|u| !registry.user_groups(&u.user_id).is_empty())
            .count();
        let okr_or_prodmgt = registry
            .unique_members_by_prefix(OKR_GROUP_PREFIX, None)
            .union(&registry.unique_members_by_prefix(PRODMGT_GROUP_PREFIX, Some("_C_U")))
            .count();

        writeln!(f, "{}", paint("\n=== DEBUG INFO ===", Some(Tint::Magenta)))?;
        writeln!(f, "Total users in registry: {}", registry.users().len())?;
        writeln!(f, "Total groups in registry: {}", registry.groups().len())?;
        writeln!(f, "Users by role: {histogram}")?;
        writeln!(f, "Total users in at least one group: {in_any_group}")?;
        writeln!(f, "Total users in SP_OKR_ or SP_ProdMgt_ groups: {okr_or_prodmgt}")?;
        writeln!(
            f,
            "Editors not in SP_OKR_/SP_ProdMgt_ groups: {}",
            self.usage.editors_outside_count
        )
    }
}

/// Editors outside the groups, each with the folders and workspaces they
/// are granted directly.
pub struct OrphanedEditors<'a, 't> {
    pub registry: &'a Registry,
    pub usage: &'a LicenseUsage,
    pub tree: &'a FolderTree<'t>,
}

impl fmt::Display for OrphanedEditors<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outside = &self.usage.editors_outside;
        if outside.is_empty() {
            return writeln!(f, "{}", paint("\nNo orphaned editors found.", Some(Tint::Green)));
        }

        let heading = format!(
            "\n=== Orphaned Editors (Not in SP_OKR_/SP_ProdMgt_): {} ===\n",
            outside.len()
        );
        writeln!(f, "{}", paint(&heading, Some(Tint::Yellow)))?;

        let mut editors: Vec<(&str, &str)> = outside
            .iter()
            .map(|id| (self.registry.user_name(id), id.as_str()))
            .collect();
        editors.sort();

        for (name, user_id) in editors {
            writeln!(f, "  - {name}")?;
            let lines = user_hierarchy_lines(self.tree, user_id);
            if lines.is_empty() {
                writeln!(f, "    {}", paint("No workspace or folder access", Some(Tint::Magenta)))?;
                continue;
            }
            writeln!(f, "    {}", paint("Access hierarchy:", Some(Tint::Cyan)))?;
            for line in lines {
                writeln!(f, "      {line}")?;
            }
        }
        Ok(())
    }
}
