use anyhow::{Context, Result, bail};
use serde_json::json;
use std::io::{BufRead, Write};
use thiserror::Error;

use crate::access::{AccessMap, orphaned_users};
use crate::client::ApiClient;
use crate::hierarchy::{build_folder_tree, fetch_folders};
use crate::model::Role;
use crate::prompt::confirm;
use crate::registry::Registry;
use crate::style::{Tint, paint};

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("invalid role `{0}`; expected admin, editor or contributor")]
    Invalid(String),
    #[error("role changes target editor or contributor, not `{0}`")]
    UnsupportedTarget(String),
}

/// Whose roles a bulk change looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Group(String),
    Orphaned,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub assume_yes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub user_id: String,
    pub name: String,
    pub current: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub name: String,
    pub current: Role,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub target: Role,
    pub source: Role,
    pub changes: Vec<PlannedChange>,
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub succeeded: usize,
    pub failed: usize,
}

/// Promotion to editor starts from contributors, demotion from editors.
pub fn source_role(target: &Role) -> Result<Role, RoleError> {
    match target {
        Role::Editor => Ok(Role::Contributor),
        Role::Contributor => Ok(Role::Editor),
        other => Err(RoleError::UnsupportedTarget(other.to_string())),
    }
}

pub fn plan(registry: &Registry, member_ids: &[String], target: Role) -> Result<Plan, RoleError> {
    let source = source_role(&target)?;
    let mut changes = Vec::new();
    let mut skipped = Vec::new();

    for user_id in member_ids {
        let name = registry.user_name(user_id).to_string();
        let current = registry.user_role(user_id);

        let reason = if current == target {
            Some(format!("already {target}"))
        } else if current == Role::Admin {
            Some("admin role protected".to_string())
        } else if current != source {
            Some(format!("not a {source}"))
        } else {
            None
        };

        match reason {
            Some(reason) => skipped.push(Skipped {
                name,
                current,
                reason,
            }),
            None => changes.push(PlannedChange {
                user_id: user_id.clone(),
                name,
                current,
            }),
        }
    }

    Ok(Plan {
        target,
        source,
        changes,
        skipped,
    })
}

/// Writes one role and mirrors it into the registry once the API accepts it.
pub fn set_user_role(
    client: &ApiClient,
    registry: &mut Registry,
    user_id: &str,
    role: &Role,
) -> Result<()> {
    if !role.is_assignable() {
        return Err(RoleError::Invalid(role.to_string()).into());
    }
    client
        .post_json(
            "/api/team/users/role",
            &[],
            Some(&json!({"userId": user_id, "role": role.as_str()})),
        )
        .with_context(|| format!("setting role {role} for {user_id}"))?;
    registry.set_role(user_id, role.clone());
    Ok(())
}

pub fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n{THIN_RULE}\n", paint("PLANNED CHANGES:", Some(Tint::Cyan))));
    if plan.changes.is_empty() {
        out.push_str("  No changes needed.\n");
    }
    for change in &plan.changes {
        out.push_str(&format!(
            "  {}: {} -> {}\n",
            change.name,
            paint(change.current.as_str(), Some(Tint::Yellow)),
            paint(plan.target.as_str(), Some(Tint::Green))
        ));
    }
    out.push('\n');

    if !plan.skipped.is_empty() {
        out.push_str(&format!("{}\n{THIN_RULE}\n", paint("SKIPPED USERS:", Some(Tint::Yellow))));
        for skip in &plan.skipped {
            out.push_str(&format!(
                "  {} (current role: {}) - {}\n",
                skip.name, skip.current, skip.reason
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "{RULE}\nTotal changes to make: {}\nTotal users to skip: {}\n{RULE}\n",
        paint(&plan.changes.len().to_string(), Some(Tint::Cyan)),
        paint(&plan.skipped.len().to_string(), Some(Tint::Yellow))
    ));
    out
}

pub fn apply<W: Write>(
    client: &ApiClient,
    registry: &mut Registry,
    plan: &Plan,
    out: &mut W,
) -> Result<Outcome> {
    writeln!(out, "\n{}\n{THIN_RULE}", paint("APPLYING CHANGES:", Some(Tint::Green)))?;
    let mut outcome = Outcome::default();

    for change in &plan.changes {
        write!(out, "  Setting role to {} for {}... ", plan.target, change.name)?;
        match set_user_role(client, registry, &change.user_id, &plan.target) {
            Ok(()) => {
                writeln!(out, "{}", paint("SUCCESS", Some(Tint::Green)))?;
                outcome.succeeded += 1;
            }
            Err(err) => {
                tracing::warn!("{err:#}");
                writeln!(out, "{}", paint("FAILED", Some(Tint::Red)))?;
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}

pub fn render_summary(plan: &Plan, outcome: &Outcome) -> String {
    let mut out = format!("\n{RULE}\nFINAL SUMMARY\n{RULE}\n");
    out.push_str(&format!(
        "Successfully updated: {} {}(s) to {}\n",
        paint(&outcome.succeeded.to_string(), Some(Tint::Green)),
        plan.source,
        plan.target
    ));
    out.push_str(&format!(
        "Skipped (already {}/admin/other): {} user(s)\n",
        plan.target,
        paint(&plan.skipped.len().to_string(), Some(Tint::Yellow))
    ));
    if outcome.failed > 0 {
        out.push_str(&format!(
            "Failed: {} user(s)\n",
            paint(&outcome.failed.to_string(), Some(Tint::Red))
        ));
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

/// Bulk role change for a group's members or for orphaned editors.
pub fn run<R: BufRead, W: Write>(
    client: &ApiClient,
    registry: &mut Registry,
    source: &Source,
    target: Role,
    options: RunOptions,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let (member_ids, context) = match source {
        Source::Orphaned => {
            writeln!(
                out,
                "{}",
                paint(
                    "\nSearching for orphaned users (no workspace/folder access)...",
                    Some(Tint::Cyan)
                )
            )?;
            let (summaries, details) = fetch_folders(client)?;
            let tree = build_folder_tree(registry.workspaces(), &summaries, &details);
            let access = AccessMap::build(registry.workspaces(), &tree);
            let orphans = orphaned_users(registry, &access);
            if orphans.is_empty() {
                writeln!(out, "{}", paint("No orphaned users found.", Some(Tint::Green)))?;
                return Ok(());
            }
            writeln!(
                out,
                "{}",
                paint(&format!("\nFound {} orphaned user(s)", orphans.len()), Some(Tint::Yellow))
            )?;
            (
                orphans,
                "orphaned users (not in SP_OKR_/SP_ProdMgt_ groups with zero access)".to_string(),
            )
        }
        Source::Group(name) => {
            writeln!(out, "\nSearching for group: {name}")?;
            let Some(group) = registry.group_by_name(name) else {
                bail!("Group '{name}' not found.");
            };
            writeln!(out, "{}", paint(&format!("Found group: {name}"), Some(Tint::Green)))?;
            let members = registry.group_members(&group.id).to_vec();
            let context = format!("group '{name}'");
            if members.is_empty() {
                writeln!(
                    out,
                    "{}",
                    paint(&format!("No members found in {context}."), Some(Tint::Yellow))
                )?;
                return Ok(());
            }
            (members, context)
        }
    };

    let plan = plan(registry, &member_ids, target)?;
    let action = match plan.target {
        Role::Editor => "Promoting contributors to editor",
        _ => "Demoting editors to contributor",
    };
    writeln!(out, "Target role: {}", paint(plan.target.as_str(), Some(Tint::Cyan)))?;
    writeln!(out, "Action: {action}")?;
    writeln!(out, "\nFound {} member(s) in {context}:\n{RULE}", member_ids.len())?;
    write!(out, "{}", render_plan(&plan))?;

    if plan.changes.is_empty() {
        writeln!(out, "\nNo changes to apply.")?;
        return Ok(());
    }
    if options.dry_run {
        writeln!(out, "\nDry run: no changes applied.")?;
        return Ok(());
    }
    if !options.assume_yes {
        writeln!(out)?;
        if !confirm(input, out, "Do you want to proceed with these changes?")? {
            writeln!(out, "{}", paint("Operation cancelled by user.", Some(Tint::Red)))?;
            bail!("operation cancelled by user");
        }
    }

    let outcome = apply(client, registry, &plan, out)?;
    write!(out, "{}", render_summary(&plan, &outcome))?;

    if outcome.failed > 0 {
        bail!("{} role update(s) failed", outcome.failed);
    }
    Ok(())
}
