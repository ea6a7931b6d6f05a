use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use std::io::{BufRead, Write};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::hierarchy::fetch_folders;
use crate::model::{ExtensionApp, Page};
use crate::prompt::confirm;
use crate::registry::Registry;
use crate::style::{Tint, paint};

const RULE: &str = "============================================================";

pub fn list_apps(client: &ApiClient, extension_type: &str) -> Result<Vec<ExtensionApp>> {
    let response = client
        .get(
            &format!("/api/workspaces/extensions/apps/{extension_type}/list"),
            &[],
        )
        .with_context(|| format!("listing {extension_type} extensions"))?;
    if let Some(json) = &response.json {
        tracing::debug!(%json, "extension list");
    }
    let page: Page<ExtensionApp> = response.decode()?;
    Ok(page.items)
}

pub fn render_apps(extension_type: &str, apps: &[ExtensionApp]) -> Result<String> {
    if apps.is_empty() {
        return Ok(format!("No {extension_type} extensions found.\n"));
    }
    let mut out = format!(
        "\n{RULE}\nAvailable {} Extensions\n{RULE}\n\n",
        extension_type.to_uppercase()
    );
    for (i, app) in apps.iter().enumerate() {
        out.push_str(&format!("Extension {}:\n", i + 1));
        out.push_str(&serde_json::to_string_pretty(app).context("formatting extension")?);
        out.push_str("\n\n");
    }
    out.push_str(&format!(
        "{RULE}\nTotal: {} extension(s) found\n\nUse the ID with:\n  afadmin extensions install --app-id <ID> --folder <FOLDER> --type {extension_type}\n",
        apps.len()
    ));
    Ok(out)
}

/// Splits a comma list into workspace ids: UUIDs are taken as they are,
/// anything else is looked up by exact name. Unknown names come back in
/// the second vector.
pub fn resolve_objectives(registry: &Registry, raw: &str) -> Result<(Vec<String>, Vec<String>)> {
    let mut ids = Vec::new();
    let mut unknown = Vec::new();
    for identifier in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if Uuid::parse_str(identifier).is_ok() {
            ids.push(identifier.to_string());
            continue;
        }
        match registry.workspace_id_by_name(identifier, true)? {
            Some(id) => {
                tracing::debug!("resolved '{identifier}' to workspace {id}");
                ids.push(id);
            }
            None => unknown.push(identifier.to_string()),
        }
    }
    Ok((ids, unknown))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub id: String,
    pub name: String,
}

/// Member workspaces of the folder named `folder`.
pub fn folder_workspaces(client: &ApiClient, registry: &Registry, folder: &str) -> Result<Vec<Target>> {
    let (summaries, details) = fetch_folders(client)?;
    let Some(summary) = summaries
        .iter()
        .find(|f| f.name.as_deref() == Some(folder))
    else {
        bail!("Folder '{folder}' not found.");
    };

    Ok(details
        .iter()
        .filter(|d| d.id == summary.id)
        .flat_map(|d| &d.embedded.workspaces)
        .map(|r| Target {
            id: r.id.clone(),
            name: registry
                .workspace(&r.id)
                .map_or("Unknown", |w| w.display_name())
                .to_string(),
        })
        .collect())
}

pub fn install(
    client: &ApiClient,
    extension_type: &str,
    app_id: &str,
    workspace_id: &str,
    objectives: &[String],
) -> Result<Option<Value>> {
    let path = format!(
        "/api/workspaces/extensions/apps/{extension_type}/{app_id}/linked-workspaces/{workspace_id}/objective-workspaces"
    );
    client.post_json(&path, &[], Some(objectives))?.decode()
}

#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub folder: String,
    pub extension_type: String,
    pub app_id: Option<String>,
    pub objective_workspaces: Option<String>,
    pub dry_run: bool,
    pub assume_yes: bool,
}

pub fn run_install<R: BufRead, W: Write>(
    client: &ApiClient,
    registry: &Registry,
    request: &InstallRequest,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let ext = request.extension_type.as_str();
    let is_okr = ext.eq_ignore_ascii_case("okr");
    if is_okr && request.objective_workspaces.is_none() {
        bail!(
            "OKR extension requires at least one objective workspace; pass --objective-workspaces"
        );
    }

    let red = Some(Tint::Red);
    if is_okr {
        writeln!(out, "{}", paint("\nWARNING: OKR Extension Replacement Behavior", red))?;
        writeln!(out, "{}", paint(RULE, red))?;
        writeln!(
            out,
            "{}",
            paint(
                "Linked objective workspaces of an installed OKR extension are REPLACED, not added to.",
                red
            )
        )?;
        writeln!(out, "{}\n", paint(RULE, red))?;
    }

    let app_id = match &request.app_id {
        Some(id) => id.clone(),
        None => {
            let apps = list_apps(client, ext)?;
            let Some(first) = apps.into_iter().next() else {
                bail!("No app found for extension type '{ext}'");
            };
            writeln!(out, "{}", paint(&format!("Found app ID: {}", first.id), Some(Tint::Green)))?;
            first.id
        }
    };

    let objectives = match &request.objective_workspaces {
        Some(raw) => {
            let (ids, unknown) = resolve_objectives(registry, raw)?;
            for name in unknown {
                writeln!(
                    out,
                    "{}",
                    paint(&format!("Warning: Workspace '{name}' not found. Skipping."), Some(Tint::Yellow))
                )?;
            }
            ids
        }
        None => Vec::new(),
    };
    if is_okr && objectives.is_empty() {
        bail!("none of the objective workspaces could be resolved");
    }

    let targets = folder_workspaces(client, registry, &request.folder)?;
    if targets.is_empty() {
        writeln!(
            out,
            "{}",
            paint(&format!("No workspaces found in folder '{}'", request.folder), Some(Tint::Yellow))
        )?;
        return Ok(());
    }

    let blue = Some(Tint::Blue);
    let cyan = Some(Tint::Cyan);
    writeln!(out, "\n{RULE}\n{}\n{RULE}", paint("Extension Installation Summary", cyan))?;
    writeln!(out, "Extension Type: {}", paint(ext, blue))?;
    writeln!(out, "App ID: {}", paint(&app_id, blue))?;
    writeln!(out, "Target Folder: {}", paint(&request.folder, blue))?;
    writeln!(out, "Workspaces to process: {}\n", paint(&targets.len().to_string(), blue))?;
    writeln!(out, "{}", paint("Target workspaces:", cyan))?;
    for (i, target) in targets.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, target.name)?;
    }
    if !objectives.is_empty() {
        writeln!(
            out,
            "\n{}",
            paint(&format!("Objective workspaces to link ({}):", objectives.len()), cyan)
        )?;
        for id in &objectives {
            writeln!(out, "  - {} ({id})", paint(registry.workspace_name(id), blue))?;
        }
    }
    writeln!(out, "\n{RULE}")?;

    if request.dry_run {
        writeln!(out, "\nDry run: nothing installed.")?;
        return Ok(());
    }
    if !request.assume_yes && !confirm(input, out, "\nProceed with extension installation?")? {
        writeln!(out, "{}", paint("Operation cancelled.", Some(Tint::Yellow)))?;
        return Ok(());
    }

    writeln!(out, "{}\n{RULE}", paint("\nInstalling extension on workspaces...", cyan))?;
    let mut failures: Vec<(&Target, String)> = Vec::new();
    for (i, target) in targets.iter().enumerate() {
        writeln!(
            out,
            "\n[{}/{}] Processing: {}",
            i + 1,
            targets.len(),
            paint(&target.name, blue)
        )?;
        match install(client, ext, &app_id, &target.id, &objectives) {
            Ok(response) => {
                tracing::debug!(workspace = %target.id, ?response, "extension installed");
                writeln!(out, "{}", paint("  ✓ Success", Some(Tint::Green)))?;
            }
            Err(err) => {
                writeln!(out, "{}", paint(&format!("  ✗ Failed: {err:#}"), red))?;
                failures.push((target, format!("{err:#}")));
            }
        }
    }

    let succeeded = targets.len() - failures.len();
    writeln!(out, "\n{RULE}\n{}\n{RULE}", paint("Installation Complete", cyan))?;
    writeln!(out, "Total workspaces processed: {}", targets.len())?;
    writeln!(
        out,
        "Successful installations: {}",
        paint(&succeeded.to_string(), Some(Tint::Green))
    )?;
    writeln!(
        out,
        "Failed installations: {}",
        paint(
            &failures.len().to_string(),
            if failures.is_empty() { None } else { red }
        )
    )?;

    if failures.is_empty() {
        return Ok(());
    }
    writeln!(out, "\n{RULE}\n{}\n{RULE}", paint("Failed Installations Details:", red))?;
    for (target, error) in &failures {
        writeln!(out, "\nWorkspace: {}", paint(&target.name, Some(Tint::Yellow)))?;
        writeln!(out, "ID: {}", target.id)?;
        writeln!(out, "Error: {}", paint(error, red))?;
    }
    bail!("{} extension install(s) failed", failures.len());
}
