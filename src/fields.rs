use anyhow::{Context, Result, bail};
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::client::ApiClient;
use crate::model::{Field, FieldOption};
use crate::prompt::confirm;
use crate::style::{Tint, paint};

pub const OPTION_TYPES: [&str; 4] = ["select", "dropdown", "single-select", "multi-select"];

pub fn supports_options(type_id: &str) -> bool {
    OPTION_TYPES.contains(&type_id)
}

/// Exact name match wins over a case-insensitive one.
pub fn find_field(client: &ApiClient, name: &str) -> Result<Option<Field>> {
    let fields: Vec<Field> = client
        .fetch_all_pages("/api/fields/search", &json!({}))
        .context("searching fields")?;
    tracing::debug!(fields = fields.len(), "fetched fields");

    if let Some(pos) = fields.iter().position(|f| f.name == name) {
        return Ok(fields.into_iter().nth(pos));
    }
    let lowered = name.to_lowercase();
    Ok(fields
        .into_iter()
        .find(|f| f.name.to_lowercase() == lowered))
}

pub fn update_field(client: &ApiClient, field: &Field) -> Result<()> {
    let response = client
        .put_json(&format!("/api/fields/{}", field.id), field)
        .with_context(|| format!("updating field {}", field.name))?;
    tracing::debug!(status = response.status, "field updated");
    Ok(())
}

pub fn options_file_name(field_name: &str) -> String {
    format!("field_{}_options.txt", field_name.replace(' ', ""))
}

pub fn save_options(dir: &Path, field: &Field) -> Result<PathBuf> {
    let path = dir.join(options_file_name(&field.name));
    let contents: String = field
        .settings
        .options
        .iter()
        .map(|opt| format!("{}\n", opt.name))
        .collect();
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// One option per line; surrounding blanks and empty lines are dropped.
pub fn read_option_names(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Input file '{}' could not be read", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Names from `input` that the field does not have yet, in input order.
pub fn plan_additions(field: &Field, input: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = field
        .settings
        .options
        .iter()
        .map(|o| o.name.as_str())
        .collect();
    input
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reorder {
    pub options: Vec<FieldOption>,
    pub positioned: usize,
    pub kept_at_end: usize,
    pub unknown: Vec<String>,
}

pub fn plan_reorder(field: &Field, input: &[String]) -> Reorder {
    let current = &field.settings.options;
    let mut used = vec![false; current.len()];
    let mut options = Vec::with_capacity(current.len());
    let mut unknown = Vec::new();

    for name in input {
        match current
            .iter()
            .enumerate()
            .position(|(i, o)| !used[i] && &o.name == name)
        {
            Some(i) => {
                used[i] = true;
                options.push(current[i].clone());
            }
            None if current.iter().any(|o| &o.name == name) => {}
            None => unknown.push(name.clone()),
        }
    }

    let positioned = options.len();
    options.extend(
        current
            .iter()
            .zip(&used)
            .filter(|&(_, &u)| !u)
            .map(|(o, _)| o.clone()),
    );

    Reorder {
        kept_at_end: options.len() - positioned,
        options,
        positioned,
        unknown,
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldRequest {
    pub field: String,
    pub input: Option<PathBuf>,
    pub reorder: bool,
    pub show_ids: bool,
    pub dry_run: bool,
    pub assume_yes: bool,
    pub output_dir: PathBuf,
}

pub fn run<R: BufRead, W: Write>(
    client: &ApiClient,
    request: &FieldRequest,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    if request.reorder && request.input.is_none() {
        bail!("--reorder requires --input to specify the desired order.");
    }

    let name = &request.field;
    let Some(mut field) = find_field(client, name)? else {
        bail!("Field '{name}' not found.");
    };
    if !supports_options(&field.type_id) {
        bail!(
            "Field '{name}' (type: {}) does not support options. Only select/dropdown fields support option management.",
            field.type_id
        );
    }

    let current = &field.settings.options;
    writeln!(
        out,
        "\nCurrent options for field '{name}' ({} total):",
        current.len()
    )?;
    if current.is_empty() {
        writeln!(out, "  (No options defined)")?;
    }
    for (i, opt) in current.iter().enumerate() {
        if request.show_ids {
            writeln!(
                out,
                "  {}. {} [ID: {}]",
                i + 1,
                opt.name,
                opt.id.as_deref().unwrap_or("N/A")
            )?;
        } else {
            writeln!(out, "  {}. {}", i + 1, opt.name)?;
        }
    }

    let saved = save_options(&request.output_dir, &field)?;
    writeln!(
        out,
        "\nSaved {} existing options to '{}'.",
        current.len(),
        saved.display()
    )?;

    let Some(input_path) = &request.input else {
        writeln!(out, "\nDone.")?;
        return Ok(());
    };
    let names = read_option_names(input_path)?;

    if request.reorder {
        let plan = plan_reorder(&field, &names);
        writeln!(out, "\n{}", paint("--- REORDER MODE ---", Some(Tint::Cyan)))?;
        writeln!(
            out,
            "Will reorder options based on the order in '{}'",
            input_path.display()
        )?;
        writeln!(out, "\nNew order ({} options):", plan.positioned)?;
        for (i, opt) in plan.options[..plan.positioned].iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, opt.name)?;
        }
        if plan.kept_at_end > 0 {
            writeln!(
                out,
                "\nOptions not in input file will be appended at the end ({} options):",
                plan.kept_at_end
            )?;
            for opt in &plan.options[plan.positioned..] {
                writeln!(out, "  - {}", opt.name)?;
            }
        }
        if !plan.unknown.is_empty() {
            writeln!(
                out,
                "\n{}",
                paint(
                    "Warning: The following options from input file do not exist and will be ignored:",
                    Some(Tint::Yellow)
                )
            )?;
            for missing in &plan.unknown {
                writeln!(out, "  - {missing}")?;
            }
        }

        if !proceed(request, input, out, "Proceed with reordering?")? {
            return Ok(());
        }
        field.settings.options = plan.options;
        update_field(client, &field)?;
        writeln!(
            out,
            "\n{}",
            paint(&format!("Successfully reordered field '{name}'."), Some(Tint::Green))
        )?;
        writeln!(out, "  - {} options positioned as specified", plan.positioned)?;
        writeln!(out, "  - {} options kept at the end", plan.kept_at_end)?;
    } else {
        let additions = plan_additions(&field, &names);
        if additions.is_empty() {
            writeln!(
                out,
                "\nNo new options to add. All options from '{}' already exist in field '{name}'.",
                input_path.display()
            )?;
        } else {
            writeln!(out, "\n{}", paint("--- ADD MODE ---", Some(Tint::Cyan)))?;
            writeln!(
                out,
                "The following {} new option(s) will be added to field '{name}':",
                additions.len()
            )?;
            for opt in &additions {
                writeln!(out, "  - {opt}")?;
            }

            if !proceed(request, input, out, "Proceed with adding these options?")? {
                return Ok(());
            }
            field
                .settings
                .options
                .extend(additions.iter().map(|n| FieldOption::new(n)));
            update_field(client, &field)?;
            writeln!(
                out,
                "\n{}",
                paint(
                    &format!(
                        "Successfully added {} new option(s) to field '{name}'.",
                        additions.len()
                    ),
                    Some(Tint::Green)
                )
            )?;
        }
    }

    writeln!(out, "\nDone.")?;
    Ok(())
}

/// Dry run and a declined prompt both stop before the write.
fn proceed<R: BufRead, W: Write>(
    request: &FieldRequest,
    input: &mut R,
    out: &mut W,
    question: &str,
) -> Result<bool> {
    if request.dry_run {
        writeln!(out, "\nDry run: field not updated.")?;
        return Ok(false);
    }
    if request.assume_yes {
        return Ok(true);
    }
    writeln!(out)?;
    if confirm(input, out, question)? {
        return Ok(true);
    }
    writeln!(out, "Aborted by user.")?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::Value;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn field_json() -> Value {
        json!({
            "id": "f-1",
            "name": "Team Name",
            "typeId": "select",
            "settings": {"options": [
                {"id": "o-1", "name": "Core"},
                {"id": "o-2", "name": "Portal"},
                {"id": "o-3", "name": "Mobile"}
            ]}
        })
    }

    fn field() -> Field {
        serde_json::from_value(field_json()).unwrap()
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn search_mock(server: &MockServer, items: Value) {
        let total = items.as_array().map_or(0, Vec::len);
        server.mock(|when, then| {
            when.method(POST).path("/api/fields/search");
            then.status(200)
                .json_body(json!({"items": items, "totalItems": total}));
        });
    }

    #[test]
    fn option_types() {
        assert!(supports_options("multi-select"));
        assert!(!supports_options("text"));
        assert_eq!(options_file_name("Team Name"), "field_TeamName_options.txt");
    }

    #[test]
    fn additions_skip_existing_and_duplicates() {
        let add = plan_additions(&field(), &names(&["Web", "Core", "Data", "Web"]));
        assert_eq!(add, ["Web", "Data"]);
    }

    #[test]
    fn reorder_positions_named_options_first() {
        let plan = plan_reorder(&field(), &names(&["Mobile", "Ghost", "Core"]));
        let order: Vec<&str> = plan.options.iter().map(|o| o.name.as_str()).collect();

        assert_eq!(order, ["Mobile", "Core", "Portal"]);
        assert_eq!(plan.positioned, 2);
        assert_eq!(plan.kept_at_end, 1);
        assert_eq!(plan.unknown, ["Ghost"]);
        assert_eq!(plan.options[0].id.as_deref(), Some("o-3"));
    }

    #[test]
    fn reads_trimmed_nonblank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, "  Web \n\n\tData\n").unwrap();
        assert_eq!(read_option_names(&path).unwrap(), ["Web", "Data"]);
    }

    #[test]
    fn finds_field_case_insensitively_after_exact() {
        let server = MockServer::start();
        search_mock(
            &server,
            json!([
                {"id": "f-0", "name": "team name", "typeId": "select"},
                {"id": "f-1", "name": "Team Name", "typeId": "select"}
            ]),
        );
        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();

        assert_eq!(find_field(&client, "Team Name").unwrap().unwrap().id, "f-1");
        assert_eq!(find_field(&client, "TEAM NAME").unwrap().unwrap().id, "f-0");
        assert!(find_field(&client, "Other").unwrap().is_none());
    }

    #[test]
    fn add_mode_puts_full_field_with_appended_options() {
        let server = MockServer::start();
        search_mock(&server, json!([field_json()]));
        let put = server.mock(|when, then| {
            when.method(PUT).path("/api/fields/f-1").json_body(json!({
                "id": "f-1",
                "name": "Team Name",
                "typeId": "select",
                "settings": {"options": [
                    {"id": "o-1", "name": "Core"},
                    {"id": "o-2", "name": "Portal"},
                    {"id": "o-3", "name": "Mobile"},
                    {"name": "Web"}
                ]}
            }));
            then.status(200).json_body(json!({}));
        });
        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("in.txt");
        fs::write(&input_path, "Core\nWeb\n").unwrap();

        let request = FieldRequest {
            field: "Team Name".into(),
            input: Some(input_path),
            show_ids: true,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut out = Vec::new();
        run(&client, &request, &mut Cursor::new("y\n"), &mut out).unwrap();

        put.assert();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Current options for field 'Team Name' (3 total):"));
        assert!(text.contains("  2. Portal [ID: o-2]"));
        assert!(text.contains("The following 1 new option(s) will be added"));
        assert!(text.contains("Successfully added 1 new option(s)"));
        assert!(text.ends_with("\nDone.\n"));

        let saved = fs::read_to_string(dir.path().join("field_TeamName_options.txt")).unwrap();
        assert_eq!(saved, "Core\nPortal\nMobile\n");
    }

    #[test]
    fn declined_reorder_leaves_field_alone() {
        let server = MockServer::start();
        search_mock(&server, json!([field_json()]));
        let put = server.mock(|when, then| {
            when.method(PUT).path("/api/fields/f-1");
            then.status(200);
        });
        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("order.txt");
        fs::write(&input_path, "Mobile\n").unwrap();

        let request = FieldRequest {
            field: "Team Name".into(),
            input: Some(input_path),
            reorder: true,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut out = Vec::new();
        run(&client, &request, &mut Cursor::new("n\n"), &mut out).unwrap();

        put.assert_hits(0);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("New order (1 options):"));
        assert!(text.contains("appended at the end (2 options)"));
        assert!(text.contains("Aborted by user."));
    }

    #[test]
    fn reorder_writes_new_order() {
        let server = MockServer::start();
        search_mock(&server, json!([field_json()]));
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path("/api/fields/f-1")
                .json_body(json!({
                    "id": "f-1",
                    "name": "Team Name",
                    "typeId": "select",
                    "settings": {"options": [
                        {"id": "o-2", "name": "Portal"},
                        {"id": "o-1", "name": "Core"},
                        {"id": "o-3", "name": "Mobile"}
                    ]}
                }));
            then.status(200);
        });
        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("order.txt");
        fs::write(&input_path, "Portal\nCore\n").unwrap();

        let request = FieldRequest {
            field: "Team Name".into(),
            input: Some(input_path),
            reorder: true,
            assume_yes: true,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut out = Vec::new();
        run(&client, &request, &mut Cursor::new(""), &mut out).unwrap();

        put.assert();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  - 2 options positioned as specified"));
        assert!(text.contains("  - 1 options kept at the end"));
    }

    #[test]
    fn rejects_reorder_without_input_and_non_option_fields() {
        let server = MockServer::start();
        search_mock(&server, json!([{"id": "f-9", "name": "Notes", "typeId": "text"}]));
        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let dir = tempdir().unwrap();

        let reorder = FieldRequest {
            field: "Notes".into(),
            reorder: true,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let err = run(&client, &reorder, &mut Cursor::new(""), &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("--reorder requires --input"));

        let plain = FieldRequest {
            reorder: false,
            ..reorder
        };
        let err = run(&client, &plain, &mut Cursor::new(""), &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("(type: text) does not support options"));
    }
}
