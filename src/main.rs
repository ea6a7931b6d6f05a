mod access;
mod client;
mod compliance;
mod config;
mod extensions;
mod fields;
mod hierarchy;
mod license;
mod lookup;
mod model;
mod prompt;
mod registry;
mod report;
mod roles;
mod style;

use crate::client::ApiClient;
use crate::config::{Scope, resolve, save};
use crate::hierarchy::{build_folder_tree, build_workspace_tree, fetch_folders, fetch_relations};
use crate::license::LicenseUsage;
use crate::model::Role;
use crate::registry::Registry;
use crate::report::Report;
use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "afadmin",
    version,
    about = "Compliance reports, license accounting and bulk edits for an airfocus team"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "API key override for this invocation (otherwise read from config)"
    )]
    api_key: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Base URL for the API (defaults to https://app.airfocus.com)"
    )]
    base_url: Option<String>,

    #[arg(long, global = true, help = "Ignore TLS certificate verification errors")]
    no_verify_ssl: bool,

    #[arg(
        long,
        short = 'o',
        value_enum,
        default_value_t = OutputFormat::Pretty,
        global = true,
        help = "Output format (propagates to subcommands)"
    )]
    output: OutputFormat,

    #[arg(long, short = 'v', global = true, help = "Log requests and progress at debug level")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist an API key (and `--base-url`, `--no-verify-ssl` when given) to the chosen scope
    Configure {
        #[arg(long, visible_alias = "key")]
        apikey: String,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Show current configuration (secrets masked)
    ConfigShow,
    /// Validate stored credentials against the profile endpoint
    Validate,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
    /// Check OKR workspaces against the OKR permission rules
    OkrCompliance {
        #[arg(long, help = "Show every workspace and detail, not only violations")]
        all: bool,
    },
    /// Check product-management folders and workspaces
    ProdmgtCompliance {
        #[arg(long, help = "Show every folder, workspace and detail, not only violations")]
        all: bool,
    },
    /// Seat usage broken down by group membership
    License {
        #[arg(long, help = "List editors outside the groups with their direct access")]
        orphaned_editors: bool,
        #[arg(long, help = "Print role and group coverage counts")]
        debug: bool,
    },
    /// Contributor-role members of SP_OKR_/SP_ProdMgt_ groups or of one group
    Contributors {
        /// Group to inspect (default: all SP_OKR_ and SP_ProdMgt_ groups)
        group: Option<String>,
        #[arg(long, help = "Key the listing by user instead of group")]
        by_user: bool,
    },
    /// Promote contributors to editor or demote editors to contributor
    SetRole {
        #[arg(long, required_unless_present = "orphaned", conflicts_with = "orphaned")]
        group: Option<String>,
        #[arg(long, help = "Target editors outside the groups with no direct access")]
        orphaned: bool,
        #[arg(long, value_enum)]
        role: TargetRole,
        #[arg(long, help = "Show the planned changes without applying them")]
        dry_run: bool,
        #[arg(long, short = 'y', help = "Apply without asking for confirmation")]
        yes: bool,
    },
    /// Show, add or reorder the options of a select field
    FieldOptions {
        #[arg(long)]
        field: String,
        #[arg(long, value_name = "FILE", help = "Options file, one per line")]
        input: Option<PathBuf>,
        #[arg(long, requires = "input", help = "Reorder existing options to follow --input")]
        reorder: bool,
        #[arg(long, help = "Display option IDs alongside names")]
        show_ids: bool,
        #[arg(long, help = "Show what would change without writing")]
        dry_run: bool,
        #[arg(long, short = 'y', help = "Apply without asking for confirmation")]
        yes: bool,
    },
    /// Look up workspace IDs by name
    FindWorkspace {
        #[arg(long)]
        name: String,
        #[arg(long, help = "Match case-insensitive substrings")]
        partial: bool,
    },
    /// Print config lines for every user group granted on a workspace
    GroupIds,
    /// Workspace extensions (apps)
    #[command(subcommand)]
    Extensions(ExtensionsCommand),
}

#[derive(Subcommand)]
enum ExtensionsCommand {
    /// List the apps available for an extension type
    List {
        #[arg(long = "type", value_name = "TYPE")]
        extension_type: String,
    },
    /// Install an extension on every workspace of a folder
    Install {
        #[arg(long)]
        folder: String,
        #[arg(long = "type", value_name = "TYPE")]
        extension_type: String,
        #[arg(long, help = "App to install (defaults to the first app of the type)")]
        app_id: Option<String>,
        #[arg(
            long,
            value_name = "A,B",
            help = "Objective workspaces to link, by UUID or exact name (required for okr)"
        )]
        objective_workspaces: Option<String>,
        #[arg(long, help = "Show the installation plan without applying it")]
        dry_run: bool,
        #[arg(long, short = 'y', help = "Apply without asking for confirmation")]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TargetRole {
    Editor,
    Contributor,
}

impl From<TargetRole> for Role {
    fn from(value: TargetRole) -> Self {
        match value {
            TargetRole::Editor => Role::Editor,
            TargetRole::Contributor => Role::Contributor,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "afadmin=debug" } else { "afadmin=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cwd = std::env::current_dir().context("reading current directory")?;

    if let Commands::Configure { apikey, scope } = &cli.command {
        let mut existing = config::load_scope((*scope).into(), &cwd)?;
        existing.api_key = Some(apikey.clone());
        if let Some(url) = cli.base_url.clone() {
            existing.base_url = Some(url);
        }
        if cli.no_verify_ssl {
            existing.verify_ssl = Some(false);
        }

        let path = save((*scope).into(), &existing, &cwd)?;
        println!("Saved API key to {}", path.display());
        return Ok(());
    }

    match &cli.command {
        Commands::ConfigShow => {
            let mut masked = config::load(&cwd)?;
            if masked.api_key.is_some() {
                masked.api_key = Some("*****".into());
            }
            println!("{}", serde_json::to_string_pretty(&masked)?);
            return Ok(());
        }
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin, &mut io::stdout()),
                CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin, &mut io::stdout()),
                CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin, &mut io::stdout()),
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut io::stdout())
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let effective = resolve(
        &cwd,
        cli.api_key.clone(),
        cli.base_url.clone(),
        cli.no_verify_ssl,
    )?;
    let client = ApiClient::new(&effective.base_url, &effective.api_key, effective.verify_tls)?;
    let load_registry = || Registry::load(&client, effective.usergroup_names.clone());

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Validate => {
            println!("Validating credentials against {}...", effective.base_url);
            match client.get("/api/profile", &[]) {
                Ok(response) => println!("airfocus API: ok (HTTP {})", response.status),
                Err(e) => {
                    println!("airfocus API: FAILED ({e})");
                    bail!("credential validation failed");
                }
            }
        }
        Commands::OkrCompliance { all } => {
            let registry = load_registry()?;
            let current_user = client.current_user_id()?;
            let relations = fetch_relations(&client)?;
            let tree = build_workspace_tree(registry.workspaces(), &relations);
            let report = report::okr_report(&tree, &registry, &current_user);
            write_report(&mut out, &report, cli.output, all)?;
        }
        Commands::ProdmgtCompliance { all } => {
            let registry = load_registry()?;
            let current_user = client.current_user_id()?;
            let (summaries, details) = fetch_folders(&client)?;
            let tree = build_folder_tree(registry.workspaces(), &summaries, &details);
            let report = report::prodmgt_report(&tree, &registry, &current_user);
            write_report(&mut out, &report, cli.output, all)?;
        }
        Commands::License {
            orphaned_editors,
            debug,
        } => {
            let registry = load_registry()?;
            let seats = client.team_info()?.seats();
            let usage = LicenseUsage::analyze(&registry, seats);

            if cli.output == OutputFormat::Json {
                write_json(&mut out, &usage)?;
                return Ok(());
            }
            write!(out, "{usage}")?;
            if debug {
                let summary = license::DebugSummary {
                    registry: &registry,
                    usage: &usage,
                };
                write!(out, "{summary}")?;
            }
            if orphaned_editors {
                let (summaries, details) = fetch_folders(&client)?;
                let tree = build_folder_tree(registry.workspaces(), &summaries, &details);
                let editors = license::OrphanedEditors {
                    registry: &registry,
                    usage: &usage,
                    tree: &tree,
                };
                write!(out, "{editors}")?;
            }
        }
        Commands::Contributors { group, by_user } => {
            let registry = load_registry()?;
            let listing = lookup::contributors(&registry, group.as_deref(), by_user)?;
            match cli.output {
                OutputFormat::Json => write_json(&mut out, &listing)?,
                OutputFormat::Pretty => {
                    let text = lookup::ContributorListing {
                        listing: &listing,
                        group: group.as_deref(),
                    };
                    write!(out, "{text}")?
                }
            }
        }
        Commands::SetRole {
            group,
            orphaned,
            role,
            dry_run,
            yes,
        } => {
            let source = match (group, orphaned) {
                (_, true) => roles::Source::Orphaned,
                (Some(name), false) => roles::Source::Group(name),
                (None, false) => bail!("pass --group or --orphaned"),
            };
            let mut registry = load_registry()?;
            roles::run(
                &client,
                &mut registry,
                &source,
                role.into(),
                roles::RunOptions {
                    dry_run,
                    assume_yes: yes,
                },
                &mut input,
                &mut out,
            )?;
        }
        Commands::FieldOptions {
            field,
            input: input_file,
            reorder,
            show_ids,
            dry_run,
            yes,
        } => {
            let request = fields::FieldRequest {
                field,
                input: input_file,
                reorder,
                show_ids,
                dry_run,
                assume_yes: yes,
                output_dir: cwd.clone(),
            };
            fields::run(&client, &request, &mut input, &mut out)?;
        }
        Commands::FindWorkspace { name, partial } => {
            let registry = load_registry()?;
            let matches = registry.find_workspaces(&name, partial);
            match cli.output {
                OutputFormat::Json => write_json(&mut out, &matches)?,
                OutputFormat::Pretty => write!(
                    out,
                    "{}",
                    lookup::WorkspaceMatches {
                        name: &name,
                        partial,
                        matches: &matches,
                    }
                )?,
            }
        }
        Commands::GroupIds => {
            let registry = load_registry()?;
            write!(out, "{}", lookup::GroupIds(&registry))?;
        }
        Commands::Extensions(command) => match command {
            ExtensionsCommand::List { extension_type } => {
                tracing::info!("Fetching {extension_type} extensions...");
                let apps = extensions::list_apps(&client, &extension_type)?;
                match cli.output {
                    OutputFormat::Json => write_json(&mut out, &apps)?,
                    OutputFormat::Pretty => {
                        write!(out, "{}", extensions::render_apps(&extension_type, &apps)?)?
                    }
                }
            }
            ExtensionsCommand::Install {
                folder,
                extension_type,
                app_id,
                objective_workspaces,
                dry_run,
                yes,
            } => {
                let registry = load_registry()?;
                let request = extensions::InstallRequest {
                    folder,
                    extension_type,
                    app_id,
                    objective_workspaces,
                    dry_run,
                    assume_yes: yes,
                };
                extensions::run_install(&client, &registry, &request, &mut input, &mut out)?;
            }
        },
        Commands::Configure { .. } | Commands::ConfigShow | Commands::Completion { .. } => {
            unreachable!("handled earlier")
        }
    }

    Ok(())
}

fn write_report<W: Write>(
    out: &mut W,
    report: &Report,
    format: OutputFormat,
    show_all: bool,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(out, report),
        OutputFormat::Pretty => {
            write!(out, "{}", report.render(show_all))?;
            if !show_all {
                tracing::info!(flagged = report.flagged_count(), "compliance check finished");
            }
            Ok(())
        }
    }
}

fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing output")?;
    writeln!(out, "{text}")?;
    Ok(())
}
