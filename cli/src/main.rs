use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use chrono::Utc;
use clap::Parser;
use clap::Subcommand;
use todu_core::IdRegistry;
use todu_core::ProjectEntry;
use todu_core::ProjectRegistry;
use todu_core::RecordStore;
use todu_core::Resolution;
use todu_core::Resolver;
use todu_core::StorageConfig;
use todu_core::System;
use todu_core::recurring::get_completion_history;
use tracing_subscriber::EnvFilter;

/// Query the unified task cache.
#[derive(Parser)]
#[command(name = "todu", version, about)]
struct Cli {
    /// Storage home directory. Defaults to ~/.local/todu.
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve an identifier (unified id, "system #N", or title text) to a
    /// stored record.
    Resolve { identifier: String },
    /// Print the full stored record for an identifier.
    Show { identifier: String },
    /// Print the completion history of a recurring series.
    History { identifier: String },
    /// Print id registry counters.
    Stats,
    /// Manage registered projects.
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },
}

#[derive(Subcommand)]
enum ProjectsCommand {
    /// List registered projects with their sync metadata.
    List,
    /// Register a project under a nickname.
    Add {
        nickname: String,
        /// External system: github, forgejo, or todoist.
        system: String,
        /// Repository (owner/name) or provider project id.
        repo: String,
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },
    /// Drop a registered project.
    Remove { nickname: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", serde_json::json!({ "error": format!("{err:#}") }));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = match &cli.home {
        Some(home) => StorageConfig::new(home),
        None => StorageConfig::from_home_dir()?,
    };
    let store = RecordStore::new(&config);
    let registry = IdRegistry::new(config.registry_path());
    let projects = ProjectRegistry::new(config.projects_path());

    match &cli.command {
        Command::Resolve { identifier } => {
            let resolver = Resolver::new(&registry, &store);
            match resolver.resolve(identifier)? {
                Resolution::Match(resolved) => {
                    println!("{}", serde_json::to_string_pretty(&resolved)?);
                    Ok(ExitCode::SUCCESS)
                }
                Resolution::Ambiguous { candidates } => {
                    println!("{}", serde_json::to_string_pretty(&candidates)?);
                    eprintln!(
                        "{}",
                        serde_json::json!({
                            "error": format!("{identifier:?} matches {} tasks", candidates.len())
                        })
                    );
                    Ok(ExitCode::from(2))
                }
                Resolution::NotFound => Err(anyhow!("no task matches {identifier:?}")),
            }
        }
        Command::Show { identifier } => {
            let record = resolve_record(&registry, &store, identifier)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::History { identifier } => {
            let record = resolve_record(&registry, &store, identifier)?;
            let history = get_completion_history(&store, record.system, &record.system_data)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats => {
            let stats = registry.stats().context("failed to read id registry")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Projects { command } => run_projects(&projects, command),
    }
}

/// Resolve an identifier all the way to its stored record, treating
/// ambiguity as an error (list commands already show candidates).
fn resolve_record(
    registry: &IdRegistry,
    store: &RecordStore,
    identifier: &str,
) -> Result<todu_core::TaskRecord> {
    let resolver = Resolver::new(registry, store);
    let resolved = match resolver.resolve(identifier)? {
        Resolution::Match(resolved) => resolved,
        Resolution::Ambiguous { candidates } => {
            return Err(anyhow!(
                "{identifier:?} matches {} tasks; use a unified id",
                candidates.len()
            ));
        }
        Resolution::NotFound => return Err(anyhow!("no task matches {identifier:?}")),
    };
    let filename = resolved
        .filename
        .as_deref()
        .ok_or_else(|| anyhow!("resolved task has no stored record"))?;
    store
        .load(filename)?
        .ok_or_else(|| anyhow!("stored record {filename} is missing"))
}

fn run_projects(projects: &ProjectRegistry, command: &ProjectsCommand) -> Result<ExitCode> {
    match command {
        ProjectsCommand::List => {
            println!("{}", serde_json::to_string_pretty(&projects.all())?);
            Ok(ExitCode::SUCCESS)
        }
        ProjectsCommand::Add {
            nickname,
            system,
            repo,
            base_url,
        } => {
            let system = System::parse(system)
                .ok_or_else(|| anyhow!("unknown system {system:?}; expected github, forgejo, or todoist"))?;
            projects.add(
                nickname,
                ProjectEntry {
                    system,
                    repo: repo.clone(),
                    base_url: base_url.clone(),
                    added_at: Some(Utc::now()),
                    last_sync: None,
                    last_sync_mode: None,
                    task_count: None,
                    stats: None,
                },
            )?;
            println!(
                "{}",
                serde_json::json!({ "added": nickname, "system": system, "repo": repo })
            );
            Ok(ExitCode::SUCCESS)
        }
        ProjectsCommand::Remove { nickname } => {
            if projects.remove(nickname)? {
                println!("{}", serde_json::json!({ "removed": nickname }));
                Ok(ExitCode::SUCCESS)
            } else {
                Err(anyhow!("no project named {nickname:?}"))
            }
        }
    }
}
