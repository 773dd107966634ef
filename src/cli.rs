use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::destination::exporter::Exporter;
use crate::destination::store::{IdMap, ATTACHMENT_MAP_FILE};
use crate::providers::azure::AzureClient;
use crate::providers::redmine::RedmineClient;
use crate::source::importer::Importer;

/// Migrate Redmine issues into Azure DevOps Boards
#[derive(Parser, Debug)]
#[command(name = "tracker-migrate", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: ~/.tracker-migrate/config.toml)
    #[arg(long, global = true, env = "TRACKER_MIGRATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dump Redmine issues into the snapshot directory
    Import {
        /// Stop listing after this many issues
        #[arg(long)]
        limit: Option<usize>,

        /// Dump only these issue ids instead of listing the project
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,
    },

    /// Recreate dumped issues as Azure DevOps work items
    Export {
        /// Restrict the export to these issue ids
        #[arg(long = "only", value_name = "ID")]
        only: Vec<String>,

        /// Pass to run
        #[arg(long, value_enum, default_value_t = Phase::All)]
        phase: Phase,
    },

    /// Show how far the migration has progressed
    Status,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Create, upload attachments, then patch
    All,
    Create,
    Attachments,
    Patch,
}

pub async fn run(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Import { limit, ids } => handle_import(config, limit, ids).await,
        Commands::Export { only, phase } => handle_export(config, only, phase).await,
        Commands::Status => handle_status(config),
    }
}

async fn handle_import(config: &AppConfig, limit: Option<usize>, ids: Vec<String>) -> Result<()> {
    let api = Box::new(RedmineClient::new(&config.source));
    let mut importer = Importer::new(api, &config.source);

    if !ids.is_empty() {
        importer = importer.with_issues(ids);
    } else if !importer.list_issues(limit).await {
        bail!("Listing issues of project '{}' failed", config.source.project);
    }

    let dumped = importer.dump().await;
    println!(
        "Dumped {dumped} of {} issues into {}",
        importer.issues.len(),
        config.source.dump_dir.display()
    );
    Ok(())
}

async fn handle_export(config: &AppConfig, only: Vec<String>, phase: Phase) -> Result<()> {
    let api = Box::new(AzureClient::new(&config.destination));
    let mut exporter = Exporter::new(api, config.source.dump_dir.clone(), &config.destination);

    let only = (!only.is_empty()).then_some(only);
    exporter
        .load(only.as_deref())
        .with_context(|| format!("Failed to load snapshots from {}", config.source.dump_dir.display()))?;

    match phase {
        Phase::All | Phase::Create => {
            if !exporter.create().await {
                bail!("Create pass did not complete; the identifier map was not updated");
            }
        }
        Phase::Attachments | Phase::Patch => {
            if !exporter.resume() {
                bail!("Run the create pass before {phase:?}");
            }
        }
    }
    if matches!(phase, Phase::All | Phase::Attachments) {
        exporter.attachments().await;
    }
    if matches!(phase, Phase::All | Phase::Patch) {
        exporter.patch().await;
    }

    println!(
        "Processed {} items, {} mapped to work items",
        exporter.items.len(),
        exporter.id_map.len()
    );
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub struct MigrationStatus {
    pub snapshots: usize,
    pub mapped: usize,
    pub attachment_maps: usize,
}

fn count_dirs(dir: &Path, keep: impl Fn(&Path) -> bool) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir() && keep(p))
                .count()
        })
        .unwrap_or(0)
}

pub fn migration_status(config: &AppConfig) -> Result<MigrationStatus> {
    let mut id_map = IdMap::new(&config.destination.working_dir);
    id_map.load()?;
    Ok(MigrationStatus {
        snapshots: count_dirs(&config.source.dump_dir, |_| true),
        mapped: id_map.len(),
        attachment_maps: count_dirs(&config.destination.working_dir, |p| {
            p.join(ATTACHMENT_MAP_FILE).exists()
        }),
    })
}

fn handle_status(config: &AppConfig) -> Result<()> {
    let status = migration_status(config)?;
    println!("Snapshots:        {}", status.snapshots);
    println!("Mapped items:     {}", status.mapped);
    println!("Attachment maps:  {}", status.attachment_maps);
    Ok(())
}
