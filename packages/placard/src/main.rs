use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::prelude::*;

use placard_core::error::ErrorResponse;
use placard_core::lifecycle::StaticAuthorizer;
use placard_core::{Authorizer, InventoryService, Principal, QueryError};

mod cli;
mod config;
mod db;
mod repository;

use crate::cli::{AdvertiserCommand, EventCommand, PlacementCommand};
use crate::config::PlacardConfig;
use crate::db::Database;
use crate::repository::{Collection, InventoryRepository};

#[derive(Parser)]
#[command(name = "placard")]
#[command(about = "Query and manage ad inventory: placements, advertisers, and their metrics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.placard)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Act as this principal (overrides `auth.principal`)
    #[arg(long = "as", global = true, value_name = "PRINCIPAL")]
    principal: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Placement queries and lifecycle
    #[command(subcommand)]
    Placement(PlacementCommand),

    /// Advertiser queries and lifecycle
    #[command(subcommand)]
    Advertiser(AdvertiserCommand),

    /// Analytics event log
    #[command(subcommand)]
    Event(EventCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "placard=debug,placard_core=debug,info"
    } else {
        "placard=info,placard_core=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    // stdout carries the JSON result; logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<QueryError>() {
            Some(err) => {
                let response = ErrorResponse::from(err);
                match serde_json::to_string_pretty(&response) {
                    Ok(body) => println!("{body}"),
                    Err(_) => eprintln!("Error: {err}"),
                }
            }
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = PlacardConfig::new(cli.data_dir)?;
    let db = Database::new(&config).await?;
    let repo = Arc::new(InventoryRepository::new(db.pool.clone()));

    let principal = cli
        .principal
        .or_else(|| config.file.auth.principal.clone());
    let authorizer: Arc<dyn Authorizer> = match principal {
        Some(id) => {
            debug!(principal = %id, "acting principal");
            Arc::new(StaticAuthorizer::allow(Principal::new(id)))
        }
        None => Arc::new(StaticAuthorizer::deny()),
    };

    let output = match cli.command {
        Commands::Migrate => json!({ "schema_version": db.schema_version().await? }),
        Commands::Placement(command) => {
            let service = service(&repo, &authorizer, &config);
            cli::placement_command(&service, command).await?
        }
        Commands::Advertiser(command) => {
            let service = service(&repo, &authorizer, &config);
            cli::advertiser_command(&service, command).await?
        }
        Commands::Event(command) => cli::event_command(&repo, command).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// One service per entity kind, all backed by the same repository.
fn service<E: Collection>(
    repo: &Arc<InventoryRepository>,
    authorizer: &Arc<dyn Authorizer>,
    config: &PlacardConfig,
) -> InventoryService<E> {
    InventoryService::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        Arc::clone(authorizer),
    )
    .with_limits(config.pagination_limits())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_paged_listing() {
        let cli = Cli::try_parse_from([
            "placard",
            "--as",
            "alice",
            "placement",
            "list",
            "--filter",
            "publisher_id=pub-1",
            "--sort",
            "name",
            "--first",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.principal.as_deref(), Some("alice"));
        assert!(matches!(cli.command, Commands::Placement(PlacementCommand::Query(_))));
    }

    #[test]
    fn rejects_unknown_event_kind() {
        let parsed = Cli::try_parse_from(["placard", "event", "record", "hover", "p1"]);
        assert!(parsed.is_err());
    }
}
