//! CLI entry point for codex.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use codex_core::{Deadline, QueryDescriptor, Table};
use codex_graph::QueryMode;
use codex_kg::{CodexConfig, CodexKg};

#[derive(Parser)]
#[command(name = "codex")]
#[command(about = "Load tables into a typed graph schema and query it")]
struct Cli {
    /// Config file prefix (default: codex).
    #[arg(short, long, default_value = "codex")]
    config: String,

    /// Deadline per operation in seconds (overrides query_timeout_secs).
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List keyspaces in the graph store.
    Keyspaces,

    /// Open (or create) a namespace and print its schema snapshot.
    Open { keyspace: String },

    /// Delete a namespace from the graph store and the cache.
    Delete { keyspace: String },

    /// Load an entity table given as JSON `{"columns": [...], "rows": [[...]]}`.
    LoadEntity {
        keyspace: String,
        name: String,
        /// Path to the table JSON file.
        #[arg(short, long)]
        file: PathBuf,
        /// Key column.
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Load a relationship table whose first two columns hold the key values
    /// of the entity1 and entity2 players.
    LoadRelationship {
        keyspace: String,
        name: String,
        entity1: String,
        entity2: String,
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Run a structured query descriptor given as JSON.
    Query {
        keyspace: String,
        /// Path to the descriptor JSON file.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Send a Cypher statement to the graph store unchanged.
    Raw {
        keyspace: String,
        statement: String,
        /// Execution mode: read or write.
        #[arg(short, long, default_value = "read")]
        mode: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = CodexConfig::load(&cli.config)?;
    let deadline = match cli.timeout {
        Some(secs) => Deadline::from_secs(Some(secs)),
        None => config.deadline(),
    };
    let codex = CodexKg::from_config(&config)?;

    match cli.command {
        Command::Keyspaces => print_json(&codex.list_keyspaces(deadline).await?)?,
        Command::Open { keyspace } => {
            let ns = codex.open_namespace(&keyspace, deadline).await?;
            print_json(&ns.snapshot().await)?;
            codex.close_namespace(ns);
        }
        Command::Delete { keyspace } => {
            codex.delete_namespace(&keyspace, deadline).await?;
        }
        Command::LoadEntity {
            keyspace,
            name,
            file,
            key,
        } => {
            let table: Table = read_json(&file)?;
            let ns = codex.open_namespace(&keyspace, deadline).await?;
            let report = codex
                .load_entity(&ns, &table, &name, key.as_deref(), deadline)
                .await?;
            print_json(&report)?;
        }
        Command::LoadRelationship {
            keyspace,
            name,
            entity1,
            entity2,
            file,
        } => {
            let table: Table = read_json(&file)?;
            let ns = codex.open_namespace(&keyspace, deadline).await?;
            let report = codex
                .load_relationship(&ns, &table, &name, &entity1, &entity2, deadline)
                .await?;
            print_json(&report)?;
        }
        Command::Query { keyspace, file } => {
            let descriptor: QueryDescriptor = read_json(&file)?;
            let ns = codex.open_namespace(&keyspace, deadline).await?;
            print_json(&codex.run_query(&ns, &descriptor, deadline).await?)?;
        }
        Command::Raw {
            keyspace,
            statement,
            mode,
        } => {
            let mode: QueryMode = mode.parse()?;
            let ns = codex.open_namespace(&keyspace, deadline).await?;
            print_json(&codex.run_raw(&ns, &statement, mode, deadline).await?)?;
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
