//! CLI commands: thin adapters over the extraction core and the store.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::CodeAtlasConfig;
use crate::db::GraphStore;
use crate::error::Result;
use crate::indexer::{Extractor, Statistics};

/// Incremental multi-language code graph extraction.
#[derive(Debug, Parser)]
#[command(name = "codeatlas", version, about)]
pub struct Cli {
    /// Project directory (defaults to the current directory; the config
    /// file is discovered upward from here).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the graph store and its schema.
    Init,
    /// Update the graph: incremental by default, full rebuild with --full.
    Update {
        /// Clear the graph and re-extract everything.
        #[arg(long)]
        full: bool,
    },
    /// Run a read-only query against the store and print JSON rows.
    Query {
        /// Query text, passed through to the store.
        text: String,
    },
    /// Show store health and graph statistics.
    Status,
    /// Drop and recreate the schema, discarding all graph data.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

/// Execute a parsed command. Returns the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    let start_dir = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let config = CodeAtlasConfig::load(&start_dir)?;
    crate::observability::init_logging(&config.log_level);

    match cli.command {
        Command::Init => init(&config),
        Command::Update { full } => update(&config, full),
        Command::Query { text } => query(&config, &text),
        Command::Status => status(&config),
        Command::Reset { force } => reset(&config, force),
    }
}

fn open_store(config: &CodeAtlasConfig) -> Result<GraphStore> {
    GraphStore::open(
        &config.database_path(),
        config.database.query_timeout,
        config.database.batch_size,
    )
}

fn init(config: &CodeAtlasConfig) -> Result<i32> {
    let store = open_store(config)?;
    store.create_schema()?;
    println!(
        "{} graph store initialized at {}",
        style("✓").green(),
        config.database_path().display()
    );
    Ok(0)
}

fn update(config: &CodeAtlasConfig, full: bool) -> Result<i32> {
    let store = open_store(config)?;
    // First run convenience: an empty store gets its schema on the fly.
    store.create_schema()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(if full {
        "full extraction…"
    } else {
        "incremental update…"
    });
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let mut extractor = Extractor::new(config, &store)?;
    let stats = if full {
        extractor.run_full()?
    } else {
        extractor.run_incremental()?
    };
    spinner.finish_and_clear();

    print_statistics(&stats, full);
    Ok(if stats.errors.is_empty() { 0 } else { 1 })
}

fn print_statistics(stats: &Statistics, full: bool) {
    if full {
        println!(
            "{} processed {} files ({} failed) in {:.2}s",
            style("✓").green(),
            stats.files_processed,
            stats.files_failed,
            stats.update_time
        );
    } else {
        println!(
            "{} {} added, {} modified, {} removed, {} unchanged in {:.2}s",
            style("✓").green(),
            stats.files_added,
            stats.files_modified,
            stats.files_removed,
            stats.files_unchanged,
            stats.update_time
        );
        if stats.entities_removed > 0 || stats.relationships_removed > 0 {
            println!(
                "  removed {} entities, {} relationships",
                stats.entities_removed, stats.relationships_removed
            );
        }
    }
    println!(
        "  {} entities, {} relationships extracted",
        stats.entities_extracted, stats.relationships_extracted
    );
    for error in &stats.errors {
        eprintln!("  {} {error}", style("!").yellow());
    }
}

fn query(config: &CodeAtlasConfig, text: &str) -> Result<i32> {
    let store = open_store(config)?;
    store.require_schema()?;
    let rows = store.query(text, &[])?;
    for row in &rows {
        println!("{}", serde_json::to_string(row).unwrap_or_default());
    }
    eprintln!("{} rows", rows.len());
    Ok(0)
}

fn status(config: &CodeAtlasConfig) -> Result<i32> {
    let store = open_store(config)?;
    let healthy = store.health_check();
    let validation = store.validate_schema()?;
    println!(
        "store:   {}",
        if healthy {
            style("healthy").green().to_string()
        } else {
            style("unreachable").red().to_string()
        }
    );
    println!(
        "schema:  {}",
        if validation.valid {
            style("valid").green().to_string()
        } else {
            style(format!("incomplete ({:?})", validation.missing_tables))
                .red()
                .to_string()
        }
    );
    if validation.valid {
        let stats = store.stats()?;
        println!("files:   {}", stats.files);
        println!("nodes:   {}", stats.entities);
        println!("edges:   {}", stats.relationships);
    }
    println!(
        "checked: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(if healthy && validation.valid { 0 } else { 1 })
}

fn reset(config: &CodeAtlasConfig, force: bool) -> Result<i32> {
    if !force {
        eprintln!(
            "{} this discards all graph data; re-run with --force to confirm",
            style("!").yellow()
        );
        return Ok(1);
    }
    let store = open_store(config)?;
    store.drop_schema()?;
    store.create_schema()?;
    println!("{} graph store reset", style("✓").green());
    Ok(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
