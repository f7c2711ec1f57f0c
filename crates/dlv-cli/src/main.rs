use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use dlv_runner::{now_utc, parse_key_arg, Indexer};
use dlv_storage::{BatchQuery, ViewQuery};
use dlv_views::DesignDoc;

#[derive(Parser)]
#[command(name = "dlv", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize in the current directory (creates .dlv/, config, design doc, db)
    Init,

    /// Document count and rows per view
    Status,

    /// Load documents from a JSON array, a single object, or JSON Lines
    Ingest { path: String },

    /// Query one view
    Query {
        view: String,
        /// Exact key (JSON)
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        start_key: Option<String>,
        #[arg(long)]
        end_key: Option<String>,
        #[arg(long)]
        group_level: Option<usize>,
        /// Group on the full key
        #[arg(long)]
        group: bool,
        #[arg(long)]
        reduce: Option<bool>,
        #[arg(long)]
        descending: bool,
        #[arg(long)]
        exclusive_end: bool,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run every query of a `{"queries": [...]}` file against one view
    QueryBatch { view: String, path: String },

    /// Print the design document for the built-in views
    DesignDoc {
        #[arg(long, default_value = "default")]
        name: String,
    },

    /// Runs of one target with their derived state
    Timeline {
        customer: String,
        project: String,
        target: String,
    },

    /// Currently published version per stage of a deliverable
    Stages {
        customer: String,
        project: String,
        deliverable: String,
    },

    /// Free-text search over deliverables
    Search {
        customer: String,
        #[arg(long)]
        project: Option<String>,
        text: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Indexer::init(&repo_root)?;
            print_json(&serde_json::json!({ "initialized": repo_root.display().to_string() }))?;
        }
        Command::Status => {
            let ix = Indexer::open(repo_root)?;
            print_json(&ix.status()?)?;
        }
        Command::Ingest { path } => {
            let ix = Indexer::open(repo_root)?;
            print_json(&ix.ingest_path(std::path::Path::new(&path))?)?;
        }
        Command::Query {
            view,
            key,
            start_key,
            end_key,
            group_level,
            group,
            reduce,
            descending,
            exclusive_end,
            skip,
            limit,
        } => {
            let q = ViewQuery {
                key: key.as_deref().map(parse_key_arg),
                start_key: start_key.as_deref().map(parse_key_arg),
                end_key: end_key.as_deref().map(parse_key_arg),
                inclusive_end: !exclusive_end,
                descending,
                skip,
                limit,
                reduce,
                group,
                group_level,
            };
            debug!(?q, %view, "query");
            let ix = Indexer::open(repo_root)?;
            print_json(&ix.query(&view, &q)?)?;
        }
        Command::QueryBatch { view, path } => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
            let batch: BatchQuery = serde_json::from_str(&text).with_context(|| format!("parse {path}"))?;
            debug!(queries = batch.queries.len(), %view, "query batch");
            let ix = Indexer::open(repo_root)?;
            print_json(&serde_json::json!({ "results": ix.query_batch(&view, &batch)? }))?;
        }
        Command::DesignDoc { name } => {
            print_json(&DesignDoc::standard(&name))?;
        }
        Command::Timeline { customer, project, target } => {
            let ix = Indexer::open(repo_root)?;
            print_json(&ix.timeline(&customer, &project, &target, now_utc())?)?;
        }
        Command::Stages { customer, project, deliverable } => {
            let ix = Indexer::open(repo_root)?;
            print_json(&ix.stages(&customer, &project, &deliverable)?)?;
        }
        Command::Search { customer, project, text } => {
            let ix = Indexer::open(repo_root)?;
            print_json(&ix.search(&customer, project.as_deref(), &text)?)?;
        }
    }

    Ok(())
}
