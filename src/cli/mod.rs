pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::models::{CategoryFilter, TaskStatus};
use crate::utils::default_log_file;
use commands::Console;
use config::ClientConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file; without a path the per-user data directory is used
    #[arg(long, global = true, value_name = "PATH", num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,

    /// Configuration file to use instead of the default one
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a crawl job for one URL
    Crawl {
        /// Target URL
        #[arg(required = true)]
        url: String,

        /// Extraction template to apply
        #[arg(short, long)]
        template: Option<i64>,

        /// Crawl configuration as a JSON object
        #[arg(long)]
        config_json: Option<String>,

        /// Follow the task until it finishes
        #[arg(short, long)]
        watch: bool,
    },

    /// Submit several URLs as one batch
    Batch {
        /// Target URLs
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,

        /// Extraction template to apply
        #[arg(short, long)]
        template: Option<i64>,

        /// Concurrency hint passed to the service
        #[arg(short, long)]
        max_concurrent: Option<u32>,
    },

    /// List crawl tasks
    Tasks {
        /// Only tasks in this status
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Only tasks created from this template
        #[arg(short, long)]
        template: Option<i64>,

        /// Free-text search on the URL
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one task
    Task {
        #[arg(required = true)]
        id: i64,
    },

    /// Follow a task until it reaches a terminal status
    Watch {
        #[arg(required = true)]
        id: i64,

        /// Override the configured polling interval
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Delete a task
    Delete {
        #[arg(required = true)]
        id: i64,
    },

    /// List extraction templates
    Templates {
        /// Category to show, or "all"
        #[arg(long, default_value = "all")]
        category: CategoryFilter,

        /// Only builtin templates
        #[arg(long, conflicts_with = "custom")]
        builtin: bool,

        /// Only user-defined templates
        #[arg(long)]
        custom: bool,
    },

    /// Show one template
    Template {
        #[arg(required = true)]
        id: i64,
    },

    /// Create a template from a YAML or JSON file
    CreateTemplate {
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Apply a partial update from a YAML or JSON file
    UpdateTemplate {
        #[arg(required = true)]
        id: i64,

        #[arg(required = true)]
        file: PathBuf,
    },

    /// Delete a user-defined template
    DeleteTemplate {
        #[arg(required = true)]
        id: i64,
    },

    /// Check a template schema file with the service
    Validate {
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Show service-wide statistics
    Stats,

    /// Check that the service is reachable
    Health,
}

impl Cli {
    /// Where to write the log file, if anywhere
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(default_log_file))
    }
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config = ClientConfig::load(cli.config.as_deref())?;
    let console = Console::connect(config)?;

    match cli.command {
        Commands::Crawl { url, template, config_json, watch } => {
            info!("Submitting crawl for {}", url);
            console.crawl(url, template, config_json, watch).await
        }
        Commands::Batch { urls, template, max_concurrent } => {
            info!("Submitting batch of {} URLs", urls.len());
            console.batch(urls, template, max_concurrent).await
        }
        Commands::Tasks { status, template, search } => console.list_tasks(status, template, search).await,
        Commands::Task { id } => console.show_task(id).await,
        Commands::Watch { id, interval_ms } => {
            info!("Watching task {}", id);
            console.watch(id, interval_ms).await
        }
        Commands::Delete { id } => console.delete_task(id).await,
        Commands::Templates { category, builtin, custom } => {
            let origin = match (builtin, custom) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            console.list_templates(category, origin).await
        }
        Commands::Template { id } => console.show_template(id).await,
        Commands::CreateTemplate { file } => console.create_template(&file).await,
        Commands::UpdateTemplate { id, file } => console.update_template(id, &file).await,
        Commands::DeleteTemplate { id } => console.delete_template(id).await,
        Commands::Validate { file } => console.validate(&file).await,
        Commands::Stats => console.stats().await,
        Commands::Health => console.health().await,
    }
}
