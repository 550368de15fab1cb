//! ctx - assemble editor context for AI requests from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use editor_context::{
    ContextCollection, ContextConfig, ContextConfigUpdate, ContextManager, LocalFileStore,
    ScanOptions, WorkspaceIndex,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Assemble bounded file context around the file you are editing
#[derive(Parser)]
#[command(name = "ctx")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect context for a file
    Collect {
        /// The file being edited, relative to the root or absolute
        file: PathBuf,
        /// Text selected in the editor
        #[arg(long)]
        selection: Option<String>,
        /// 1-based cursor line
        #[arg(long)]
        cursor: Option<usize>,
        #[arg(long)]
        max_files: Option<usize>,
        #[arg(long)]
        max_lines: Option<usize>,
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Do not follow imports
        #[arg(long)]
        no_imports: bool,
        /// Do not read or write the summary cache
        #[arg(long)]
        no_cache: bool,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Inspect or maintain the summary cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache metrics
    Stats,
    /// Delete all cache entries
    Clear,
    /// Drop cached summaries for one file
    Invalidate { file: PathBuf },
    /// Evict stale entries now
    Sweep,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = load_config(cli.config.as_ref())?;
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Collect {
            file,
            selection,
            cursor,
            max_files,
            max_lines,
            max_tokens,
            no_imports,
            no_cache,
            format,
        } => {
            let overrides = ContextConfigUpdate {
                max_files,
                max_lines_per_file: max_lines,
                max_total_tokens: max_tokens,
                include_imports: no_imports.then_some(false),
                enable_caching: no_cache.then_some(false),
                ..Default::default()
            };
            let config = config.apply(&overrides)?;

            let manager = open_project(&root, config).await?;
            let result = manager
                .collect_context(&file, selection.as_deref(), cursor)
                .await;
            manager.cleanup().await;
            let collection = result
                .with_context(|| format!("Failed to collect context for {}", file.display()))?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&collection)?),
                OutputFormat::Text => print_collection(&collection),
            }
            Ok(())
        }
        Commands::Cache { action } => {
            let manager = open_project(&root, config).await?;
            let outcome = run_cache_action(&manager, action).await;
            manager.cleanup().await;
            outcome
        }
    }
}

/// Initialize logging on stderr; `RUST_LOG` wins over `--log-level`
fn init_logging(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("Invalid log level: {}", log_level))?,
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set logger")?;
    Ok(())
}

/// Explicit config file, else the default location when present, else defaults
fn load_config(path: Option<&PathBuf>) -> Result<ContextConfig> {
    if let Some(path) = path {
        return ContextConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    match ContextConfig::default_path() {
        Some(path) if path.exists() => ContextConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        _ => Ok(ContextConfig::default()),
    }
}

async fn open_project(root: &Path, config: ContextConfig) -> Result<ContextManager> {
    let index = Arc::new(WorkspaceIndex::new(ScanOptions {
        skip_dirs: vec![config.cache_directory.clone()],
        ..Default::default()
    }));
    let project = index
        .load(root)
        .await
        .with_context(|| format!("Failed to open project at {}", root.display()))?;
    info!("Opened project {} ({} files)", project.root_path.display(), project.files.len());

    let manager = ContextManager::new(index, Arc::new(LocalFileStore::new()), config)?;
    Ok(manager)
}

async fn run_cache_action(manager: &ContextManager, action: CacheAction) -> Result<()> {
    match action {
        CacheAction::Stats => {
            // binds the cache to the project so persisted entries are counted
            manager.sweep_cache().await;
            let metrics = manager.get_cache_metrics().await;
            println!("{}", "Cache".bold());
            println!("   Entries:   {}", metrics.total_entries);
            println!("   Size:      {} bytes", metrics.cache_size);
            println!("   Hits:      {}", metrics.hits);
            println!("   Misses:    {}", metrics.misses);
            println!("   Evictions: {}", metrics.evictions);
            println!("   Hit rate:  {:.1}%", metrics.hit_rate * 100.0);
        }
        CacheAction::Clear => {
            manager.clear_cache().await?;
            println!("{}", "Cache cleared".green());
        }
        CacheAction::Invalidate { file } => {
            let removed = manager.invalidate_cache(&file).await?;
            println!("Invalidated {} entries for {}", removed, file.display());
        }
        CacheAction::Sweep => {
            let evicted = manager.sweep_cache().await;
            println!("Evicted {} stale entries", evicted);
        }
    }
    Ok(())
}

fn print_collection(collection: &ContextCollection) {
    let mut lines = collection.summary.lines();
    if let Some(header) = lines.next() {
        println!("{}", header.bold());
    }
    for line in lines {
        if line.starts_with("Note:") {
            println!("{}", line.yellow());
        } else {
            println!("{}", line);
        }
    }

    for file in &collection.files {
        println!();
        println!(
            "{} {} {}",
            "==>".cyan(),
            file.path.bold(),
            format!("(score {:.1}, {} lines)", file.relevance_score, file.lines).dimmed()
        );
        if let Some(summary) = &file.summary {
            println!("{}", summary.dimmed());
        }
    }
}
