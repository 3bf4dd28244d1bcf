mod config;
mod error;
mod extensions;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use runtime::{LoadedModule, Loader, Registry};
use storage::SqliteStore;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "capstan.toml";

#[derive(Parser)]
#[command(name = "capstan")]
#[command(about = "A host that runs extensions with the permissions they declare", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every registered module and run until interrupted
    Start {
        /// Stop the modules and exit as soon as startup completes
        #[arg(long)]
        once: bool,
    },
    /// Validate every registered module's manifest without starting it
    Check,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_found = cli.config.exists();
    let config = if config_found {
        Config::load(&cli.config)?
    } else {
        Config::default_config()
    };
    init_logging(&config.log.level)?;
    if config_found {
        tracing::debug!(path = %cli.config.display(), "configuration loaded");
    } else {
        tracing::info!(path = %cli.config.display(), "no configuration file, using defaults");
    }

    match cli.command {
        Some(Commands::Start { once }) => cmd_start(&config, once).await,
        None => cmd_start(&config, false).await,
        Some(Commands::Check) => cmd_check(&config).await,
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level));
    let filter = filter.map_err(|e| Error::Logging(format!("invalid level '{level}': {e}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

async fn cmd_start(config: &Config, once: bool) -> Result<()> {
    println!("capstan v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(config)?;
    let loader = Loader::new(extensions::resolver(&config.extensions_dir), Arc::new(store))
        .with_config(config.loader_config());

    let modules = loader.load(&config.registry).await?.into_result()?;
    print_modules(&modules);

    if !once {
        println!("Press Ctrl+C to stop.\n");
        tokio::signal::ctrl_c().await?;
    }

    for module in modules {
        module.shutdown();
    }
    tracing::info!("all modules stopped");
    Ok(())
}

async fn cmd_check(config: &Config) -> Result<()> {
    let registry = Registry::read(&config.registry).await?;
    // Checking never touches storage.
    let loader = Loader::new(
        extensions::resolver(&config.extensions_dir),
        Arc::new(SqliteStore::in_memory()?),
    )
    .with_config(config.loader_config());

    let checks = loader.check(&registry).await;
    if checks.is_empty() {
        println!("No modules registered in {}.", config.registry.display());
        return Ok(());
    }

    println!("{:<24}  {:<8}  DETAILS", "MODULE", "STATUS");
    println!("{}", "-".repeat(72));

    let mut failed = 0;
    for check in &checks {
        match &check.outcome {
            Ok(manifest) => {
                let permissions: Vec<_> = manifest.permissions.iter().map(|p| p.as_str()).collect();
                println!("{:<24}  {:<8}  {}", check.module, "ok", permissions.join(", "));
            }
            Err(err) => {
                failed += 1;
                println!("{:<24}  {:<8}  {err}", check.module, "invalid");
            }
        }
    }

    if failed > 0 {
        return Err(Error::CheckFailed {
            failed,
            total: checks.len(),
        });
    }
    Ok(())
}

fn print_modules(modules: &[LoadedModule]) {
    if modules.is_empty() {
        println!("No modules loaded.");
        return;
    }

    println!("{:<24}  {:<10}  PERMISSIONS", "MODULE", "VERSION");
    println!("{}", "-".repeat(72));
    for module in modules {
        let permissions: Vec<_> = module.permissions().iter().map(|p| p.as_str()).collect();
        println!(
            "{:<24}  {:<10}  {}",
            module.id(),
            module.version().unwrap_or("-"),
            permissions.join(", ")
        );
    }
    println!();
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let db_path = match &config.database {
        Some(path) => path.clone(),
        None => dirs_data_dir()
            .unwrap_or_else(|| ".capstan".into())
            .join("capstan.db"),
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %db_path.display(), "opening database");
    Ok(SqliteStore::open(&db_path)?)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/capstan"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("capstan"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("capstan"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
