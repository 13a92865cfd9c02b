// src/main.rs

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use simdex::config::SimdexConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "simdex")]
#[command(author, version, about = "Resource indexer and conflict analyzer for Sims 4 packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database
    Init {
        /// Database path (default: per-user data directory)
        #[arg(long)]
        db_path: Option<String>,
    },
    /// Index the game install into the base partition
    ScanGame {
        /// Game install folder (default: paths.game from the config)
        game_path: Option<PathBuf>,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Database path
        #[arg(long)]
        db_path: Option<String>,
        /// Abort on the first malformed package instead of skipping it
        #[arg(long)]
        strict: bool,
        /// Abort the scan after this many seconds (0 disables)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Index the Mods folder into the user partition
    ScanMods {
        /// Mods folder (default: paths.mods from the config)
        mods_path: Option<PathBuf>,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Database path
        #[arg(long)]
        db_path: Option<String>,
        /// Abort on the first malformed package instead of skipping it
        #[arg(long)]
        strict: bool,
        /// Abort the scan after this many seconds (0 disables)
        #[arg(long)]
        timeout: Option<u64>,
        /// Re-read every file instead of only changed ones
        #[arg(long)]
        full: bool,
    },
    /// Classify identities: base game, custom content, or missing
    Classify {
        /// Identities as TYPE:GROUP:INSTANCE hex triples
        #[arg(required = true)]
        identities: Vec<String>,
        /// Database path
        #[arg(long)]
        db_path: Option<String>,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Check tray items for missing or conflicting custom content
    CheckTray {
        /// Tray folder (default: paths.tray from the config)
        tray_path: Option<PathBuf>,
        /// Check a single item by id instead of the whole folder
        #[arg(long)]
        item: Option<String>,
        /// Recompute even when a cached report is fresh
        #[arg(long)]
        no_cache: bool,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Database path
        #[arg(long)]
        db_path: Option<String>,
    },
    /// Infer the content category of one package file
    Categorize {
        /// Path to a .package or .ts4script file
        package_path: PathBuf,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Database path
        #[arg(long)]
        db_path: Option<String>,
    },
    /// List identities claimed by more than one mod
    Conflicts {
        /// Database path
        #[arg(long)]
        db_path: Option<String>,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show the header and index summary of one package file
    Info {
        /// Path to a .package file
        package_path: PathBuf,
    },
    /// Summarize the index state
    Status {
        /// Database path
        #[arg(long)]
        db_path: Option<String>,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: &Option<PathBuf>) -> Result<SimdexConfig> {
    match path {
        Some(path) => SimdexConfig::load(path),
        None => SimdexConfig::load_default(),
    }
}

fn resolve_db_path(arg: Option<String>, config: &SimdexConfig) -> String {
    arg.unwrap_or_else(|| config.db_path().to_string_lossy().into_owned())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { db_path }) => {
            let config = SimdexConfig::load_default()?;
            commands::cmd_init(&resolve_db_path(db_path, &config))
        }
        Some(Commands::ScanGame {
            game_path,
            config,
            db_path,
            strict,
            timeout,
        }) => {
            let config = load_config(&config)?;
            let db_path = resolve_db_path(db_path, &config);
            commands::cmd_scan_game(&config, &db_path, game_path, strict, timeout)
        }
        Some(Commands::ScanMods {
            mods_path,
            config,
            db_path,
            strict,
            timeout,
            full,
        }) => {
            let config = load_config(&config)?;
            let db_path = resolve_db_path(db_path, &config);
            commands::cmd_scan_mods(&config, &db_path, mods_path, strict, timeout, full)
        }
        Some(Commands::Classify {
            identities,
            db_path,
            config,
        }) => {
            let config = load_config(&config)?;
            let db_path = resolve_db_path(db_path, &config);
            commands::cmd_classify(&db_path, &identities)
        }
        Some(Commands::CheckTray {
            tray_path,
            item,
            no_cache,
            config,
            db_path,
        }) => {
            let config = load_config(&config)?;
            let db_path = resolve_db_path(db_path, &config);
            commands::cmd_check_tray(&config, &db_path, tray_path, item, no_cache)
        }
        Some(Commands::Categorize {
            package_path,
            config,
            db_path,
        }) => {
            let config = load_config(&config)?;
            let db_path = resolve_db_path(db_path, &config);
            commands::cmd_categorize(&config, &db_path, &package_path)
        }
        Some(Commands::Conflicts { db_path, config }) => {
            let config = load_config(&config)?;
            let db_path = resolve_db_path(db_path, &config);
            commands::cmd_conflicts(&db_path)
        }
        Some(Commands::Info { package_path }) => commands::cmd_info(&package_path),
        Some(Commands::Status { db_path, config }) => {
            let config = load_config(&config)?;
            let db_path = resolve_db_path(db_path, &config);
            commands::cmd_status(&db_path)
        }
        None => {
            println!("simdex v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'simdex --help' for usage information");
            Ok(())
        }
    }
}
