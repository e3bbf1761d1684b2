use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use starwatch::config::process_env;
use starwatch::{run_recorded, Config, RunOptions, StatusLog};

#[derive(Parser)]
#[command(name = "starwatch")]
#[command(about = "Email a summary of new GitHub stars since the last check")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for new stars and send a notification (default)
    Check {
        /// Fetch and compare without saving state or sending email
        #[arg(long)]
        dry_run: bool,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show recent entries of the status log
    Log {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Check { dry_run: false });

    // Init writes the config, so it must not go through load_or_default
    if let Commands::Init { force } = command {
        init_logging(cli.verbose, "info")?;
        return cmd_init(cli.config, force);
    }

    let config = load_config(cli.config)?;
    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting starwatch v{}", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Check { dry_run } => cmd_check(dry_run, &config).await,
        Commands::Log { lines } => cmd_log(lines, &config),
        Commands::Init { .. } => Ok(()),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

fn cmd_init(config_path: Option<std::path::PathBuf>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    if path.exists() && !force {
        println!("Configuration already exists: {}", path.display());
        println!("   Use --force to overwrite it");
        return Ok(());
    }

    Config::default().save(&path)?;

    println!("✅ Configuration written to {}", path.display());
    println!("   Set GITHUB_TOKEN and EMAIL_ADDRESS, then schedule 'starwatch check'");
    Ok(())
}

async fn cmd_check(dry_run: bool, config: &Config) -> Result<()> {
    let summary = run_recorded(config, &process_env, RunOptions { dry_run }).await?;

    if summary.report.is_empty() {
        println!("No new stars for {}", config.github.account);
    } else {
        for (name, update) in &summary.report.updates {
            println!(
                "⭐ {}: +{} (total {})",
                name, update.new_stars, update.current_total
            );
        }
    }

    if summary.first_run {
        println!("First run: state initialized, email skipped");
    } else if summary.notified {
        println!("📧 Notification sent");
    }

    Ok(())
}

fn cmd_log(lines: usize, config: &Config) -> Result<()> {
    let log = StatusLog::new(&config.status_log.path, config.status_log.max_lines);
    let entries = log.recent(lines)?;

    if entries.is_empty() {
        println!("No runs recorded in {}", log.path().display());
    }
    for entry in entries {
        println!("{}", entry);
    }

    Ok(())
}
