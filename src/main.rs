//! bdlog CLI
//!
//! Command-line interface for the bdlog dev server:
//! - Serve the built page and proxy bdatalog API calls
//! - Print the proxy table
//! - Check that the backend is reachable
//! - Generate a default config file

use anyhow::Context;
use bdlog::config::{generate_default_config, Config};
use bdlog::proxy::{build_client, probe};
use bdlog::AppState;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bdlog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Development server for the bdatalog table log viewer")]
#[command(long_about = "bdlog serves the built table log viewer and forwards its API calls\nto the bdatalog backend, so the browser only talks to one origin.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the built page and proxy bdatalog API calls
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Backend origin for routes without their own target
        #[arg(short, long)]
        target: Option<String>,
        /// Directory holding the built page
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the proxy table
    Routes,

    /// Check that every proxy target answers HTTP
    Check,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => write_config(output),
        Commands::Serve {
            host,
            port,
            target,
            output_dir,
        } => {
            let mut config = load_config(cli.config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(target) = target {
                config.proxy.target = target;
            }
            if let Some(output_dir) = output_dir {
                config.build.output_dir = output_dir;
            }
            serve(config).await
        }
        Commands::Routes => print_routes(&load_config(cli.config)?),
        Commands::Check => check(&load_config(cli.config)?).await,
    }
}

/// Print or write the default config file. Needs no configuration itself.
fn write_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    let content = generate_default_config();
    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

/// Load configuration and start logging
fn load_config(config_path: Option<PathBuf>) -> anyhow::Result<Config> {
    let (config, source) =
        Config::discover(config_path.as_deref()).context("loading configuration")?;

    bdlog::logging::init_tracing(&config.logging);

    match &source {
        Some(path) => tracing::info!("Loaded config from {:?}", path),
        None => tracing::info!("Using default config with environment overrides"),
    }

    Ok(config)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting bdlog dev server v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::from_config(&config).context("building server state")?;
    bdlog::serve(state, &config.server.addr())
        .await
        .context("running dev server")?;
    Ok(())
}

fn print_routes(config: &Config) -> anyhow::Result<()> {
    let table = config.proxy_table()?;
    println!("{} proxied prefixes:", table.len());
    for rule in table.rules() {
        println!("  {}", rule);
    }
    Ok(())
}

/// Probe every distinct proxy target
async fn check(config: &Config) -> anyhow::Result<()> {
    let table = config.proxy_table()?;
    let client = build_client(Duration::from_secs(config.proxy.timeout_secs))?;

    let mut failed = 0;
    for target in table.targets() {
        match probe(&client, target).await {
            Ok(status) => println!("✓ {} answered {}", target, status),
            Err(e) => {
                failed += 1;
                println!("✗ {}: {}", target, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} proxy target(s) unreachable", failed);
    }
    Ok(())
}
