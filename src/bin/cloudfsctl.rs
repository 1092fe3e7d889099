//! CloudFSCtl - Operator tool for CloudFS deployments
//!
//! Usage:
//!   cloudfsctl init       - Write a starter configuration file
//!   cloudfsctl validate   - Check a configuration file
//!   cloudfsctl ping       - Check that the bucket is reachable

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use cloudfs::config::{CloudFsConfig, StorageBackend};
use cloudfs::store::{self, ListRequest};

/// CloudFS Control Tool
#[derive(Parser)]
#[command(name = "cloudfsctl")]
#[command(about = "Configure and check CloudFS storage", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cloudfs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init {
        /// Output path (defaults to --config path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bucket name
        #[arg(long, default_value = "user-files")]
        bucket: String,

        /// S3-compatible endpoint
        #[arg(long, default_value = "http://127.0.0.1:9000")]
        endpoint: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check configuration file for errors
    Validate,
    /// List the bucket once to check connectivity and credentials
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output, bucket, endpoint, force } => {
            let output = output.unwrap_or(cli.config);
            run_init(output, bucket, endpoint, force)
        }
        Commands::Validate => run_validate(cli.config),
        Commands::Ping => run_ping(cli.config).await,
    }
}

fn run_init(output: PathBuf, bucket: String, endpoint: String, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let mut config = CloudFsConfig::default();
    config.storage.bucket = bucket;
    config.storage.endpoint = endpoint;
    config.validate()?;
    config
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("Configuration file created: {}", output.display());
    println!("\nSet storage.access_key and storage.secret_key for your bucket.");
    println!("Then check it with: cloudfsctl --config {} ping", output.display());
    Ok(())
}

fn run_validate(config_path: PathBuf) -> Result<()> {
    match CloudFsConfig::load(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Backend:   {:?}", config.storage.backend);
            if config.storage.backend == StorageBackend::S3 {
                println!("  Endpoint:  {}", config.storage.endpoint);
                println!("  Bucket:    {}", config.storage.bucket);
                println!(
                    "  Auth:      {}",
                    if config.storage.access_key.is_some() { "access key" } else { "anonymous" }
                );
            }
            println!("  Namespace: {}", config.namespace.template);
            println!("  Max upload:  {} bytes", config.limits.max_upload_bytes);
            println!("  Max archive: {} bytes", config.limits.max_archive_bytes);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e.into())
        }
    }
}

async fn run_ping(config_path: PathBuf) -> Result<()> {
    let config = CloudFsConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let store = store::connect(&config.storage)?;

    let started = Instant::now();
    let page = store
        .list(ListRequest::new("").max_keys(1))
        .await
        .context("listing bucket")?;

    println!(
        "✓ {} reachable in {:?} ({} entries on first page)",
        config.storage.bucket,
        started.elapsed(),
        page.objects.len() + page.common_prefixes.len()
    );
    Ok(())
}
