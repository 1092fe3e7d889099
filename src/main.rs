//! CloudFS - command line access to a user's files
//!
//! Runs single Resource Service operations against the configured store
//! and prints the result as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cloudfs::config::CloudFsConfig;
use cloudfs::service::{ResourceService, UploadFile, UserIdentity};

/// CloudFS - per-user virtual filesystem over S3
#[derive(Parser)]
#[command(name = "cloudfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "cloudfs.toml")]
    config: PathBuf,

    /// Log at debug level regardless of the configured level
    #[arg(short, long)]
    debug: bool,

    /// Id of the user whose files are accessed
    #[arg(short = 'u', long, default_value_t = 1)]
    user_id: u64,

    /// Username, used to name root archives
    #[arg(long, default_value = "user")]
    username: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a file or directory
    Stat {
        path: String,
    },

    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Create a directory and its parents
    Mkdir {
        path: String,
    },

    /// Upload local files into a directory
    Put {
        /// Target directory (must end with '/')
        dir: String,

        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Content type recorded for every uploaded file
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Delete a file or a directory tree
    Rm {
        path: String,
    },

    /// Move or rename a file or directory
    Mv {
        from: String,
        to: String,
    },

    /// Search file and directory names
    Find {
        query: String,
    },

    /// Download a file, or a directory as a zip archive
    Get {
        path: String,

        /// Output file (defaults to the suggested download name)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<cloudfs::Error>() {
            Some(err) => eprintln!("error ({}): {:#}", err.status_code(), e),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load config if it exists
    let config = if cli.config.exists() {
        CloudFsConfig::load(&cli.config)
            .with_context(|| format!("loading configuration from {:?}", cli.config))?
    } else {
        CloudFsConfig::default()
    };

    let level = if cli.debug { "debug" } else { config.logging.level.as_str() };
    init_logging(level, &config.logging.format);
    if !cli.config.exists() {
        tracing::warn!("Config file {:?} not found, using defaults", cli.config);
    }

    let service = ResourceService::open(&config).context("opening object store")?;
    let user = UserIdentity::new(cli.user_id, cli.username);

    match cli.command {
        Commands::Stat { path } => print_json(&service.get_resource(&user, &path).await?),
        Commands::Ls { path } => print_json(&service.get_directory(&user, &path).await?),
        Commands::Mkdir { path } => print_json(&service.create_directory(&user, &path).await?),
        Commands::Put { dir, files, content_type } => {
            let mut uploads = Vec::with_capacity(files.len());
            for file in files {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("{:?} has no file name", file))?;
                let data = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("reading {:?}", file))?;

                let mut upload = UploadFile::new(name, Bytes::from(data));
                if let Some(content_type) = &content_type {
                    upload = upload.with_content_type(content_type.clone());
                }
                uploads.push(upload);
            }
            print_json(&service.upload_files(&user, &dir, uploads).await?)
        }
        Commands::Rm { path } => print_json(&service.delete_resource(&user, &path).await?),
        Commands::Mv { from, to } => print_json(&service.move_resource(&user, &from, &to).await?),
        Commands::Find { query } => print_json(&service.search(&user, &query).await?),
        Commands::Get { path, out } => {
            let download = service.download(&user, &path).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(&download.filename));
            tokio::fs::write(&out, &download.data)
                .await
                .with_context(|| format!("writing {:?}", out))?;
            println!(
                "Saved {} ({}, {} bytes) to {:?}",
                download.filename,
                download.content_type,
                download.data.len(),
                out
            );
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize logging on stderr, keeping stdout for command output
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
