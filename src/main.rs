use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{self, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing_subscriber::EnvFilter;

use gofer_gcs::{
    AdapterConfig, Bucket, ConnectionArgs, FilesystemAdapter, GcsAdapter, ReadOptions, Visibility,
    WriteOptions,
};

/// Filesystem-style access to a Google Cloud Storage bucket.
#[derive(Parser)]
#[command(author, version, about = "Filesystem-style access to a Google Cloud Storage bucket")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print an object's metadata as JSON
    Stat { path: String },

    /// Stream an object's contents to stdout
    Read {
        path: String,
        /// Decode the stored bytes from this encoding into UTF-8
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Create or replace an object from --text, --file or stdin
    Write {
        path: String,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Store the object without public read access
        #[arg(long)]
        private: bool,
        /// Store text in this encoding instead of UTF-8
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Delete one object
    Rm { path: String },

    /// Delete every object under a prefix
    Rmdir { prefix: String },

    /// Accepted for compatibility; buckets have no directories
    Mkdir { path: String },

    /// Copy an object
    Cp { from: String, to: String },

    /// Move an object
    Mv { from: String, to: String },

    /// Print whether an object exists
    Exists { path: String },

    /// Print an object's visibility, or change it
    Visibility {
        path: String,
        /// `public` or `private`
        value: Option<String>,
    },

    /// Create the bucket if it does not exist
    EnsureBucket,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup (stdout carries object contents) ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // --- Build adapter ---
    let config = AdapterConfig::from_env_and_args(&cli.connection)?;
    tracing::debug!("Using config: {:?}", config);
    let adapter = GcsAdapter::new(config).context("configuring GCS adapter")?;

    match cli.command {
        Command::Stat { path } => {
            let meta = adapter
                .get_metadata(&path)
                .await
                .with_context(|| format!("stat {}", path))?;
            print_json(&meta)?;
        }
        Command::Read { path, encoding } => {
            let options = ReadOptions { encoding };
            let file = adapter
                .read_stream(&path, &options)
                .await
                .with_context(|| format!("opening {}", path))?;
            let mut reader = StreamReader::new(file.stream);
            let mut stdout = io::stdout();
            io::copy(&mut reader, &mut stdout)
                .await
                .with_context(|| format!("reading {}", path))?;
            stdout.flush().await?;
        }
        Command::Write {
            path,
            text,
            file,
            private,
            encoding,
        } => {
            let visibility = if private { Visibility::Private } else { Visibility::Public };
            let options = WriteOptions {
                visibility,
                encoding,
            };
            let meta = match (text, file) {
                (Some(text), _) => adapter.write(&path, text.into(), &options).await,
                (None, Some(file)) => {
                    let source = tokio::fs::File::open(&file)
                        .await
                        .with_context(|| format!("opening {}", file.display()))?;
                    adapter
                        .write_stream(&path, ReaderStream::new(source).boxed(), &options)
                        .await
                }
                (None, None) => {
                    adapter
                        .write_stream(&path, ReaderStream::new(io::stdin()).boxed(), &options)
                        .await
                }
            }
            .with_context(|| format!("writing {}", path))?;
            print_json(&meta)?;
        }
        Command::Rm { path } => {
            let deleted = adapter
                .delete(&path)
                .await
                .with_context(|| format!("deleting {}", path))?;
            println!("{}", deleted);
        }
        Command::Rmdir { prefix } => {
            let deleted = adapter
                .delete_dir(&prefix)
                .await
                .with_context(|| format!("deleting everything under {}", prefix))?;
            println!("{}", deleted);
        }
        Command::Mkdir { path } => {
            print_json(&adapter.create_dir(&path).await?)?;
        }
        Command::Cp { from, to } => {
            let meta = adapter
                .copy_file(&from, &to)
                .await
                .with_context(|| format!("copying {} to {}", from, to))?;
            print_json(&meta)?;
        }
        Command::Mv { from, to } => {
            let meta = adapter
                .move_file(&from, &to)
                .await
                .with_context(|| format!("moving {} to {}", from, to))?;
            print_json(&meta)?;
        }
        Command::Exists { path } => {
            println!("{}", adapter.exists(&path).await?);
        }
        Command::Visibility { path, value: None } => {
            println!("{}", adapter.get_visibility(&path).await?);
        }
        Command::Visibility {
            path,
            value: Some(value),
        } => {
            let meta = adapter
                .set_visibility_named(&path, &value)
                .await
                .with_context(|| format!("setting visibility of {}", path))?;
            print_json(&meta)?;
        }
        Command::EnsureBucket => {
            let created = adapter.ensure_bucket().await?;
            tracing::info!(
                "Bucket {} {}",
                adapter.bucket().name(),
                if created { "created" } else { "already present" }
            );
            println!("{}", created);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{}", json);
    Ok(())
}
