//! zealot CLI
//!
//! Inspect and maintain a cache directory.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use zealot::{add_ttl, Config, Datastore, Result, ZealotError};

/// zealot CLI
#[derive(Parser, Debug)]
#[command(name = "zealot")]
#[command(about = "Inspect and maintain a zealot cache directory")]
#[command(version)]
struct Args {
    /// Cache directory
    #[arg(short, long, default_value = "./zealot_cache")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List index entries
    List,

    /// Write a cached value to stdout
    Show {
        /// The key to show
        key: String,
    },

    /// Store a value read from a file or stdin
    Put {
        /// The key to store under
        key: String,

        /// Read the value from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Seconds until the entry expires
        #[arg(short, long, default_value = "600")]
        ttl_secs: i64,
    },

    /// Drop an index entry
    Invalidate {
        /// The key to drop
        key: String,
    },

    /// Check every entry's blob
    Verify,

    /// Rewrite the index without superseded records
    Compact,
}

fn main() {
    // Logs go to stderr so `show` output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,zealot=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder().data_dir(&args.dir).build();
    let store = match Datastore::open(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open cache at {}: {}", args.dir.display(), e);
            process::exit(1);
        }
    };

    let code = match run(&store, args.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            1
        }
    };

    if let Err(e) = store.close() {
        tracing::error!("Failed to close cache: {}", e);
        process::exit(1);
    }
    process::exit(code);
}

fn run(store: &Datastore, command: Commands) -> Result<i32> {
    match command {
        Commands::List => {
            let now = store.now();
            for entry in store.entries() {
                println!(
                    "{}  {}  {}{}",
                    &entry.digest[..16],
                    entry.expires_at.format("%Y-%m-%dT%H:%M:%SZ"),
                    entry.key,
                    if entry.is_expired(now) { "  (expired)" } else { "" }
                );
            }
            Ok(0)
        }
        Commands::Show { key } => match store.get(&key)? {
            Some(value) => {
                io::stdout().write_all(&value)?;
                Ok(0)
            }
            None => {
                eprintln!("no valid entry for {:?}", key);
                Ok(1)
            }
        },
        Commands::Put {
            key,
            file,
            ttl_secs,
        } => {
            let value = match file {
                Some(path) => fs::read(path)?,
                None => {
                    let mut buf = Vec::new();
                    io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let ttl = Duration::try_seconds(ttl_secs)
                .ok_or_else(|| ZealotError::Config(format!("ttl out of range: {}s", ttl_secs)))?;
            let expires_at = add_ttl(store.now(), ttl)?;
            let digest = store.put(&key, &value, expires_at)?;
            println!("{}", digest);
            Ok(0)
        }
        Commands::Invalidate { key } => {
            if store.invalidate(&key)? {
                Ok(0)
            } else {
                eprintln!("no entry for {:?}", key);
                Ok(1)
            }
        }
        Commands::Verify => {
            let report = store.verify()?;
            println!(
                "{} entries: {} healthy, {} expired, {} missing, {} corrupt",
                report.entries,
                report.healthy,
                report.expired.len(),
                report.missing.len(),
                report.corrupt.len()
            );
            for key in &report.missing {
                println!("missing  {}", key);
            }
            for key in &report.corrupt {
                println!("corrupt  {}", key);
            }
            Ok(if report.is_clean() { 0 } else { 2 })
        }
        Commands::Compact => {
            let before = store.index().record_count();
            store.compact()?;
            println!(
                "index records: {} -> {}",
                before,
                store.index().record_count()
            );
            Ok(0)
        }
    }
}
