//! Stash CLI - read-through cache over a directory of entries
//!
//! Each invocation performs one cache operation. Logs go to stderr and are
//! controlled with `RUST_LOG` (default `warn`).

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stash::cli::{format_value, Cli, Command};
use stash::value::parse_loose;
use stash::{FileStore, HandlerFile, Registry, Stash};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.stash_config()?;

    let mut registry = Registry::new();
    if let Some(path) = &cli.handlers {
        HandlerFile::load(path)?.apply(&mut registry)?;
    }

    let store = match &cli.dir {
        Some(dir) => FileStore::with_dir(dir.clone()),
        None => FileStore::new().ok_or("cannot determine a cache directory; pass --dir")?,
    };

    let stash = Stash::with_config(registry, store, config);

    match cli.command {
        Command::Get { key } => match stash.get(&key).await {
            Ok(delivery) => println!("{}", format_value(&delivery.value)),
            Err(e) => {
                eprintln!("error: {e}");
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Set { key, value } => {
            stash.set(&key, &parse_loose(&value)).await?;
        }
        Command::Resolve { key } => {
            println!("{}", stash.resolve(&key).name());
        }
        Command::Handlers => {
            for handler in stash.registry().handlers() {
                println!(
                    "{}\t{}\t{}",
                    handler.name(),
                    handler.kind().map_or("-", |k| k.as_str()),
                    if handler.can_refresh() { "refresh" } else { "-" }
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
