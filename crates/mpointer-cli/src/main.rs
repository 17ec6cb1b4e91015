// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// main.rs:

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::Config;
use mpointer::{Server, ServerConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Memory manager: serves a remote reference-counted arena.
#[derive(Parser, Debug)]
struct Args {
    /// Listening port [default: 50051]
    #[clap(long)]
    port: Option<u16>,
    /// Arena size in megabytes [default: 100]
    #[clap(long)]
    memsize: Option<usize>,
    /// Folder receiving one dump file per state change [default: ../dumpFolderRegistros]
    #[clap(long, alias = "dumpFolder")]
    dump_folder: Option<PathBuf>,
    /// Background sweep period in milliseconds [default: 1000]
    #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval_ms: Option<u64>,
}

/// `MPOINTER_*` environment overrides.
#[derive(Deserialize, Debug, Default)]
struct Settings {
    port: Option<u16>,
    memsize: Option<usize>,
    dump_folder: Option<PathBuf>,
    sweep_interval_ms: Option<u64>,
}

fn server_config(args: Args, settings: Settings) -> Result<ServerConfig> {
    if settings.sweep_interval_ms == Some(0) {
        bail!("MPOINTER_SWEEP_INTERVAL_MS must be at least 1");
    }
    let defaults = ServerConfig::default();
    Ok(ServerConfig {
        port: args.port.or(settings.port).unwrap_or(defaults.port),
        memsize_mb: args
            .memsize
            .or(settings.memsize)
            .unwrap_or(defaults.memsize_mb),
        dump_folder: args
            .dump_folder
            .or(settings.dump_folder)
            .unwrap_or(defaults.dump_folder),
        sweep_interval: args
            .sweep_interval_ms
            .or(settings.sweep_interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.sweep_interval),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let settings: Settings = Config::builder()
        .add_source(config::Environment::with_prefix("MPOINTER"))
        .build()?
        .try_deserialize()
        .context("invalid MPOINTER_* environment")?;

    let config = server_config(args, settings)?;
    println!(
        "memory manager on port {} with {} MB, dumps in {}",
        config.port,
        config.memsize_mb,
        config.dump_folder.display()
    );

    let server = Server::bind(&config).await?;
    server
        .serve(async {
            // Wait for Ctrl-C to be pressed.
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("cannot listen for ctrl-c: {err}");
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_beats_environment_beats_default() -> Result<()> {
        let args = Args::parse_from(["mem-mgr", "--port", "6000", "--dumpFolder", "/tmp/d"]);
        let settings = Settings {
            port: Some(7000),
            memsize: Some(8),
            ..Settings::default()
        };
        let config = server_config(args, settings)?;
        assert_eq!(config.port, 6000);
        assert_eq!(config.memsize_mb, 8);
        assert_eq!(config.dump_folder, PathBuf::from("/tmp/d"));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = server_config(Args::parse_from(["mem-mgr"]), Settings::default())?;
        assert_eq!(config, ServerConfig::default());
        Ok(())
    }

    #[test]
    fn test_zero_sweep_interval_rejected() -> Result<()> {
        assert!(Args::try_parse_from(["mem-mgr", "--sweep-interval-ms", "0"]).is_err());
        let args = Args::try_parse_from(["mem-mgr", "--sweep-interval-ms", "5"])?;
        assert_eq!(
            server_config(args, Settings::default())?.sweep_interval,
            Duration::from_millis(5)
        );

        let settings = Settings {
            sweep_interval_ms: Some(0),
            ..Settings::default()
        };
        assert!(server_config(Args::parse_from(["mem-mgr"]), settings).is_err());
        Ok(())
    }
}
