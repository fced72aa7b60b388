//! Transmission Splitter task entry point.
//!
//! Reads the transmission id and bucket from the environment, splits the
//! transmission's source audio into stems and uploads them.

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use transmission_splitter::{build_runtime, run_job, Config, JobId};

#[derive(Parser)]
#[command(name = "transmission-splitter")]
#[command(about = "Split a transmission's source audio into stems", long_about = None)]
struct Cli {
    /// Id of the transmission to split
    #[arg(long, env = "ID")]
    id: String,

    /// Full name of the bucket holding transmissions
    #[arg(long, env = "BUCKET_NAME")]
    bucket: Option<String>,

    /// Path to an optional configuration file
    #[arg(short, long, env = "SPLITTER_CONFIG")]
    config: Option<PathBuf>,

    /// Use a local S3 emulator instead of AWS. Any non-empty value of
    /// `IS_OFFLINE` other than a false-like one (0, false, no, off) enables it.
    #[arg(long, env = "IS_OFFLINE", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    offline: bool,

    /// Root directory for per-job workspaces
    #[arg(long, env = "TMP_ROOT")]
    tmp_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let id = JobId::new(&cli.id)?;
    let config = load_config(cli)?;

    let runtime = build_runtime(None)?;
    let report = runtime.block_on(run_job(&config, id))?;

    println!("OK - Uploaded TransmissionChannels for {}", report.id);
    Ok(())
}

fn load_config(cli: Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Apply overrides
    if let Some(bucket) = cli.bucket.filter(|b| !b.is_empty()) {
        config.storage.bucket = Some(bucket);
    }
    if cli.offline {
        config.storage.offline = true;
    }
    if let Some(tmp_root) = cli.tmp_root {
        config.workspace.tmp_root = tmp_root;
    }

    config
        .storage
        .resolve_bucket(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_id() {
        let cli = Cli::try_parse_from(["transmission-splitter", "--id", "abc123"]).unwrap();
        assert_eq!(cli.id, "abc123");
    }

    #[test]
    fn test_cli_requires_id() {
        if std::env::var_os("ID").is_none() {
            assert!(Cli::try_parse_from(["transmission-splitter"]).is_err());
        }
    }

    #[test]
    fn test_offline_env_accepts_any_truthy_value() {
        for value in ["1", "yes", "true"] {
            std::env::set_var("IS_OFFLINE", value);
            let cli = Cli::try_parse_from(["transmission-splitter", "--id", "abc123"]).unwrap();
            assert!(cli.offline, "IS_OFFLINE={value} should enable offline mode");
        }
        for value in ["0", "false", ""] {
            std::env::set_var("IS_OFFLINE", value);
            let cli = Cli::try_parse_from(["transmission-splitter", "--id", "abc123"]).unwrap();
            assert!(!cli.offline, "IS_OFFLINE={value:?} should leave offline mode off");
        }
        std::env::remove_var("IS_OFFLINE");
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let cli = Cli::try_parse_from([
            "transmission-splitter",
            "--id",
            "abc123",
            "--bucket",
            "dev-emptystream-mainBucket",
            "--offline",
            "--tmp-root",
            "/var/tmp/splitter",
        ])
        .unwrap();

        let config = load_config(cli).unwrap();
        assert_eq!(config.storage.bucket.as_deref(), Some("dev-emptystream-mainBucket"));
        assert!(config.storage.offline);
        assert_eq!(config.workspace.tmp_root, PathBuf::from("/var/tmp/splitter"));
    }
}
