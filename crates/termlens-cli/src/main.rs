//! termlens CLI entry point.

mod args;
mod commands;
mod host;
mod paths;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use termlens_core::config::Settings;
use tracing::debug;

use crate::args::Cli;

fn main() {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(commands::run(cli.command, settings))
}

/// Defaults, then the settings file, then `TERMLENS_*` variables.
fn load_settings(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let path = paths::config_path(explicit);
    debug!("Loading settings from {}", path.display());
    let mut settings = Settings::load(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    settings.apply_env();
    Ok(settings.validated())
}

/// Wait for SIGTERM (Unix only).
///
/// If signal registration fails, logs a warning and waits indefinitely.
#[cfg(unix)]
pub(crate) async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(
                "Failed to register SIGTERM handler: {}, only SIGINT will stop watching",
                e
            );
            std::future::pending::<()>().await;
        }
    }
}

/// SIGTERM is not available on non-Unix platforms; use a never-completing future.
#[cfg(not(unix))]
pub(crate) async fn sigterm() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::load_settings;

    #[test]
    fn test_load_settings_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"monitor": {"tick_ms": 250}, "cache": {"ttl_ms": 0}}"#).unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.monitor.tick_ms, 250);
        // Out of range, replaced by the default.
        assert_eq!(settings.cache.ttl_ms, 1000);
    }

    #[test]
    fn test_load_settings_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_settings(Some(&path)).is_err());
    }
}
