//! Tunable settings.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. A JSON file ([`Settings::load`]); a missing file is not an error
//! 3. `TERMLENS_*` environment variables ([`Settings::apply_env`])
//!
//! [`Settings::validated`] then replaces any out-of-range value with its
//! default and logs a warning, so a bad setting never disables a feature.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Failure to read a settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl_ms: 1000,
        }
    }
}

impl CacheSettings {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// How many line moves the incremental path may take before giving up
    /// and falling back to a full scan. 0 disables the incremental path.
    pub incremental_line_limit: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            incremental_line_limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Rectangles with more rows than this run on the background worker.
    pub background_row_threshold: u32,
    pub max_selection_rows: u32,
    pub max_selection_cols: u32,
    pub progress_every_rows: u32,
    /// Reorder right-to-left text before slicing columns.
    pub bidi: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            background_row_threshold: 100,
            max_selection_rows: 10_000,
            max_selection_cols: 1_000,
            progress_every_rows: 10,
            bidi: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tick_ms: u64,
    pub min_announce_interval_ms: u64,
    pub default_poll_interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            min_announce_interval_ms: 2000,
            default_poll_interval_ms: 500,
        }
    }
}

impl MonitorSettings {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[must_use]
    pub fn min_announce_interval(&self) -> Duration {
        Duration::from_millis(self.min_announce_interval_ms)
    }

    #[must_use]
    pub fn default_poll_interval(&self) -> Duration {
        Duration::from_millis(self.default_poll_interval_ms)
    }
}

/// All settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub engine: EngineSettings,
    pub extraction: ExtractionSettings,
    pub monitor: MonitorSettings,
}

impl Settings {
    /// Load settings from a JSON file. Missing files yield defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `TERMLENS_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable lookup.
    ///
    /// Values that fail to parse are logged and skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn set<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            name: &str,
            slot: &mut T,
        ) {
            if let Some(raw) = lookup(name) {
                match raw.trim().parse() {
                    Ok(value) => *slot = value,
                    Err(_) => warn!("Ignoring {}={:?}: not a valid value", name, raw),
                }
            }
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        set(lookup, "TERMLENS_CACHE_MAX_ENTRIES", &mut self.cache.max_entries);
        set(lookup, "TERMLENS_CACHE_TTL_MS", &mut self.cache.ttl_ms);
        set(
            lookup,
            "TERMLENS_INCREMENTAL_LINE_LIMIT",
            &mut self.engine.incremental_line_limit,
        );
        set(
            lookup,
            "TERMLENS_BACKGROUND_ROW_THRESHOLD",
            &mut self.extraction.background_row_threshold,
        );
        set(
            lookup,
            "TERMLENS_MAX_SELECTION_ROWS",
            &mut self.extraction.max_selection_rows,
        );
        set(
            lookup,
            "TERMLENS_MAX_SELECTION_COLS",
            &mut self.extraction.max_selection_cols,
        );
        set(
            lookup,
            "TERMLENS_PROGRESS_EVERY_ROWS",
            &mut self.extraction.progress_every_rows,
        );
        set(lookup, "TERMLENS_BIDI", &mut self.extraction.bidi);
        set(lookup, "TERMLENS_MONITOR_TICK_MS", &mut self.monitor.tick_ms);
        set(
            lookup,
            "TERMLENS_MIN_ANNOUNCE_INTERVAL_MS",
            &mut self.monitor.min_announce_interval_ms,
        );
        set(
            lookup,
            "TERMLENS_DEFAULT_POLL_INTERVAL_MS",
            &mut self.monitor.default_poll_interval_ms,
        );
    }

    /// Replace out-of-range values with their defaults.
    #[must_use]
    pub fn validated(mut self) -> Self {
        let defaults = Settings::default();

        clamp_field(
            &mut self.cache.max_entries,
            1..=10_000,
            defaults.cache.max_entries,
            "cache.max_entries",
        );
        clamp_field(&mut self.cache.ttl_ms, 1..=60_000, defaults.cache.ttl_ms, "cache.ttl_ms");
        clamp_field(
            &mut self.engine.incremental_line_limit,
            0..=1_000,
            defaults.engine.incremental_line_limit,
            "engine.incremental_line_limit",
        );
        clamp_field(
            &mut self.extraction.background_row_threshold,
            1..=100_000,
            defaults.extraction.background_row_threshold,
            "extraction.background_row_threshold",
        );
        clamp_field(
            &mut self.extraction.max_selection_rows,
            1..=1_000_000,
            defaults.extraction.max_selection_rows,
            "extraction.max_selection_rows",
        );
        clamp_field(
            &mut self.extraction.max_selection_cols,
            1..=100_000,
            defaults.extraction.max_selection_cols,
            "extraction.max_selection_cols",
        );
        clamp_field(
            &mut self.extraction.progress_every_rows,
            1..=10_000,
            defaults.extraction.progress_every_rows,
            "extraction.progress_every_rows",
        );
        clamp_field(
            &mut self.monitor.tick_ms,
            10..=10_000,
            defaults.monitor.tick_ms,
            "monitor.tick_ms",
        );
        clamp_field(
            &mut self.monitor.min_announce_interval_ms,
            0..=600_000,
            defaults.monitor.min_announce_interval_ms,
            "monitor.min_announce_interval_ms",
        );
        clamp_field(
            &mut self.monitor.default_poll_interval_ms,
            1..=3_600_000,
            defaults.monitor.default_poll_interval_ms,
            "monitor.default_poll_interval_ms",
        );

        self
    }
}

fn clamp_field<T>(value: &mut T, range: std::ops::RangeInclusive<T>, default: T, field: &str)
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if !range.contains(value) {
        warn!(
            "Setting {} = {} is outside {}..={}, using default {}",
            field,
            value,
            range.start(),
            range.end(),
            default
        );
        *value = default;
    }
}
