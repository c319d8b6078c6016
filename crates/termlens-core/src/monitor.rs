//! Background change monitor for named window regions.
//!
//! One loop serves every watched region. Each tick it visits the enabled
//! entries whose poll interval has elapsed, extracts their text and compares
//! it with what it saw last. Entry lifecycle:
//!
//! ```text
//! Idle -> Polling -> ChangeDetected -> Announced -> Polling ...
//!    \______________________________________________-> Disabled
//! ```
//!
//! Notifications are rate limited per region. A change opens a window of
//! `min_announce_interval`; later changes inside it are recorded silently,
//! and when it closes the freshest content is reported once. The first
//! observation of a region is its baseline and is never reported.
//!
//! Extraction runs with the entry lock released. A failed extraction, or a
//! region that now lies below the end of the buffer, counts as "unchanged"
//! and is retried next tick.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::MonitorSettings;
use crate::error::ApiError;
use crate::extract::RegionExtractor;
use crate::region::{RegionBounds, RegionMode, RegionProfile, WindowRegion};
use crate::source::TextSource;

/// How long [`WindowRegionMonitor::stop`] waits for the loop to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a watched region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Added but not polled yet, or re-enabled.
    Idle,
    Polling,
    /// Content changed; notification held back by the rate limit.
    ChangeDetected,
    Announced,
    Disabled,
}

/// A reported content change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionChange {
    pub name: String,
    pub mode: RegionMode,
    /// Current region text, rows joined with `\n`.
    pub content: String,
    /// Text as of the previous report (or the baseline).
    pub previous: String,
}

impl RegionChange {
    /// Short speakable summary.
    pub fn summary(&self) -> String {
        format!("Window {} changed", self.name)
    }
}

/// Snapshot of one entry for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionStatus {
    pub name: String,
    pub bounds: String,
    pub mode: RegionMode,
    pub enabled: bool,
    pub state: EntryState,
    pub poll_interval_ms: u64,
    pub has_content: bool,
    pub pending: bool,
}

#[derive(Debug)]
struct MonitorEntry {
    region: WindowRegion,
    poll_interval: Duration,
    last_content: Option<String>,
    /// Content as of the last report or the baseline.
    reported_content: Option<String>,
    last_polled_at: Option<Instant>,
    /// When the change waiting to be reported was first seen. Always later
    /// than the baseline and the previous report, so reports are at least
    /// one window apart.
    pending_since: Option<Instant>,
    state: EntryState,
}

impl MonitorEntry {
    fn new(region: WindowRegion, poll_interval: Duration) -> Self {
        let state = if region.enabled {
            EntryState::Idle
        } else {
            EntryState::Disabled
        };
        Self {
            region,
            poll_interval,
            last_content: None,
            reported_content: None,
            last_polled_at: None,
            pending_since: None,
            state,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.region.enabled
            && self
                .last_polled_at
                .map_or(true, |at| now.saturating_duration_since(at) >= self.poll_interval)
    }

    /// Forget everything seen so far; the next observation is a new baseline.
    fn reset_baseline(&mut self) {
        self.last_content = None;
        self.reported_content = None;
        self.pending_since = None;
    }

    /// Record an observation and decide whether to report now.
    ///
    /// `None` means nothing could be read, which counts as unchanged but
    /// still lets a held-back change go out.
    fn observe(
        &mut self,
        content: Option<String>,
        now: Instant,
        min_interval: Duration,
    ) -> Option<RegionChange> {
        if let Some(content) = content {
            match &self.last_content {
                None => {
                    trace!("Baseline for region {}", self.region.name);
                    self.reported_content = Some(content.clone());
                    self.last_content = Some(content);
                    self.state = EntryState::Polling;
                    return None;
                }
                Some(last) if *last == content => {}
                Some(_) => {
                    self.last_content = Some(content);
                    self.pending_since.get_or_insert(now);
                    self.state = EntryState::ChangeDetected;
                }
            }
        }

        let Some(since) = self.pending_since else {
            self.state = EntryState::Polling;
            return None;
        };

        // Changed and changed back before anyone was told.
        if self.last_content == self.reported_content {
            self.pending_since = None;
            self.state = EntryState::Polling;
            return None;
        }

        if !self.region.mode.notifies() {
            self.pending_since = None;
            self.reported_content = self.last_content.clone();
            self.state = EntryState::Polling;
            return None;
        }

        if now.saturating_duration_since(since) < min_interval {
            trace!("Change in region {} held back by rate limit", self.region.name);
            return None;
        }

        self.pending_since = None;
        self.state = EntryState::Announced;
        let content = self.last_content.clone().unwrap_or_default();
        let previous = self
            .reported_content
            .replace(content.clone())
            .unwrap_or_default();
        Some(RegionChange {
            name: self.region.name.clone(),
            mode: self.region.mode,
            content,
            previous,
        })
    }

    fn status(&self) -> RegionStatus {
        RegionStatus {
            name: self.region.name.clone(),
            bounds: self.region.bounds.to_string(),
            mode: self.region.mode,
            enabled: self.region.enabled,
            state: self.state,
            poll_interval_ms: u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            has_content: self.last_content.is_some(),
            pending: self.pending_since.is_some(),
        }
    }
}

struct RunHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Watches named regions for content changes.
pub struct WindowRegionMonitor<S: TextSource + 'static> {
    extractor: Arc<RegionExtractor<S>>,
    settings: MonitorSettings,
    entries: Mutex<Vec<MonitorEntry>>,
    changes: mpsc::UnboundedSender<RegionChange>,
    running: Mutex<Option<RunHandle>>,
}

impl<S: TextSource + 'static> WindowRegionMonitor<S> {
    /// Create a stopped monitor and the receiver for its change reports.
    pub fn new(
        extractor: Arc<RegionExtractor<S>>,
        settings: &MonitorSettings,
    ) -> (Self, mpsc::UnboundedReceiver<RegionChange>) {
        let (changes, rx) = mpsc::unbounded_channel();
        let monitor = Self {
            extractor,
            settings: settings.clone(),
            entries: Mutex::new(Vec::new()),
            changes,
            running: Mutex::new(None),
        };
        (monitor, rx)
    }

    pub fn extractor(&self) -> &Arc<RegionExtractor<S>> {
        &self.extractor
    }

    /// Start watching a region.
    ///
    /// Fails on a zero poll interval, an empty name or a name already watched.
    pub fn add_region(
        &self,
        name: &str,
        bounds: RegionBounds,
        poll_interval: Duration,
        mode: RegionMode,
    ) -> Result<(), ApiError> {
        self.add(WindowRegion::new(name, bounds, mode)?, poll_interval)
    }

    /// Start watching an existing region definition.
    pub fn add(&self, region: WindowRegion, poll_interval: Duration) -> Result<(), ApiError> {
        if poll_interval.is_zero() {
            return Err(ApiError::invalid_poll_interval());
        }
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.region.name == region.name) {
            return Err(ApiError::duplicate_region_name(&region.name));
        }
        debug!("Watching region {} ({})", region.name, region.bounds);
        entries.push(MonitorEntry::new(region, poll_interval));
        Ok(())
    }

    pub fn remove_region(&self, name: &str) -> Result<(), ApiError> {
        let mut entries = self.entries.lock();
        let idx = entries
            .iter()
            .position(|e| e.region.name == name)
            .ok_or_else(|| ApiError::region_not_found(name))?;
        entries.remove(idx);
        debug!("Stopped watching region {}", name);
        Ok(())
    }

    /// Resume polling. The next observation becomes a fresh baseline.
    pub fn enable(&self, name: &str) -> Result<(), ApiError> {
        self.with_entry(name, |entry| {
            if !entry.region.enabled {
                entry.region.enabled = true;
                entry.reset_baseline();
                entry.last_polled_at = None;
                entry.state = EntryState::Idle;
            }
        })
    }

    pub fn disable(&self, name: &str) -> Result<(), ApiError> {
        self.with_entry(name, |entry| {
            entry.region.enabled = false;
            entry.pending_since = None;
            entry.state = EntryState::Disabled;
        })
    }

    /// Replace every watched region, as on a profile switch.
    ///
    /// Nothing changes if the profile is invalid.
    pub fn apply_profile(
        &self,
        profile: &RegionProfile,
        poll_interval: Option<Duration>,
    ) -> Result<(), ApiError> {
        let interval = poll_interval.unwrap_or_else(|| self.settings.default_poll_interval());
        if interval.is_zero() {
            return Err(ApiError::invalid_poll_interval());
        }

        let mut fresh: Vec<MonitorEntry> = Vec::with_capacity(profile.regions.len());
        for region in &profile.regions {
            if fresh.iter().any(|e| e.region.name == region.name) {
                return Err(ApiError::duplicate_region_name(&region.name));
            }
            fresh.push(MonitorEntry::new(region.clone(), interval));
        }

        info!(
            "Applying region profile {} ({} regions)",
            profile.name,
            fresh.len()
        );
        *self.entries.lock() = fresh;
        Ok(())
    }

    /// Current definitions, in the order they were added.
    pub fn regions(&self) -> Vec<WindowRegion> {
        self.entries.lock().iter().map(|e| e.region.clone()).collect()
    }

    pub fn status(&self) -> Vec<RegionStatus> {
        self.entries.lock().iter().map(MonitorEntry::status).collect()
    }

    /// Read a watched region's current text on demand.
    pub fn read_region(&self, name: &str) -> Result<Vec<String>, ApiError> {
        let bounds = self
            .entries
            .lock()
            .iter()
            .find(|e| e.region.name == name)
            .map(|e| e.region.bounds)
            .ok_or_else(|| ApiError::region_not_found(name))?;
        let last_row = self.last_row().ok_or_else(ApiError::position_unavailable)?;
        self.extractor.extract_rect(&bounds.to_rect(last_row))
    }

    /// Run one monitoring pass at `now`.
    ///
    /// Reports are also sent on the change channel. Hosts with their own
    /// clock can call this directly instead of [`start`](Self::start).
    pub fn poll(&self, now: Instant) -> Vec<RegionChange> {
        let due: Vec<(String, RegionBounds)> = {
            let mut entries = self.entries.lock();
            entries
                .iter_mut()
                .filter(|e| e.is_due(now))
                .map(|e| {
                    e.last_polled_at = Some(now);
                    if e.state != EntryState::ChangeDetected {
                        e.state = EntryState::Polling;
                    }
                    (e.region.name.clone(), e.region.bounds)
                })
                .collect()
        };
        if due.is_empty() {
            return Vec::new();
        }

        let observed: Vec<(String, Option<String>)> = due
            .into_iter()
            .map(|(name, bounds)| {
                let content = self.extract(&name, &bounds);
                (name, content)
            })
            .collect();

        let min_interval = self.settings.min_announce_interval();
        let changes: Vec<RegionChange> = {
            let mut entries = self.entries.lock();
            observed
                .into_iter()
                .filter_map(|(name, content)| {
                    // The region may have been removed or disabled meanwhile.
                    let entry = entries
                        .iter_mut()
                        .find(|e| e.region.name == name && e.region.enabled)?;
                    entry.observe(content, now, min_interval)
                })
                .collect()
        };

        for change in &changes {
            info!("{}", change.summary());
            let _ = self.changes.send(change.clone());
        }
        changes
    }

    /// Start the background loop. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return false;
        }

        let weak = Arc::downgrade(self);
        let shutdown = Arc::new(Notify::new());
        let tick = self.settings.tick();
        let stop_signal = Arc::clone(&shutdown);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_signal.notified() => {
                        debug!("Region monitor stop requested");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let Some(monitor) = weak.upgrade() else {
                    debug!("Region monitor dropped, loop exiting");
                    break;
                };
                monitor.poll(Instant::now());
            }
        });

        info!("Region monitor started (tick {:?})", tick);
        *running = Some(RunHandle { shutdown, task });
        true
    }

    /// Stop the background loop, waiting briefly for it to exit.
    ///
    /// Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(handle) = self.running.lock().take() else {
            return false;
        };
        handle.shutdown.notify_one();

        let RunHandle { task, .. } = handle;
        let abort = task.abort_handle();
        match tokio::time::timeout(STOP_TIMEOUT, task).await {
            Ok(Ok(())) => info!("Region monitor stopped"),
            Ok(Err(e)) => warn!("Region monitor task failed: {}", e),
            Err(_) => {
                warn!("Region monitor did not stop within {:?}, aborting", STOP_TIMEOUT);
                abort.abort();
            }
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    fn with_entry(
        &self,
        name: &str,
        update: impl FnOnce(&mut MonitorEntry),
    ) -> Result<(), ApiError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.region.name == name)
            .ok_or_else(|| ApiError::region_not_found(name))?;
        update(entry);
        Ok(())
    }

    fn extract(&self, name: &str, bounds: &RegionBounds) -> Option<String> {
        let last_row = self.last_row()?;
        let rect = bounds.to_rect(last_row);
        if rect.top > last_row {
            debug!("Region {} starts below the last row ({})", name, last_row);
            return None;
        }
        match self.extractor.extract_rect(&rect) {
            Ok(rows) => Some(rows.join("\n")),
            Err(e) => {
                debug!("Extraction for region {} failed: {}", name, e);
                None
            }
        }
    }

    /// Current last row of the buffer.
    fn last_row(&self) -> Option<u32> {
        let engine = self.extractor.engine();
        let last = engine.source().last_position().ok()?;
        let coord = engine.position(&last);
        coord.is_known().then_some(coord.row)
    }
}
