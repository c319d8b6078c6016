//! Token to grid coordinate computation.
//!
//! The host only offers relative movement, so finding the row of a token
//! means walking lines. Three strategies are tried in order:
//!
//! | Path | Cost | When |
//! |------|------|------|
//! | cache | O(1) | token seen within the cache TTL |
//! | incremental | O(distance) | token within a few lines of the last result |
//! | full scan | O(row) | everything else |
//!
//! The incremental path never guesses: if the target line is not reached
//! within the step limit, or the host stops moving, it gives up and the full
//! scan runs instead.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::cache::CoordinateCache;
use crate::config::Settings;
use crate::error::SourceError;
use crate::grid::GridCoord;
use crate::source::TextSource;

/// Start of the line holding the most recently computed token.
#[derive(Debug, Clone)]
struct Anchor<T> {
    line_start: T,
    row: u32,
}

#[derive(Debug, Default)]
struct EngineStats {
    cache_hits: AtomicU64,
    incremental: AtomicU64,
    full_scans: AtomicU64,
}

/// Counters of which path answered each [`CoordinateEngine::position`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub incremental: u64,
    pub full_scans: u64,
}

/// Computes grid coordinates for host tokens.
pub struct CoordinateEngine<S: TextSource> {
    source: Arc<S>,
    cache: Arc<CoordinateCache<S::Token>>,
    anchor: Mutex<Option<Anchor<S::Token>>>,
    incremental_line_limit: u32,
    stats: EngineStats,
}

impl<S: TextSource> CoordinateEngine<S> {
    pub fn new(source: Arc<S>, settings: &Settings) -> Self {
        let cache = Arc::new(CoordinateCache::from_settings(&settings.cache));
        Self::with_cache(source, cache, settings.engine.incremental_line_limit)
    }

    /// Build an engine around an existing (possibly shared) cache.
    pub fn with_cache(
        source: Arc<S>,
        cache: Arc<CoordinateCache<S::Token>>,
        incremental_line_limit: u32,
    ) -> Self {
        Self {
            source,
            cache,
            anchor: Mutex::new(None),
            incremental_line_limit,
            stats: EngineStats::default(),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<CoordinateCache<S::Token>> {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.stats.cache_hits.load(AtomicOrdering::Relaxed),
            incremental: self.stats.incremental.load(AtomicOrdering::Relaxed),
            full_scans: self.stats.full_scans.load(AtomicOrdering::Relaxed),
        }
    }

    /// Grid coordinate of `token`, or [`GridCoord::UNKNOWN`] if the host
    /// could not be read.
    pub fn position(&self, token: &S::Token) -> GridCoord {
        match self.try_position(token) {
            Ok(coord) => coord,
            Err(e) => {
                warn!("Position unavailable: {}", e);
                GridCoord::UNKNOWN
            }
        }
    }

    /// Like [`position`](Self::position) but reports the host failure.
    pub fn try_position(&self, token: &S::Token) -> Result<GridCoord, SourceError> {
        if let Some(coord) = self.cache.get(token) {
            self.stats.cache_hits.fetch_add(1, AtomicOrdering::Relaxed);
            trace!("Cache hit at {}", coord);
            return Ok(coord);
        }

        let anchor = self.anchor.lock().clone();
        let incremental = match anchor {
            Some(anchor) => self.incremental(&anchor, token).unwrap_or_else(|e| {
                debug!("Incremental path failed ({}), falling back to full scan", e);
                None
            }),
            None => None,
        };

        let (line_start, row) = match incremental {
            Some(found) => {
                self.stats.incremental.fetch_add(1, AtomicOrdering::Relaxed);
                found
            }
            None => {
                self.stats.full_scans.fetch_add(1, AtomicOrdering::Relaxed);
                self.full_scan(token)?
            }
        };

        let col = self.column_in_line(&line_start, token)?;
        let coord = GridCoord::new(row, col);

        self.cache.set(token.clone(), coord);
        *self.anchor.lock() = Some(Anchor { line_start, row });
        Ok(coord)
    }

    /// Drop cached coordinates. `None` also forgets the incremental anchor,
    /// which is what hosts want after the buffer content changed.
    pub fn invalidate(&self, token: Option<&S::Token>) {
        self.cache.invalidate(token);
        if token.is_none() {
            *self.anchor.lock() = None;
        }
    }

    /// Walk from the anchor line towards `token`.
    ///
    /// `Ok(None)` means the walk gave up and a full scan is needed.
    fn incremental(
        &self,
        anchor: &Anchor<S::Token>,
        token: &S::Token,
    ) -> Result<Option<(S::Token, u32)>, SourceError> {
        let limit = self.incremental_line_limit;
        if limit == 0 {
            return Ok(None);
        }

        let src = &*self.source;
        let mut line_start = anchor.line_start.clone();
        let mut row = anchor.row;

        if src.compare(token, &line_start)? == Ordering::Less {
            for _ in 0..limit {
                let (prev, moved) = src.move_by_line(&line_start, -1)?;
                if moved != -1 || row <= 1 {
                    return Ok(None);
                }
                line_start = prev;
                row -= 1;
                if src.compare(&line_start, token)? != Ordering::Greater {
                    trace!("Incremental backward walk reached row {}", row);
                    return Ok(Some((line_start, row)));
                }
            }
            return Ok(None);
        }

        let mut steps = 0;
        loop {
            let (next, moved) = src.move_by_line(&line_start, 1)?;
            if moved == 0 || src.compare(&next, token)? == Ordering::Greater {
                trace!("Incremental forward walk reached row {}", row);
                return Ok(Some((line_start, row)));
            }
            if steps == limit {
                return Ok(None);
            }
            line_start = next;
            row += 1;
            steps += 1;
        }
    }

    /// Count lines from the buffer start until the next line would begin
    /// after `token`.
    fn full_scan(&self, token: &S::Token) -> Result<(S::Token, u32), SourceError> {
        let src = &*self.source;
        let mut line_start = src.first_position()?;
        let mut row = 1;

        loop {
            let (next, moved) = src.move_by_line(&line_start, 1)?;
            if moved == 0 || src.compare(&next, token)? == Ordering::Greater {
                break;
            }
            line_start = next;
            row += 1;
        }

        debug!("Full scan resolved row {}", row);
        Ok((line_start, row))
    }

    /// Step characters from the line start until reaching `token`.
    fn column_in_line(&self, line_start: &S::Token, token: &S::Token) -> Result<u32, SourceError> {
        let src = &*self.source;
        let mut pos = line_start.clone();
        let mut col = 1;

        while src.compare(&pos, token)? == Ordering::Less {
            let (next, moved) = src.move_by_char(&pos, 1)?;
            if moved == 0 {
                break;
            }
            pos = next;
            col += 1;
        }
        Ok(col)
    }
}
