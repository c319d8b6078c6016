//! Rectangular and linear text extraction.
//!
//! Rectangles are cut in display columns from escape-free text, so a row
//! reads exactly as it looks on screen. Linear extraction keeps raw text
//! and follows the buffer across line ends, for contiguous selections.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::ansi::strip_only;
use crate::config::ExtractionSettings;
use crate::engine::CoordinateEngine;
use crate::error::ApiError;
use crate::grid::{GridCoord, GridRect};
use crate::source::TextSource;
use crate::width::{display_width, reorder_for_display, slice_by_columns};

/// Result of an extraction that may be cancelled part-way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Complete(Vec<String>),
    Cancelled { partial: Vec<String>, rows_total: usize },
}

impl ExtractOutcome {
    /// Convert a cancellation into [`ApiError::operation_cancelled`].
    pub fn into_result(self) -> Result<Vec<String>, ApiError> {
        match self {
            ExtractOutcome::Complete(rows) => Ok(rows),
            ExtractOutcome::Cancelled {
                partial,
                rows_total,
            } => Err(ApiError::operation_cancelled(partial.len(), rows_total)),
        }
    }
}

/// Extracts text blocks from a [`TextSource`].
pub struct RegionExtractor<S: TextSource> {
    engine: Arc<CoordinateEngine<S>>,
    settings: ExtractionSettings,
}

impl<S: TextSource> RegionExtractor<S> {
    pub fn new(engine: Arc<CoordinateEngine<S>>, settings: &ExtractionSettings) -> Self {
        Self {
            engine,
            settings: settings.clone(),
        }
    }

    pub fn engine(&self) -> &Arc<CoordinateEngine<S>> {
        &self.engine
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// One stripped, column-sliced string per row between two corner tokens.
    ///
    /// Columns span `[min, max)` of the two corners' display columns. Rows
    /// shorter than the range yield what exists; rows past the end of the
    /// buffer are omitted.
    pub fn extract_rectangle(
        &self,
        corner_a: &S::Token,
        corner_b: &S::Token,
    ) -> Result<Vec<String>, ApiError> {
        let rect = self.resolve_rect(corner_a, corner_b)?;
        self.extract_rect(&rect)
    }

    /// Resolve two corner tokens to a checked rectangle.
    pub fn resolve_rect(
        &self,
        corner_a: &S::Token,
        corner_b: &S::Token,
    ) -> Result<GridRect, ApiError> {
        let a = self.display_coord(corner_a)?;
        let b = self.display_coord(corner_b)?;
        let rect = GridRect::from_corners(a, b);
        self.check_limits(&rect)?;
        Ok(rect)
    }

    /// Reject selections above the configured size limits.
    pub fn check_limits(&self, rect: &GridRect) -> Result<(), ApiError> {
        let rows = rect.row_count();
        if rows > u64::from(self.settings.max_selection_rows) {
            return Err(ApiError::selection_too_large(
                rows,
                self.settings.max_selection_rows,
            ));
        }
        let cols = rect.col_count();
        if cols > u64::from(self.settings.max_selection_cols) {
            return Err(ApiError::selection_too_wide(
                cols,
                self.settings.max_selection_cols,
            ));
        }
        Ok(())
    }

    /// Extract a known rectangle without limit checks or cancellation.
    pub fn extract_rect(&self, rect: &GridRect) -> Result<Vec<String>, ApiError> {
        self.extract_rect_with(rect, &|| false, &mut |_, _| {})?
            .into_result()
    }

    /// Extract a rectangle, checking `cancel` before every row and calling
    /// `progress(done, total)` every `progress_every_rows` rows and once at
    /// the end.
    pub fn extract_rect_with(
        &self,
        rect: &GridRect,
        cancel: &dyn Fn() -> bool,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<ExtractOutcome, ApiError> {
        let src = self.engine.source();
        let total = usize::try_from(rect.row_count()).unwrap_or(usize::MAX);
        let every = self.settings.progress_every_rows.max(1) as usize;
        let mut rows = Vec::with_capacity(total.min(1024));

        let skip = i64::from(rect.top.max(1)) - 1;
        let first = src.first_position()?;
        let (mut line, moved) = src.move_by_line(&first, skip)?;
        if moved < skip {
            debug!("Rectangle starts below the buffer (row {})", rect.top);
            return Ok(ExtractOutcome::Complete(rows));
        }

        for i in 0..total {
            if cancel() {
                debug!("Extraction cancelled after {} of {} rows", rows.len(), total);
                return Ok(ExtractOutcome::Cancelled {
                    partial: rows,
                    rows_total: total,
                });
            }

            let raw = src.line_text(&line)?;
            rows.push(self.slice_row(&raw, rect));

            if rows.len() % every == 0 {
                progress(rows.len(), total);
            }
            if i + 1 == total {
                break;
            }
            let (next, moved) = src.move_by_line(&line, 1)?;
            if moved == 0 {
                break;
            }
            line = next;
        }

        if rows.len() % every != 0 {
            progress(rows.len(), total);
        }
        Ok(ExtractOutcome::Complete(rows))
    }

    /// Raw text from `start` through `end` (inclusive), joined with `\n`.
    ///
    /// The tokens may be given in either order.
    pub fn extract_linear(&self, start: &S::Token, end: &S::Token) -> Result<String, ApiError> {
        let src = self.engine.source();
        let (start, end) = match src.compare(start, end)? {
            Ordering::Greater => (end, start),
            _ => (start, end),
        };

        let from = self.known_position(start)?;
        let to = self.known_position(end)?;
        let rows = u64::from(to.row - from.row) + 1;
        if rows > u64::from(self.settings.max_selection_rows) {
            return Err(ApiError::selection_too_large(
                rows,
                self.settings.max_selection_rows,
            ));
        }

        let mut out = String::new();
        let (mut line, _) = src.move_by_line(start, 0)?;
        for row in from.row..=to.row {
            let text = src.line_text(&line)?;
            let first = if row == from.row { from.col as usize - 1 } else { 0 };
            let last = if row == to.row {
                to.col as usize
            } else {
                usize::MAX
            };
            out.push_str(char_range(&text, first, last));

            if row == to.row {
                break;
            }
            out.push('\n');
            let (next, moved) = src.move_by_line(&line, 1)?;
            if moved == 0 {
                break;
            }
            line = next;
        }
        Ok(out)
    }

    fn slice_row(&self, raw: &str, rect: &GridRect) -> String {
        let stripped = strip_only(raw);
        let visual = if self.settings.bidi {
            reorder_for_display(&stripped)
        } else {
            Cow::Borrowed(&*stripped)
        };
        slice_by_columns(&visual, rect.start_col as usize, rect.end_col as usize).to_string()
    }

    fn known_position(&self, token: &S::Token) -> Result<GridCoord, ApiError> {
        let coord = self.engine.position(token);
        if coord.is_known() {
            Ok(coord)
        } else {
            Err(ApiError::position_unavailable())
        }
    }

    /// Grid position of a token with the column measured in display cells of
    /// the stripped line rather than raw characters.
    fn display_coord(&self, token: &S::Token) -> Result<GridCoord, ApiError> {
        let coord = self.known_position(token)?;
        let src = self.engine.source();
        let (line, _) = src.move_by_line(token, 0)?;
        let raw = src.line_text(&line)?;
        let prefix = char_range(&raw, 0, coord.col as usize - 1);
        let col = display_width(&strip_only(prefix)) + 1;
        Ok(GridCoord::new(
            coord.row,
            u32::try_from(col).unwrap_or(u32::MAX),
        ))
    }
}

/// Substring of characters `[first, last)`, clamped to the string.
fn char_range(text: &str, first: usize, last: usize) -> &str {
    if last <= first {
        return "";
    }
    let byte_at = |n: usize| {
        text.char_indices()
            .nth(n)
            .map_or(text.len(), |(idx, _)| idx)
    };
    let begin = byte_at(first);
    let end = if last == usize::MAX {
        text.len()
    } else {
        byte_at(last)
    };
    &text[begin..end.max(begin)]
}
