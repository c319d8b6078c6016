//! Grid coordinates derived from host positions.
//!
//! Coordinates are 1-based, matching what users hear ("row 3, column 12").
//! They are always derived from a position token and never mutated in place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based (row, column) location on the virtual character grid.
///
/// `(0, 0)` is reserved as the "unknown" sentinel returned when a position
/// could not be resolved. Use [`GridCoord::is_known`] before trusting one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    pub row: u32,
    pub col: u32,
}

impl GridCoord {
    /// Sentinel for a position that could not be computed.
    pub const UNKNOWN: GridCoord = GridCoord { row: 0, col: 0 };

    #[must_use]
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Whether this is a real location rather than [`GridCoord::UNKNOWN`].
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.row >= 1 && self.col >= 1
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "row {}, column {}", self.row, self.col)
        } else {
            write!(f, "unknown position")
        }
    }
}

/// A rectangular block of the grid.
///
/// Rows are inclusive on both ends. Columns are display columns, half-open:
/// `start_col` is included and `end_col` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRect {
    pub top: u32,
    pub bottom: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl GridRect {
    /// Build a rectangle from two corners given in any order.
    ///
    /// The smaller column becomes the inclusive start and the larger one the
    /// exclusive end, so `(1,2)`..`(3,5)` spans columns 2, 3 and 4.
    #[must_use]
    pub fn from_corners(a: GridCoord, b: GridCoord) -> Self {
        Self {
            top: a.row.min(b.row),
            bottom: a.row.max(b.row),
            start_col: a.col.min(b.col),
            end_col: a.col.max(b.col),
        }
    }

    /// Number of rows covered.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        u64::from(self.bottom.saturating_sub(self.top)) + 1
    }

    /// Number of display columns covered.
    #[must_use]
    pub fn col_count(&self) -> u64 {
        u64::from(self.end_col.saturating_sub(self.start_col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sentinel_is_not_known() {
        assert!(!GridCoord::UNKNOWN.is_known());
        assert!(GridCoord::new(1, 1).is_known());
        assert!(!GridCoord::new(3, 0).is_known());
    }

    #[test]
    fn display_is_speakable() {
        assert_eq!(GridCoord::new(3, 12).to_string(), "row 3, column 12");
        assert_eq!(GridCoord::UNKNOWN.to_string(), "unknown position");
    }

    #[test]
    fn rect_from_reversed_corners_is_normalized() {
        let rect = GridRect::from_corners(GridCoord::new(3, 5), GridCoord::new(1, 2));
        assert_eq!(
            rect,
            GridRect {
                top: 1,
                bottom: 3,
                start_col: 2,
                end_col: 5
            }
        );
        assert_eq!(rect.row_count(), 3);
        assert_eq!(rect.col_count(), 3);
    }
}
