//! Named window regions and their persisted profile form.
//!
//! A window region is a rectangle of the screen that a user names ("status",
//! "build log") so it can be read on demand or watched for changes. Bounds
//! are 1-based and inclusive. Any bound may be the keyword `last`, which
//! tracks the bottom row or the right edge as the buffer grows.
//!
//! Persisted form of one region:
//!
//! ```json
//! {"name": "status", "top": 1, "bottom": 1, "left": 1, "right": "last",
//!  "mode": "announce", "enabled": true}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::grid::GridRect;

/// Largest accepted bound index.
pub const MAX_REGION_DIMENSION: u32 = 10_000;

/// One edge of a region: a 1-based index, or the last row/column.
///
/// `Last` orders after every index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "BoundRepr", into = "BoundRepr")]
pub enum Bound {
    Index(u32),
    Last,
}

impl Bound {
    /// Concrete index given the current last row or column.
    #[must_use]
    pub fn resolve(self, last: u32) -> u32 {
        match self {
            Bound::Index(n) => n,
            Bound::Last => last,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Index(n) => write!(f, "{}", n),
            Bound::Last => write!(f, "last"),
        }
    }
}

impl FromStr for Bound {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("last") {
            return Ok(Bound::Last);
        }
        let n: u32 = s.parse().map_err(|_| {
            ApiError::invalid_input_with_suggestion(
                format!("Invalid region bound '{}'", s),
                "Use a row or column number, or 'last'",
            )
        })?;
        Bound::try_from(BoundRepr::Index(n)).map_err(ApiError::invalid_input)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BoundRepr {
    Index(u32),
    Keyword(String),
}

impl TryFrom<BoundRepr> for Bound {
    type Error = String;

    fn try_from(repr: BoundRepr) -> Result<Self, Self::Error> {
        match repr {
            BoundRepr::Index(n) if (1..=MAX_REGION_DIMENSION).contains(&n) => Ok(Bound::Index(n)),
            BoundRepr::Index(n) => Err(format!(
                "Region bound {} is outside 1..={}",
                n, MAX_REGION_DIMENSION
            )),
            BoundRepr::Keyword(k) if k.eq_ignore_ascii_case("last") => Ok(Bound::Last),
            BoundRepr::Keyword(k) => Err(format!("Unknown region bound '{}'", k)),
        }
    }
}

impl From<Bound> for BoundRepr {
    fn from(bound: Bound) -> Self {
        match bound {
            Bound::Index(n) => BoundRepr::Index(n),
            Bound::Last => BoundRepr::Keyword("last".to_string()),
        }
    }
}

/// Normalized region bounds: `top <= bottom` and `left <= right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionBounds {
    top: Bound,
    bottom: Bound,
    left: Bound,
    right: Bound,
}

impl RegionBounds {
    /// Build bounds, swapping reversed edges.
    #[must_use]
    pub fn new(top: Bound, bottom: Bound, left: Bound, right: Bound) -> Self {
        Self {
            top: top.min(bottom),
            bottom: top.max(bottom),
            left: left.min(right),
            right: left.max(right),
        }
    }

    /// Bounds from plain indexes.
    #[must_use]
    pub fn rows_cols(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self::new(
            Bound::Index(top),
            Bound::Index(bottom),
            Bound::Index(left),
            Bound::Index(right),
        )
    }

    /// The whole screen, however large it gets.
    #[must_use]
    pub fn full_screen() -> Self {
        Self::new(Bound::Index(1), Bound::Last, Bound::Index(1), Bound::Last)
    }

    pub fn top(&self) -> Bound {
        self.top
    }

    pub fn bottom(&self) -> Bound {
        self.bottom
    }

    pub fn left(&self) -> Bound {
        self.left
    }

    pub fn right(&self) -> Bound {
        self.right
    }

    /// Whether a cell lies inside, given the current last row and column.
    #[must_use]
    pub fn contains(&self, row: u32, col: u32, last_row: u32, last_col: u32) -> bool {
        (self.top.resolve(last_row)..=self.bottom.resolve(last_row)).contains(&row)
            && (self.left.resolve(last_col)..=self.right.resolve(last_col)).contains(&col)
    }

    /// Rectangle for extraction. A `last` right edge reaches the end of
    /// every line.
    #[must_use]
    pub fn to_rect(&self, last_row: u32) -> GridRect {
        let end_col = match self.right {
            Bound::Index(n) => n.saturating_add(1),
            Bound::Last => u32::MAX,
        };
        GridRect {
            top: self.top.resolve(last_row),
            bottom: self.bottom.resolve(last_row),
            start_col: self.left.resolve(u32::MAX - 1),
            end_col,
        }
    }
}

impl fmt::Display for RegionBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows {} to {}, columns {} to {}",
            self.top, self.bottom, self.left, self.right
        )
    }
}

/// Parses `TOP,LEFT,BOTTOM,RIGHT`, e.g. `1,1,3,last`.
impl FromStr for RegionBounds {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        let [top, left, bottom, right] = parts.as_slice() else {
            return Err(ApiError::invalid_input_with_suggestion(
                format!("Invalid region bounds '{}'", s),
                "Use TOP,LEFT,BOTTOM,RIGHT, e.g. 1,1,3,last",
            ));
        };
        Ok(Self::new(
            top.parse()?,
            bottom.parse()?,
            left.parse()?,
            right.parse()?,
        ))
    }
}

/// What happens when a watched region changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    /// Speak the change.
    #[default]
    Announce,
    /// Track content, never notify.
    Silent,
    /// Notify as a background monitor.
    Monitor,
}

impl RegionMode {
    /// Whether changes in this mode produce notifications.
    #[must_use]
    pub fn notifies(self) -> bool {
        !matches!(self, RegionMode::Silent)
    }
}

impl fmt::Display for RegionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionMode::Announce => write!(f, "announce"),
            RegionMode::Silent => write!(f, "silent"),
            RegionMode::Monitor => write!(f, "monitor"),
        }
    }
}

impl FromStr for RegionMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "announce" => Ok(RegionMode::Announce),
            "silent" => Ok(RegionMode::Silent),
            "monitor" => Ok(RegionMode::Monitor),
            other => Err(ApiError::invalid_input_with_suggestion(
                format!("Unknown region mode '{}'", other),
                "Use announce, silent or monitor",
            )),
        }
    }
}

/// A named region of the screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegionRecord", into = "RegionRecord")]
pub struct WindowRegion {
    pub name: String,
    pub bounds: RegionBounds,
    pub mode: RegionMode,
    pub enabled: bool,
}

impl WindowRegion {
    /// Create an enabled region. Names are trimmed and must not be empty.
    pub fn new(
        name: impl Into<String>,
        bounds: RegionBounds,
        mode: RegionMode,
    ) -> Result<Self, ApiError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ApiError::invalid_input_with_suggestion(
                "Region name must not be empty",
                "Give the region a short name such as 'status'",
            ));
        }
        Ok(Self {
            name,
            bounds,
            mode,
            enabled: true,
        })
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether a cell lies inside, ignoring `enabled`.
    #[must_use]
    pub fn contains(&self, row: u32, col: u32, last_row: u32, last_col: u32) -> bool {
        self.bounds.contains(row, col, last_row, last_col)
    }
}

/// Flat persisted form of [`WindowRegion`].
#[derive(Serialize, Deserialize)]
struct RegionRecord {
    name: String,
    top: Bound,
    bottom: Bound,
    left: Bound,
    right: Bound,
    #[serde(default)]
    mode: RegionMode,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<RegionRecord> for WindowRegion {
    type Error = String;

    fn try_from(record: RegionRecord) -> Result<Self, Self::Error> {
        let bounds = RegionBounds::new(record.top, record.bottom, record.left, record.right);
        WindowRegion::new(record.name, bounds, record.mode)
            .map(|region| region.with_enabled(record.enabled))
            .map_err(|e| e.message)
    }
}

impl From<WindowRegion> for RegionRecord {
    fn from(region: WindowRegion) -> Self {
        let bounds = region.bounds;
        Self {
            name: region.name,
            top: bounds.top,
            bottom: bounds.bottom,
            left: bounds.left,
            right: bounds.right,
            mode: region.mode,
            enabled: region.enabled,
        }
    }
}

/// Ordered set of uniquely named regions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionRegistry {
    regions: Vec<WindowRegion>,
}

impl RegionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region. Fails if the name is taken.
    pub fn add(&mut self, region: WindowRegion) -> Result<(), ApiError> {
        if self.contains(&region.name) {
            return Err(ApiError::duplicate_region_name(&region.name));
        }
        self.regions.push(region);
        Ok(())
    }

    /// Add a region or replace the one with the same name in place.
    ///
    /// Returns the previous definition.
    pub fn define(&mut self, region: WindowRegion) -> Option<WindowRegion> {
        match self.regions.iter_mut().find(|r| r.name == region.name) {
            Some(existing) => Some(std::mem::replace(existing, region)),
            None => {
                self.regions.push(region);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<WindowRegion, ApiError> {
        let idx = self
            .regions
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| ApiError::region_not_found(name))?;
        Ok(self.regions.remove(idx))
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ApiError> {
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| ApiError::region_not_found(name))?;
        region.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&WindowRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// First enabled region containing the cell.
    pub fn region_at(
        &self,
        row: u32,
        col: u32,
        last_row: u32,
        last_col: u32,
    ) -> Option<&WindowRegion> {
        self.regions
            .iter()
            .find(|r| r.enabled && r.contains(row, col, last_row, last_col))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowRegion> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Snapshot as a named profile.
    #[must_use]
    pub fn to_profile(&self, name: impl Into<String>) -> RegionProfile {
        RegionProfile {
            name: name.into(),
            regions: self.regions.clone(),
        }
    }

    /// Build a registry from a profile, rejecting duplicate names.
    pub fn from_profile(profile: &RegionProfile) -> Result<Self, ApiError> {
        let mut registry = Self::new();
        for region in &profile.regions {
            registry.add(region.clone())?;
        }
        Ok(registry)
    }
}

/// A named set of regions, the unit of persistence and profile switching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionProfile {
    pub name: String,
    #[serde(default)]
    pub regions: Vec<WindowRegion>,
}

impl RegionProfile {
    pub fn from_json(json: &str) -> Result<Self, ApiError> {
        serde_json::from_str(json).map_err(|e| {
            ApiError::invalid_input_with_suggestion(
                format!("Invalid region profile: {}", e),
                "Check the profile JSON against the documented region format",
            )
        })
    }

    pub fn to_json(&self) -> Result<String, ApiError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ApiError::internal(format!("Failed to serialize profile: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn region(name: &str, bounds: &str) -> WindowRegion {
        WindowRegion::new(name, bounds.parse().unwrap(), RegionMode::Announce).unwrap()
    }

    #[test]
    fn bounds_are_normalized() {
        let bounds = RegionBounds::rows_cols(5, 2, 40, 10);
        assert_eq!(bounds.top(), Bound::Index(2));
        assert_eq!(bounds.bottom(), Bound::Index(5));
        assert_eq!(bounds.left(), Bound::Index(10));
        assert_eq!(bounds.right(), Bound::Index(40));

        let bounds = RegionBounds::new(Bound::Last, Bound::Index(3), Bound::Index(1), Bound::Last);
        assert_eq!(bounds.top(), Bound::Index(3));
        assert_eq!(bounds.bottom(), Bound::Last);
    }

    #[test]
    fn parse_bounds_string() {
        let bounds: RegionBounds = "1,2,3,last".parse().unwrap();
        assert_eq!(
            bounds,
            RegionBounds::new(Bound::Index(1), Bound::Index(3), Bound::Index(2), Bound::Last)
        );
        assert!("1,2,3".parse::<RegionBounds>().is_err());
        assert!("0,1,1,1".parse::<RegionBounds>().is_err());
        assert!("a,1,1,1".parse::<RegionBounds>().is_err());
    }

    #[test]
    fn last_sentinel_follows_buffer_size() {
        let bounds = RegionBounds::new(Bound::Last, Bound::Last, Bound::Index(1), Bound::Last);
        assert!(bounds.contains(24, 80, 24, 80));
        assert!(!bounds.contains(23, 1, 24, 80));
        assert!(bounds.contains(50, 3, 50, 80));
    }

    #[test]
    fn to_rect_converts_inclusive_right_edge() {
        let rect = RegionBounds::rows_cols(2, 4, 3, 7).to_rect(24);
        assert_eq!(
            rect,
            GridRect {
                top: 2,
                bottom: 4,
                start_col: 3,
                end_col: 8
            }
        );
        let rect = RegionBounds::full_screen().to_rect(24);
        assert_eq!((rect.top, rect.bottom, rect.end_col), (1, 24, u32::MAX));
    }

    #[test]
    fn empty_name_rejected() {
        let err = WindowRegion::new("  ", RegionBounds::full_screen(), RegionMode::Silent)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = RegionRegistry::new();
        registry.add(region("status", "1,1,1,last")).unwrap();
        let err = registry.add(region("status", "2,1,2,last")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn define_replaces_in_place() {
        let mut registry = RegionRegistry::new();
        registry.add(region("a", "1,1,1,10")).unwrap();
        registry.add(region("b", "2,1,2,10")).unwrap();
        let old = registry.define(region("a", "5,1,6,10")).unwrap();
        assert_eq!(old.bounds, RegionBounds::rows_cols(1, 1, 1, 10));
        let names: Vec<&str> = registry.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(registry.define(region("c", "1,1,1,1")).is_none());
    }

    #[test]
    fn region_at_returns_first_enabled_match() {
        let mut registry = RegionRegistry::new();
        registry.add(region("header", "1,1,2,last")).unwrap();
        registry.add(region("screen", "1,1,last,last")).unwrap();

        assert_eq!(registry.region_at(1, 5, 24, 80).unwrap().name, "header");
        assert_eq!(registry.region_at(10, 5, 24, 80).unwrap().name, "screen");

        registry.set_enabled("header", false).unwrap();
        assert_eq!(registry.region_at(1, 5, 24, 80).unwrap().name, "screen");
        assert!(registry.region_at(30, 1, 24, 80).is_none());
    }

    #[test]
    fn remove_unknown_region() {
        let mut registry = RegionRegistry::new();
        let err = registry.remove("missing").unwrap_err();
        assert_eq!(err.code, ErrorCode::RegionNotFound);
        assert_eq!(
            registry.set_enabled("missing", true).unwrap_err().code,
            ErrorCode::RegionNotFound
        );
    }

    #[test]
    fn region_json_is_flat() {
        let r = region("status", "1,1,1,last");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "status", "top": 1, "bottom": 1, "left": 1, "right": "last",
                "mode": "announce", "enabled": true
            })
        );
    }

    #[test]
    fn profile_round_trip() {
        let mut registry = RegionRegistry::new();
        registry.add(region("status", "1,1,1,last")).unwrap();
        registry
            .add(region("log", "3,1,last,last").with_enabled(false))
            .unwrap();

        let json = registry.to_profile("build").to_json().unwrap();
        let profile = RegionProfile::from_json(&json).unwrap();
        assert_eq!(profile.name, "build");
        assert_eq!(RegionRegistry::from_profile(&profile).unwrap(), registry);
    }

    #[test]
    fn profile_load_normalizes_and_defaults() {
        let json = r#"{"name": "p", "regions": [
            {"name": "x", "top": 9, "bottom": 3, "left": "last", "right": 2}
        ]}"#;
        let profile = RegionProfile::from_json(json).unwrap();
        let r = &profile.regions[0];
        assert_eq!(r.bounds.top(), Bound::Index(3));
        assert_eq!(r.bounds.right(), Bound::Last);
        assert_eq!(r.mode, RegionMode::Announce);
        assert!(r.enabled);
    }

    #[test]
    fn profile_rejects_bad_bounds() {
        let json = r#"{"name": "p", "regions": [
            {"name": "x", "top": 0, "bottom": 3, "left": 1, "right": 2}
        ]}"#;
        assert!(RegionProfile::from_json(json).is_err());
        let json = r#"{"name": "p", "regions": [
            {"name": "x", "top": "first", "bottom": 3, "left": 1, "right": 2}
        ]}"#;
        assert!(RegionProfile::from_json(json).is_err());
    }
}
