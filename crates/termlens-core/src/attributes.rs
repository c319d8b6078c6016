//! Text attribute state decoded from SGR escape sequences.
//!
//! These types are independent of any terminal emulator so the parser and
//! the attribute-inspection command can share them.

use serde::{Deserialize, Serialize};

const NAMED_COLORS: [&str; 8] = [
    "black", "red", "green", "yellow", "blue", "magenta", "cyan", "white",
];

/// A terminal color.
///
/// - `Named`: the 16 standard colors (0-7 normal, 8-15 bright)
/// - `Palette256`: 256-color palette index
/// - `Rgb`: 24-bit true color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ColorSpec {
    Named { index: u8 },
    Palette256 { index: u8 },
    Rgb { r: u8, g: u8, b: u8 },
}

impl ColorSpec {
    /// Standard color; indexes above 15 wrap into range.
    #[must_use]
    pub fn named(index: u8) -> Self {
        Self::Named { index: index % 16 }
    }

    #[must_use]
    pub fn palette(index: u8) -> Self {
        Self::Palette256 { index }
    }

    #[must_use]
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::Rgb { r, g, b }
    }

    /// Speakable name: `red`, `bright red`, `color 123`, `RGB(255,128,0)`.
    #[must_use]
    pub fn name(&self) -> String {
        match *self {
            ColorSpec::Named { index } if index < 8 => NAMED_COLORS[usize::from(index)].to_string(),
            ColorSpec::Named { index } => {
                format!("bright {}", NAMED_COLORS[usize::from(index % 8)])
            }
            ColorSpec::Palette256 { index } => format!("color {}", index),
            ColorSpec::Rgb { r, g, b } => format!("RGB({},{},{})", r, g, b),
        }
    }
}

/// How much detail [`AttributeState::describe`] includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescribeMode {
    /// Colors only.
    Brief,
    /// Colors followed by format flags.
    #[default]
    Detailed,
}

/// Running text attributes.
///
/// `None` colors mean the terminal default. `Default` is the reset state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AttributeState {
    pub foreground: Option<ColorSpec>,
    pub background: Option<ColorSpec>,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
    pub blink: bool,
    pub inverse: bool,
    pub hidden: bool,
    pub strikethrough: bool,
}

impl AttributeState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fg(mut self, color: ColorSpec) -> Self {
        self.foreground = Some(color);
        self
    }

    #[must_use]
    pub fn with_bg(mut self, color: ColorSpec) -> Self {
        self.background = Some(color);
        self
    }

    #[must_use]
    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    #[must_use]
    pub fn with_underline(mut self, underline: bool) -> Self {
        self.underline = underline;
        self
    }

    /// Restore every field to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether nothing is set.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the active format flags, in a fixed order.
    #[must_use]
    pub fn flags(&self) -> Vec<&'static str> {
        [
            (self.bold, "bold"),
            (self.dim, "dim"),
            (self.italic, "italic"),
            (self.underline, "underline"),
            (self.blink, "blink"),
            (self.inverse, "inverse"),
            (self.hidden, "hidden"),
            (self.strikethrough, "strikethrough"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }

    /// Human-readable summary for speech output.
    ///
    /// ```
    /// use termlens_core::attributes::{AttributeState, ColorSpec, DescribeMode};
    ///
    /// let state = AttributeState::new().with_fg(ColorSpec::named(1)).with_bold(true);
    /// assert_eq!(state.describe(DescribeMode::Brief), "red");
    /// assert_eq!(state.describe(DescribeMode::Detailed), "red foreground, bold");
    /// ```
    #[must_use]
    pub fn describe(&self, mode: DescribeMode) -> String {
        let mut parts: Vec<String> = Vec::new();

        match mode {
            DescribeMode::Brief => {
                if let Some(fg) = self.foreground {
                    parts.push(fg.name());
                }
                if let Some(bg) = self.background {
                    parts.push(format!("{} background", bg.name()));
                }
            }
            DescribeMode::Detailed => {
                if let Some(fg) = self.foreground {
                    parts.push(format!("{} foreground", fg.name()));
                }
                if let Some(bg) = self.background {
                    parts.push(format!("{} background", bg.name()));
                }
                let flags = self.flags();
                if !flags.is_empty() {
                    parts.push(flags.join(", "));
                }
            }
        }

        if parts.is_empty() {
            "default attributes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_names() {
        assert_eq!(ColorSpec::named(1).name(), "red");
        assert_eq!(ColorSpec::named(9).name(), "bright red");
        assert_eq!(ColorSpec::named(15).name(), "bright white");
        assert_eq!(ColorSpec::palette(123).name(), "color 123");
        assert_eq!(ColorSpec::rgb(255, 128, 0).name(), "RGB(255,128,0)");
    }

    #[test]
    fn default_state_description() {
        let state = AttributeState::default();
        assert!(state.is_default());
        assert_eq!(state.describe(DescribeMode::Brief), "default attributes");
        assert_eq!(state.describe(DescribeMode::Detailed), "default attributes");
    }

    #[test]
    fn brief_mode_omits_flags() {
        let state = AttributeState::new()
            .with_bg(ColorSpec::named(4))
            .with_underline(true);
        assert_eq!(state.describe(DescribeMode::Brief), "blue background");
    }

    #[test]
    fn detailed_mode_lists_colors_then_flags() {
        let mut state = AttributeState::new()
            .with_fg(ColorSpec::rgb(1, 2, 3))
            .with_bg(ColorSpec::palette(17))
            .with_bold(true);
        state.italic = true;
        assert_eq!(
            state.describe(DescribeMode::Detailed),
            "RGB(1,2,3) foreground, color 17 background, bold, italic"
        );
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = AttributeState::new().with_fg(ColorSpec::named(2)).with_bold(true);
        state.reset();
        assert_eq!(state, AttributeState::default());
    }

    #[test]
    fn color_serializes_tagged() {
        let json = serde_json::to_string(&ColorSpec::rgb(1, 2, 3)).unwrap();
        assert_eq!(json, r#"{"type":"rgb","r":1,"g":2,"b":3}"#);
    }
}
