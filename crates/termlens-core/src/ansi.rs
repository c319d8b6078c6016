//! ANSI escape sequence decoding.
//!
//! A linear scan splits input into plain text and escape sequences:
//!
//! | Sequence | Effect |
//! |----------|--------|
//! | `ESC [ params m` (SGR) | mutates the running [`AttributeState`] |
//! | other CSI (`ESC [ 2 K`, `ESC [ 5 A`) | removed, state untouched |
//! | OSC (`ESC ] ... BEL` or `ESC ] ... ESC \`) | removed, state untouched |
//! | anything malformed or truncated | passed through verbatim |
//!
//! Span offsets are byte offsets into the stripped text.

use std::borrow::Cow;
use std::ops::Range;

use crate::attributes::{AttributeState, ColorSpec};

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// A run of stripped text sharing one attribute state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub range: Range<usize>,
    pub state: AttributeState,
}

/// Result of [`AnsiParser::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    /// Input with every recognized escape sequence removed.
    pub text: String,
    /// Attribute state after the last sequence.
    pub state: AttributeState,
    /// Ordered, non-empty, non-overlapping runs covering `text`.
    pub spans: Vec<StyledSpan>,
}

impl ParsedText {
    /// Attribute state in effect at a byte offset of the stripped text.
    #[must_use]
    pub fn state_at(&self, offset: usize) -> Option<&AttributeState> {
        self.spans
            .iter()
            .find(|span| span.range.contains(&offset))
            .map(|span| &span.state)
    }
}

/// Format flags addressable by SGR codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Bold,
    Dim,
    Italic,
    Underline,
    Blink,
    Inverse,
    Hidden,
    Strikethrough,
}

impl Flag {
    fn slot(self, state: &mut AttributeState) -> &mut bool {
        match self {
            Flag::Bold => &mut state.bold,
            Flag::Dim => &mut state.dim,
            Flag::Italic => &mut state.italic,
            Flag::Underline => &mut state.underline,
            Flag::Blink => &mut state.blink,
            Flag::Inverse => &mut state.inverse,
            Flag::Hidden => &mut state.hidden,
            Flag::Strikethrough => &mut state.strikethrough,
        }
    }
}

/// One decoded SGR instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgrCommand {
    Reset,
    Set(Flag, bool),
    /// Code 22 turns off both bold and dim.
    NormalIntensity,
    Foreground(Option<ColorSpec>),
    Background(Option<ColorSpec>),
    Ignore,
}

impl SgrCommand {
    /// Decode the command starting at `params[0]`.
    ///
    /// Returns the command and how many parameters it consumed. Extended
    /// colors (`38;5;N`, `38;2;R;G;B`) consume their arguments; a truncated
    /// or out-of-range extended color consumes the rest and is ignored.
    #[must_use]
    pub fn decode(params: &[u16]) -> (SgrCommand, usize) {
        let Some(&code) = params.first() else {
            return (SgrCommand::Ignore, 0);
        };
        let command = match code {
            0 => SgrCommand::Reset,
            1 => SgrCommand::Set(Flag::Bold, true),
            2 => SgrCommand::Set(Flag::Dim, true),
            3 => SgrCommand::Set(Flag::Italic, true),
            4 => SgrCommand::Set(Flag::Underline, true),
            5 | 6 => SgrCommand::Set(Flag::Blink, true),
            7 => SgrCommand::Set(Flag::Inverse, true),
            8 => SgrCommand::Set(Flag::Hidden, true),
            9 => SgrCommand::Set(Flag::Strikethrough, true),
            21 => SgrCommand::Set(Flag::Bold, false),
            22 => SgrCommand::NormalIntensity,
            23 => SgrCommand::Set(Flag::Italic, false),
            24 => SgrCommand::Set(Flag::Underline, false),
            25 => SgrCommand::Set(Flag::Blink, false),
            27 => SgrCommand::Set(Flag::Inverse, false),
            28 => SgrCommand::Set(Flag::Hidden, false),
            29 => SgrCommand::Set(Flag::Strikethrough, false),
            30..=37 => SgrCommand::Foreground(Some(ColorSpec::named((code - 30) as u8))),
            39 => SgrCommand::Foreground(None),
            40..=47 => SgrCommand::Background(Some(ColorSpec::named((code - 40) as u8))),
            49 => SgrCommand::Background(None),
            90..=97 => SgrCommand::Foreground(Some(ColorSpec::named((code - 90 + 8) as u8))),
            100..=107 => SgrCommand::Background(Some(ColorSpec::named((code - 100 + 8) as u8))),
            38 | 48 => {
                let (color, consumed) = decode_extended_color(&params[1..]);
                let command = match (code, color) {
                    (_, None) => SgrCommand::Ignore,
                    (38, color) => SgrCommand::Foreground(color),
                    (_, color) => SgrCommand::Background(color),
                };
                return (command, consumed + 1);
            }
            _ => SgrCommand::Ignore,
        };
        (command, 1)
    }

    pub fn apply(self, state: &mut AttributeState) {
        match self {
            SgrCommand::Reset => state.reset(),
            SgrCommand::Set(flag, on) => *flag.slot(state) = on,
            SgrCommand::NormalIntensity => {
                state.bold = false;
                state.dim = false;
            }
            SgrCommand::Foreground(color) => state.foreground = color,
            SgrCommand::Background(color) => state.background = color,
            SgrCommand::Ignore => {}
        }
    }
}

/// Decode the arguments after a 38/48 code.
fn decode_extended_color(args: &[u16]) -> (Option<ColorSpec>, usize) {
    let byte = |v: u16| u8::try_from(v).ok();
    match args {
        [5, index, ..] => (byte(*index).map(ColorSpec::palette), 2),
        [2, r, g, b, ..] => {
            let color = match (byte(*r), byte(*g), byte(*b)) {
                (Some(r), Some(g), Some(b)) => Some(ColorSpec::rgb(r, g, b)),
                _ => None,
            };
            (color, 4)
        }
        _ => (None, args.len()),
    }
}

/// Apply a full SGR parameter list to `state`.
pub fn apply_sgr(state: &mut AttributeState, params: &[u16]) {
    let mut rest = params;
    while !rest.is_empty() {
        let (command, consumed) = SgrCommand::decode(rest);
        command.apply(state);
        rest = &rest[consumed.max(1).min(rest.len())..];
    }
}

/// Stateful parser. The running state carries over between calls, so a
/// color set on one line applies to the next, as on a real terminal.
#[derive(Debug, Clone, Default)]
pub struct AnsiParser {
    state: AttributeState,
}

impl AnsiParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known state instead of the default.
    #[must_use]
    pub fn with_state(state: AttributeState) -> Self {
        Self { state }
    }

    #[must_use]
    pub fn state(&self) -> &AttributeState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn parse(&mut self, input: &str) -> ParsedText {
        let mut text = String::with_capacity(input.len());
        let mut spans: Vec<StyledSpan> = Vec::new();
        let mut span_start = 0;

        for piece in Pieces::new(input) {
            match piece {
                Piece::Text(chunk) => text.push_str(chunk),
                Piece::Control => {}
                Piece::Sgr(params) => {
                    push_span(&mut spans, span_start..text.len(), self.state);
                    span_start = text.len();
                    apply_sgr(&mut self.state, &params);
                }
            }
        }
        push_span(&mut spans, span_start..text.len(), self.state);

        ParsedText {
            text,
            state: self.state,
            spans,
        }
    }
}

/// Parse from the default state.
#[must_use]
pub fn parse(input: &str) -> ParsedText {
    AnsiParser::new().parse(input)
}

/// Remove escape sequences without tracking attributes.
///
/// Stripping is idempotent: removing a sequence can expose a new one (an
/// unterminated `ESC [` followed by a dropped sequence), so removal repeats
/// until nothing changes.
#[must_use]
pub fn strip_only(input: &str) -> Cow<'_, str> {
    if !input.as_bytes().contains(&ESC) {
        return Cow::Borrowed(input);
    }
    let mut current = strip_once(input);
    loop {
        let next = strip_once(&current);
        if next == current {
            return Cow::Owned(current);
        }
        current = next;
    }
}

fn strip_once(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for piece in Pieces::new(input) {
        if let Piece::Text(chunk) = piece {
            out.push_str(chunk);
        }
    }
    out
}

fn push_span(spans: &mut Vec<StyledSpan>, range: Range<usize>, state: AttributeState) {
    if range.is_empty() {
        return;
    }
    if let Some(last) = spans.last_mut() {
        if last.state == state && last.range.end == range.start {
            last.range.end = range.end;
            return;
        }
    }
    spans.push(StyledSpan { range, state });
}

enum Piece<'a> {
    Text(&'a str),
    Sgr(Vec<u16>),
    Control,
}

enum Escape {
    Sgr { params: Vec<u16>, len: usize },
    Control { len: usize },
    Malformed,
}

/// Iterator splitting input into text and escape sequences.
struct Pieces<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Pieces<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }
}

impl<'a> Iterator for Pieces<'a> {
    type Item = Piece<'a>;

    fn next(&mut self) -> Option<Piece<'a>> {
        let input: &'a str = self.input;
        let rest = &input[self.pos..];
        if rest.is_empty() {
            return None;
        }

        if rest.as_bytes()[0] == ESC {
            return Some(match scan_escape(rest.as_bytes()) {
                Escape::Sgr { params, len } => {
                    self.pos += len;
                    Piece::Sgr(params)
                }
                Escape::Control { len } => {
                    self.pos += len;
                    Piece::Control
                }
                Escape::Malformed => {
                    self.pos += 1;
                    Piece::Text(&rest[..1])
                }
            });
        }

        let end = rest.find('\x1b').unwrap_or(rest.len());
        self.pos += end;
        Some(Piece::Text(&rest[..end]))
    }
}

/// Classify the escape sequence at the start of `bytes` (which begins with ESC).
fn scan_escape(bytes: &[u8]) -> Escape {
    match bytes.get(1) {
        Some(b'[') => scan_csi(bytes),
        Some(b']') => scan_osc(bytes),
        _ => Escape::Malformed,
    }
}

fn scan_csi(bytes: &[u8]) -> Escape {
    let mut i = 2;
    while bytes.get(i).is_some_and(|b| (0x30..=0x3f).contains(b)) {
        i += 1;
    }
    let params_end = i;
    while bytes.get(i).is_some_and(|b| (0x20..=0x2f).contains(b)) {
        i += 1;
    }

    let Some(&final_byte) = bytes.get(i) else {
        return Escape::Malformed;
    };
    if !(0x40..=0x7e).contains(&final_byte) {
        return Escape::Malformed;
    }

    let len = i + 1;
    if final_byte != b'm' || params_end != i {
        return Escape::Control { len };
    }
    match parse_params(&bytes[2..params_end]) {
        Some(params) => Escape::Sgr { params, len },
        None => Escape::Malformed,
    }
}

fn scan_osc(bytes: &[u8]) -> Escape {
    let mut i = 2;
    while let Some(&b) = bytes.get(i) {
        match b {
            BEL => return Escape::Control { len: i + 1 },
            ESC if bytes.get(i + 1) == Some(&b'\\') => return Escape::Control { len: i + 2 },
            ESC => return Escape::Malformed,
            _ => i += 1,
        }
    }
    Escape::Malformed
}

/// Semicolon-separated integers; empty fields are 0.
fn parse_params(raw: &[u8]) -> Option<Vec<u16>> {
    let raw = std::str::from_utf8(raw).ok()?;
    raw.split(';')
        .map(|field| {
            if field.is_empty() {
                Some(0)
            } else {
                field.parse::<u16>().ok()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::width::{char_width, string_width};

    fn fg(index: u8) -> AttributeState {
        AttributeState::new().with_fg(ColorSpec::named(index))
    }

    #[test]
    fn reset_splits_spans() {
        let parsed = parse("\x1b[31mred\x1b[0mplain");
        assert_eq!(parsed.text, "redplain");
        assert_eq!(
            parsed.spans,
            vec![
                StyledSpan {
                    range: 0..3,
                    state: fg(1)
                },
                StyledSpan {
                    range: 3..8,
                    state: AttributeState::default()
                },
            ]
        );
        assert!(parsed.state.is_default());
    }

    #[test]
    fn bright_palette_and_rgb_colors() {
        let parsed = parse("\x1b[91;44ma\x1b[38;5;208mb\x1b[48;2;10;20;30mc");
        assert_eq!(parsed.text, "abc");
        assert_eq!(parsed.state_at(0).unwrap().foreground, Some(ColorSpec::named(9)));
        assert_eq!(parsed.state_at(0).unwrap().background, Some(ColorSpec::named(4)));
        assert_eq!(parsed.state_at(1).unwrap().foreground, Some(ColorSpec::palette(208)));
        assert_eq!(parsed.state.background, Some(ColorSpec::rgb(10, 20, 30)));
    }

    #[test]
    fn flags_and_their_resets() {
        let parsed = parse("\x1b[1;2;3;4;5;7;8;9m");
        assert_eq!(
            parsed.state.flags(),
            vec!["bold", "dim", "italic", "underline", "blink", "inverse", "hidden", "strikethrough"]
        );
        let parsed = AnsiParser::with_state(parsed.state).parse("\x1b[22;23;24;25;27;28;29m");
        assert!(parsed.state.is_default());
    }

    #[test]
    fn default_color_codes() {
        let mut parser = AnsiParser::new();
        parser.parse("\x1b[32;42m");
        assert!(parser.state().foreground.is_some());
        parser.parse("\x1b[39;49m");
        assert!(parser.state().is_default());
    }

    #[test]
    fn empty_params_mean_reset() {
        let parsed = parse("\x1b[1mbold\x1b[mplain");
        assert_eq!(parsed.spans[1].state, AttributeState::default());

        let parsed = parse("\x1b[1;;4m");
        assert!(!parsed.state.bold);
        assert!(parsed.state.underline);
    }

    #[test]
    fn later_codes_win() {
        let parsed = parse("\x1b[31m\x1b[32mx");
        assert_eq!(parsed.spans, vec![StyledSpan { range: 0..1, state: fg(2) }]);
    }

    #[test]
    fn state_carries_across_calls() {
        let mut parser = AnsiParser::new();
        parser.parse("\x1b[33mfirst line");
        let second = parser.parse("second line");
        assert_eq!(second.spans[0].state, fg(3));
        parser.reset();
        assert!(parser.state().is_default());
    }

    #[test]
    fn equal_adjacent_spans_merge() {
        let parsed = parse("a\x1b[1m\x1b[0mb\x1b[0mc");
        assert_eq!(parsed.text, "abc");
        assert_eq!(parsed.spans.len(), 1);
    }

    #[test]
    fn span_offsets_are_bytes() {
        let parsed = parse("\x1b[32m漢\x1b[0mx");
        assert_eq!(parsed.spans[0].range, 0..3);
        assert_eq!(parsed.spans[1].range, 3..4);
    }

    #[test]
    fn truncated_sequences_pass_through() {
        let parsed = parse("abc\x1b[31");
        assert_eq!(parsed.text, "abc\x1b[31");
        assert!(parsed.state.is_default());

        assert_eq!(parse("x\x1b").text, "x\x1b");
        assert_eq!(parse("\x1b]0;title").text, "\x1b]0;title");
    }

    #[test]
    fn non_numeric_sgr_passes_through() {
        let parsed = parse("\x1b[1:2mX");
        assert_eq!(parsed.text, "\x1b[1:2mX");
        assert!(!parsed.state.bold);
        assert_eq!(parse("\x1b[99999mY").text, "\x1b[99999mY");
    }

    #[test]
    fn truncated_extended_color_is_ignored() {
        let parsed = parse("\x1b[1;38;2;10mX");
        assert_eq!(parsed.text, "X");
        assert!(parsed.state.bold);
        assert_eq!(parsed.state.foreground, None);
    }

    #[test]
    fn control_sequences_are_dropped_without_state_change() {
        let parsed = parse("\x1b[31ma\x1b[2Kb\x1b[5;10Hc");
        assert_eq!(parsed.text, "abc");
        assert_eq!(parsed.spans.len(), 1);
        assert_eq!(parsed.state, fg(1));
    }

    #[test]
    fn osc_strings_are_dropped() {
        assert_eq!(parse("\x1b]0;window title\x07text").text, "text");
        assert_eq!(parse("\x1b]8;;http://x\x1b\\link").text, "link");
    }

    #[test]
    fn strip_only_borrows_plain_text() {
        assert!(matches!(strip_only("plain"), Cow::Borrowed("plain")));
        assert_eq!(strip_only("\x1b[1;31mError:\x1b[0m failed"), "Error: failed");
    }

    #[test]
    fn strip_only_is_idempotent() {
        let samples = [
            "\x1b[31mred\x1b[0mplain",
            "\x1b[\x1b[0mA",
            "abc\x1b[31",
            "\x1b\x1b[1mx",
            "\x1b[1:\x1b[0mm",
            "\x1b]0;t\x07\x1b[2J",
            "漢\x1b[4m字",
        ];
        for s in samples {
            let once = strip_only(s);
            let twice = strip_only(&once);
            assert_eq!(once, twice, "{s:?}");
        }
    }

    #[test]
    fn stripped_width_is_sum_of_char_widths() {
        let samples = ["\x1b[32m漢字\x1b[0m ok", "e\u{301}\x1b[1m!", "\x1b[2Kplain"];
        for s in samples {
            let stripped = strip_only(s);
            let expected: usize = stripped.chars().map(char_width).sum();
            assert_eq!(string_width(&stripped), expected);
        }
    }

    #[test]
    fn decode_reports_consumed_parameters() {
        assert_eq!(SgrCommand::decode(&[1, 31]), (SgrCommand::Set(Flag::Bold, true), 1));
        assert_eq!(
            SgrCommand::decode(&[38, 5, 12, 1]),
            (SgrCommand::Foreground(Some(ColorSpec::palette(12))), 3)
        );
        assert_eq!(
            SgrCommand::decode(&[48, 2, 1, 2, 3]),
            (SgrCommand::Background(Some(ColorSpec::rgb(1, 2, 3))), 5)
        );
        assert_eq!(SgrCommand::decode(&[38, 5, 300]), (SgrCommand::Ignore, 3));
        assert_eq!(SgrCommand::decode(&[26]), (SgrCommand::Ignore, 1));
    }
}
