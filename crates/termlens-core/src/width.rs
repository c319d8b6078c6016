//! Display-width arithmetic for terminal text.
//!
//! Terminals lay text out in fixed-width cells: most characters take one
//! cell, CJK ideographs and emoji take two, combining marks take none. The
//! functions here convert between strings and those cells.
//!
//! Two width views exist:
//!
//! | Function | Unit | Emoji ZWJ family |
//! |----------|------|------------------|
//! | [`string_width`] | code point | sum of members |
//! | [`display_width`] | grapheme cluster | 2 |
//!
//! Column slicing uses the grapheme view so that composed emoji are never
//! cut apart.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

/// Width assigned to a multi-codepoint emoji sequence.
pub const EMOJI_WIDTH: usize = 2;

const ZWJ: char = '\u{200D}';
const VARIATION_SELECTOR_16: char = '\u{FE0F}';
const COMBINING_KEYCAP: char = '\u{20E3}';

/// Width of a single code point: 0, 1 or 2.
///
/// Control characters are 0. Code points the width tables do not know about
/// default to 1.
#[must_use]
pub fn char_width(c: char) -> usize {
    match UnicodeWidthChar::width(c) {
        Some(w) => w.min(2),
        None if c.is_control() => 0,
        None => 1,
    }
}

/// Sum of per-code-point widths.
#[must_use]
pub fn string_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

/// Width of one grapheme cluster.
///
/// Emoji sequences (joiners, skin tones, presentation selectors, flags,
/// keycaps) count as one glyph of [`EMOJI_WIDTH`]. Anything else is the sum
/// of its code points, which leaves a base character plus combining marks at
/// the width of the base.
#[must_use]
pub fn grapheme_width(grapheme: &str) -> usize {
    if grapheme.is_ascii() {
        return grapheme.chars().map(char_width).sum();
    }
    if is_emoji_sequence(grapheme) {
        return EMOJI_WIDTH;
    }
    grapheme.chars().map(char_width).sum()
}

/// Width of a string as a terminal would draw it, per grapheme cluster.
#[must_use]
pub fn display_width(s: &str) -> usize {
    if s.is_ascii() {
        return string_width(s);
    }
    s.graphemes(true).map(grapheme_width).sum()
}

/// Substring covering display columns `[start_col, end_col)`, 1-based.
///
/// Clusters are never split: a double-width glyph is included whole when it
/// starts at or after `start_col` and ends within `end_col`, and excluded
/// whole otherwise. Columns past the end of the string yield nothing, so
/// short lines are never padded.
#[must_use]
pub fn slice_by_columns(s: &str, start_col: usize, end_col: usize) -> &str {
    if end_col <= start_col || s.is_empty() {
        return "";
    }

    let mut col = 1;
    let mut begin: Option<usize> = None;
    let mut end = 0;

    for (idx, grapheme) in s.grapheme_indices(true) {
        let width = grapheme_width(grapheme);
        let glyph_start = col;
        let glyph_end = col + width;
        col = glyph_end;

        if glyph_start < start_col {
            continue;
        }
        if glyph_end > end_col || (width == 0 && glyph_start >= end_col) {
            break;
        }
        begin.get_or_insert(idx);
        end = idx + grapheme.len();
    }

    match begin {
        Some(begin) => &s[begin..end],
        None => "",
    }
}

/// Byte index of the first cluster starting at or after display column `col`.
///
/// Returns `s.len()` when the string is narrower than `col`.
#[must_use]
pub fn byte_index_at_column(s: &str, col: usize) -> usize {
    let mut current = 1;
    for (idx, grapheme) in s.grapheme_indices(true) {
        if current >= col {
            return idx;
        }
        current += grapheme_width(grapheme);
    }
    s.len()
}

/// Character index of the cluster covering display column `col` (1-based).
///
/// A column inside a double-width glyph maps to that glyph. Columns past
/// the end map to the character count.
#[must_use]
pub fn column_to_index(s: &str, col: usize) -> usize {
    let mut current = 1;
    let mut index = 0;
    for grapheme in s.graphemes(true) {
        let width = grapheme_width(grapheme);
        if col < current + width.max(1) {
            return index;
        }
        current += width;
        index += grapheme.chars().count();
    }
    index
}

/// Reorder right-to-left runs into visual order.
///
/// Pure left-to-right text is returned borrowed. Without the `bidi` feature
/// the text is always returned in logical order.
#[cfg(feature = "bidi")]
#[must_use]
pub fn reorder_for_display(text: &str) -> Cow<'_, str> {
    use unicode_bidi::BidiInfo;

    if !has_rtl(text) {
        return Cow::Borrowed(text);
    }

    let info = BidiInfo::new(text, None);
    if let [para] = info.paragraphs.as_slice() {
        return info.reorder_line(para, para.range.clone());
    }

    let mut result = String::with_capacity(text.len());
    for para in &info.paragraphs {
        result.push_str(&info.reorder_line(para, para.range.clone()));
    }
    Cow::Owned(result)
}

/// Reorder right-to-left runs into visual order (disabled build: identity).
#[cfg(not(feature = "bidi"))]
#[must_use]
pub fn reorder_for_display(text: &str) -> Cow<'_, str> {
    Cow::Borrowed(text)
}

/// Whether any character belongs to a right-to-left script or is an RTL mark.
#[must_use]
pub fn has_rtl(text: &str) -> bool {
    text.chars().any(|c| is_rtl_char(c) || is_rtl_control(c))
}

/// Whether the text is mostly right-to-left.
///
/// Counts Hebrew and Arabic letters against other alphabetic characters.
#[must_use]
pub fn is_rtl(text: &str) -> bool {
    let mut rtl = 0usize;
    let mut ltr = 0usize;
    for c in text.chars() {
        if is_rtl_char(c) {
            rtl += 1;
        } else if c.is_alphabetic() {
            ltr += 1;
        }
    }
    rtl > ltr
}

fn is_rtl_char(c: char) -> bool {
    matches!(
        u32::from(c),
        0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x10800..=0x10FFF | 0x1E800..=0x1EFFF
    )
}

fn is_rtl_control(c: char) -> bool {
    matches!(c, '\u{200F}' | '\u{202B}' | '\u{202E}' | '\u{2067}')
}

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn is_skin_tone(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

fn is_tag(c: char) -> bool {
    ('\u{E0020}'..='\u{E007F}').contains(&c)
}

fn is_keycap_base(c: char) -> bool {
    c.is_ascii_digit() || c == '#' || c == '*'
}

fn is_pictographic(c: char) -> bool {
    matches!(
        u32::from(c),
        0x00A9
            | 0x00AE
            | 0x203C
            | 0x2049
            | 0x2122
            | 0x2139
            | 0x2194..=0x21AA
            | 0x2300..=0x23FF
            | 0x24C2
            | 0x25AA..=0x25FE
            | 0x2600..=0x27BF
            | 0x2934..=0x2935
            | 0x2B05..=0x2B55
            | 0x3030
            | 0x303D
            | 0x3297
            | 0x3299
            | 0x1F000..=0x1FAFF
    )
}

/// Whether a grapheme cluster is a composed emoji.
fn is_emoji_sequence(grapheme: &str) -> bool {
    let mut chars = grapheme.chars();
    let Some(base) = chars.next() else {
        return false;
    };
    let rest: Vec<char> = chars.collect();
    if rest.is_empty() {
        return false;
    }

    if is_regional_indicator(base) {
        return rest.iter().copied().any(is_regional_indicator);
    }
    if is_keycap_base(base) {
        return rest.contains(&COMBINING_KEYCAP);
    }

    let modified = rest.iter().any(|&c| {
        c == ZWJ || c == VARIATION_SELECTOR_16 || is_skin_tone(c) || is_tag(c)
    });
    modified && is_pictographic(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_to_index_maps_into_wide_glyphs() {
        let s = "a漢b";
        assert_eq!(column_to_index(s, 1), 0);
        assert_eq!(column_to_index(s, 2), 1);
        assert_eq!(column_to_index(s, 3), 1);
        assert_eq!(column_to_index(s, 4), 2);
        assert_eq!(column_to_index(s, 9), 3);
        assert_eq!(column_to_index("e\u{301}x", 2), 2);
    }

    #[test]
    fn char_widths() {
        assert_eq!(char_width('A'), 1);
        assert_eq!(char_width('漢'), 2);
        assert_eq!(char_width('\u{0301}'), 0);
        assert_eq!(char_width('\u{7}'), 0);
    }

    #[test]
    fn string_width_sums_code_points() {
        let samples = ["Hello世界", "e\u{301}", "👨\u{200D}👩\u{200D}👧", "tab\there"];
        for s in samples {
            let expected: usize = s.chars().map(char_width).sum();
            assert_eq!(string_width(s), expected, "{s:?}");
        }
        assert_eq!(string_width("Hello世界"), 9);
    }

    #[test]
    fn display_width_treats_emoji_sequences_as_one_glyph() {
        assert_eq!(display_width("👨\u{200D}👩\u{200D}👧\u{200D}👦"), 2);
        assert_eq!(display_width("👍🏽"), 2);
        assert_eq!(display_width("🇺🇸"), 2);
        assert_eq!(display_width("1\u{FE0F}\u{20E3}"), 2);
        assert_eq!(display_width("❤\u{FE0F}"), 2);
        assert_eq!(display_width("👨\u{200D}👩\u{200D}👧 Family"), 9);
    }

    #[test]
    fn combining_marks_take_base_width() {
        assert_eq!(display_width("e\u{301}"), 1);
        assert_eq!(display_width("漢\u{302}"), 2);
    }

    #[test]
    fn joiner_after_plain_letter_is_not_an_emoji() {
        assert_eq!(display_width("a\u{200D}"), 1);
    }

    #[test]
    fn slice_includes_wide_glyph_starting_at_boundary() {
        assert_eq!(slice_by_columns("A漢B", 2, 4), "漢");
    }

    #[test]
    fn slice_never_splits_wide_glyph() {
        // 漢 occupies columns 2-3; a range ending inside it drops it whole.
        assert_eq!(slice_by_columns("A漢B", 1, 3), "A");
        assert_eq!(slice_by_columns("A漢B", 2, 3), "");
        // A range starting inside it also drops it.
        assert_eq!(slice_by_columns("A漢B", 3, 5), "B");
    }

    #[test]
    fn slice_ascii_ranges() {
        assert_eq!(slice_by_columns("ABCDEFGH", 2, 5), "BCD");
        assert_eq!(slice_by_columns("12", 2, 5), "2");
        assert_eq!(slice_by_columns("12", 5, 9), "");
        assert_eq!(slice_by_columns("abc", 3, 2), "");
    }

    #[test]
    fn slice_keeps_combining_marks_with_base() {
        assert_eq!(slice_by_columns("ae\u{301}b", 2, 3), "e\u{301}");
    }

    #[test]
    fn slice_keeps_emoji_sequence_whole() {
        let family = "👨\u{200D}👩\u{200D}👧";
        let s = format!("x{family}y");
        assert_eq!(slice_by_columns(&s, 2, 4), family);
        assert_eq!(slice_by_columns(&s, 4, 5), "y");
    }

    #[test]
    fn byte_index_at_column_maps_wide_text() {
        assert_eq!(byte_index_at_column("Hello", 3), 2);
        assert_eq!(byte_index_at_column("A漢B", 4), "A漢".len());
        assert_eq!(byte_index_at_column("ab", 10), 2);
    }

    #[test]
    fn rtl_detection() {
        assert!(is_rtl("שלום"));
        assert!(is_rtl("مرحبا"));
        assert!(!is_rtl("Hello שלום World"));
        assert!(has_rtl("Hello שלום World"));
        assert!(!has_rtl("plain ascii"));
        assert!(!is_rtl(""));
    }

    #[test]
    fn reorder_leaves_ltr_text_borrowed() {
        assert!(matches!(reorder_for_display("plain"), Cow::Borrowed("plain")));
    }

    #[cfg(feature = "bidi")]
    #[test]
    fn reorder_reverses_rtl_runs() {
        assert_eq!(reorder_for_display("אבג"), "גבא");
        assert_eq!(reorder_for_display("abc אבג"), "abc גבא");
    }
}
