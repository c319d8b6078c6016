//! Screen model for live commands, backed by vt100.
//!
//! PTY output is fed into a vt100 parser; the visible rows are then handed
//! to the core as buffer lines. Rows keep their SGR attributes so `attrs`
//! style queries see the same colors the user sees.

use crate::host::pty::TermSize;

pub struct ScreenModel {
    parser: vt100::Parser,
}

impl ScreenModel {
    pub fn new(size: TermSize) -> Self {
        // vt100::Parser::new(rows, cols, scrollback_len)
        Self {
            parser: vt100::Parser::new(size.rows, size.cols, 0),
        }
    }

    /// Feed raw PTY output.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    /// (cols, rows)
    ///
    /// Used in tests to verify the model matches the PTY.
    #[allow(dead_code)]
    pub fn size(&self) -> (u16, u16) {
        let (rows, cols) = self.parser.screen().size();
        (cols, rows)
    }

    /// Visible rows with attributes encoded as SGR sequences.
    ///
    /// Trailing blank rows are dropped so "last" bounds track real output.
    pub fn formatted_lines(&self) -> Vec<String> {
        let screen = self.parser.screen();
        let (_, cols) = screen.size();
        let plain: Vec<String> = screen.rows(0, cols).collect();
        let used = plain
            .iter()
            .rposition(|row| !row.trim_end().is_empty())
            .map_or(0, |idx| idx + 1);

        screen
            .rows_formatted(0, cols)
            .take(used)
            .map(|row| String::from_utf8_lossy(&row).into_owned())
            .collect()
    }

    /// Visible rows as plain text, trailing blank rows dropped.
    ///
    /// Used in tests to check layout independently of SGR encoding.
    #[allow(dead_code)]
    pub fn plain_lines(&self) -> Vec<String> {
        let screen = self.parser.screen();
        let (_, cols) = screen.size();
        let mut rows: Vec<String> = screen
            .rows(0, cols)
            .map(|row| row.trim_end().to_string())
            .collect();
        while rows.last().is_some_and(|row| row.is_empty()) {
            rows.pop();
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termlens_core::ansi;
    use termlens_core::attributes::DescribeMode;

    fn screen() -> ScreenModel {
        ScreenModel::new(TermSize { cols: 40, rows: 10 })
    }

    #[test]
    fn test_plain_lines_follow_cursor_movement() {
        let mut term = screen();
        term.feed(b"First line\x1b[3;1HThird line");
        assert_eq!(term.plain_lines(), vec!["First line", "", "Third line"]);
    }

    #[test]
    fn test_blank_screen_has_no_lines() {
        let term = screen();
        assert!(term.plain_lines().is_empty());
        assert!(term.formatted_lines().is_empty());
    }

    #[test]
    fn test_formatted_lines_keep_colors() {
        let mut term = screen();
        term.feed(b"ok \x1b[31mERROR\x1b[0m\r\nnext");

        let lines = term.formatted_lines();
        assert_eq!(lines.len(), 2);

        let parsed = ansi::parse(&lines[0]);
        assert_eq!(parsed.text.trim_end(), "ok ERROR");
        let at_error = parsed.text.find("ERROR").unwrap();
        let state = parsed.state_at(at_error).expect("span for ERROR");
        assert_eq!(state.describe(DescribeMode::Detailed), "red foreground");
    }

    #[test]
    fn test_size_reports_cols_rows() {
        assert_eq!(screen().size(), (40, 10));
    }
}
