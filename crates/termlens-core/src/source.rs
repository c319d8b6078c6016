//! Host text access.
//!
//! The core never owns the terminal buffer. It talks to the host through the
//! [`TextSource`] trait, which exposes opaque position tokens plus line and
//! character movement. Tokens are only compared and moved, never dereferenced.
//!
//! [`LineBuffer`] is an in-memory implementation used by the CLI host and by
//! tests.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;

use parking_lot::RwLock;

use crate::error::SourceError;

/// Trait for reading a host's line-oriented text buffer.
///
/// Movement methods return the new token together with the number of units
/// actually moved, which is smaller than requested (possibly 0) at the
/// buffer edges. Reaching an edge is not an error.
pub trait TextSource: Send + Sync {
    /// Opaque handle to a buffer location.
    type Token: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Token at the very start of the buffer.
    fn first_position(&self) -> Result<Self::Token, SourceError>;

    /// Token at the very end of the buffer.
    fn last_position(&self) -> Result<Self::Token, SourceError>;

    /// Token for a 1-based grid location.
    fn token_at(&self, row: u32, col: u32) -> Result<Self::Token, SourceError>;

    /// Three-way ordering of two tokens in buffer order.
    fn compare(&self, a: &Self::Token, b: &Self::Token) -> Result<Ordering, SourceError>;

    /// Move to the start of the line `n` lines away.
    fn move_by_line(&self, token: &Self::Token, n: i64)
        -> Result<(Self::Token, i64), SourceError>;

    /// Move `n` characters, crossing line ends.
    fn move_by_char(&self, token: &Self::Token, n: i64)
        -> Result<(Self::Token, i64), SourceError>;

    /// Raw text of the line containing `token`, escape sequences included.
    fn line_text(&self, token: &Self::Token) -> Result<String, SourceError>;
}

/// Position inside a [`LineBuffer`].
///
/// `offset` counts characters from the line start. Each line has one extra
/// position past its last character, standing for the line terminator (or
/// the end of the buffer on the last line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferToken {
    pub line: usize,
    pub offset: usize,
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    /// Character count, cached for O(1) movement.
    chars: usize,
}

impl Line {
    fn new(text: String) -> Self {
        let chars = text.chars().count();
        Self { text, chars }
    }
}

/// A thread-safe, replaceable in-memory text buffer.
///
/// Content can be swapped at any time with [`LineBuffer::set_lines`] (new
/// output arrived). Tokens issued before a swap may become stale; callers
/// are expected to invalidate derived coordinates when they replace content.
#[derive(Debug)]
pub struct LineBuffer {
    lines: RwLock<Vec<Line>>,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl LineBuffer {
    /// Create a buffer from lines. An empty list becomes a single empty line.
    pub fn new<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            lines: RwLock::new(Self::build(lines)),
        }
    }

    /// Create a buffer from text, splitting on `\n` and dropping a trailing `\r`.
    pub fn from_text(text: &str) -> Self {
        Self::new(Self::split_text(text))
    }

    /// Replace the whole content.
    pub fn set_lines<I, L>(&self, lines: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        *self.lines.write() = Self::build(lines);
    }

    /// Replace the whole content from text.
    pub fn set_text(&self, text: &str) {
        self.set_lines(Self::split_text(text));
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.read().len()
    }

    /// Snapshot of all lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.read().iter().map(|l| l.text.clone()).collect()
    }

    fn build<I, L>(lines: I) -> Vec<Line>
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let mut built: Vec<Line> = lines.into_iter().map(|l| Line::new(l.into())).collect();
        if built.is_empty() {
            built.push(Line::new(String::new()));
        }
        built
    }

    fn split_text(text: &str) -> Vec<String> {
        let mut lines: Vec<String> = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect();
        // "a\nb\n" is two lines, not three.
        if lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }

    fn check(lines: &[Line], token: &BufferToken) -> Result<(), SourceError> {
        match lines.get(token.line) {
            Some(line) if token.offset <= line.chars => Ok(()),
            _ => Err(SourceError::StaleToken),
        }
    }
}

impl TextSource for LineBuffer {
    type Token = BufferToken;

    fn first_position(&self) -> Result<BufferToken, SourceError> {
        Ok(BufferToken { line: 0, offset: 0 })
    }

    fn last_position(&self) -> Result<BufferToken, SourceError> {
        let lines = self.lines.read();
        let line = lines.len() - 1;
        Ok(BufferToken {
            line,
            offset: lines[line].chars,
        })
    }

    /// Rows and columns outside the buffer are clamped to its edges.
    fn token_at(&self, row: u32, col: u32) -> Result<BufferToken, SourceError> {
        let lines = self.lines.read();
        let line = (row.max(1) as usize - 1).min(lines.len() - 1);
        let offset = (col.max(1) as usize - 1).min(lines[line].chars);
        Ok(BufferToken { line, offset })
    }

    fn compare(&self, a: &BufferToken, b: &BufferToken) -> Result<Ordering, SourceError> {
        let lines = self.lines.read();
        Self::check(&lines, a)?;
        Self::check(&lines, b)?;
        Ok(a.cmp(b))
    }

    fn move_by_line(&self, token: &BufferToken, n: i64) -> Result<(BufferToken, i64), SourceError> {
        let lines = self.lines.read();
        Self::check(&lines, token)?;

        let last = (lines.len() - 1) as i64;
        let target = (token.line as i64).saturating_add(n).clamp(0, last);
        let moved = target - token.line as i64;
        Ok((
            BufferToken {
                line: target as usize,
                offset: 0,
            },
            moved,
        ))
    }

    fn move_by_char(&self, token: &BufferToken, n: i64) -> Result<(BufferToken, i64), SourceError> {
        let lines = self.lines.read();
        Self::check(&lines, token)?;

        let mut line = token.line;
        let mut offset = token.offset;
        let mut remaining = n.unsigned_abs() as usize;
        let mut moved: usize = 0;

        if n > 0 {
            while remaining > 0 {
                let step = remaining.min(lines[line].chars - offset);
                offset += step;
                remaining -= step;
                moved += step;
                if remaining == 0 || line + 1 >= lines.len() {
                    break;
                }
                // Step over the terminator onto the next line.
                line += 1;
                offset = 0;
                remaining -= 1;
                moved += 1;
            }
        } else {
            while remaining > 0 {
                let step = remaining.min(offset);
                offset -= step;
                remaining -= step;
                moved += step;
                if remaining == 0 || line == 0 {
                    break;
                }
                line -= 1;
                offset = lines[line].chars;
                remaining -= 1;
                moved += 1;
            }
        }

        let moved = moved as i64;
        Ok((
            BufferToken { line, offset },
            if n < 0 { -moved } else { moved },
        ))
    }

    fn line_text(&self, token: &BufferToken) -> Result<String, SourceError> {
        let lines = self.lines.read();
        Self::check(&lines, token)?;
        Ok(lines[token.line].text.clone())
    }
}
