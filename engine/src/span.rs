//! Line/column to character-range resolution.

use std::sync::LazyLock;

use regex::Regex;

use lintel_types::{TextRange, TextSnapshot};

/// First character that cannot be part of an identifier (`$` counts as one).
static WORD_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^$\w]").expect("valid word boundary regex"));

/// Resolve a 0-indexed `(line, column)` into a range of `snapshot`.
///
/// Analyzers report only a start position, so the range runs from `column` up
/// to the next word boundary on the line, or to the end of the line when none
/// follows. A column past the end of the line degenerates to one character at
/// the line end. Returns `None` when the line no longer exists.
#[must_use]
pub fn resolve_span(snapshot: &dyn TextSnapshot, line: usize, column: usize) -> Option<TextRange> {
    let line = snapshot.line(line)?;
    let line_len = line.len();

    if column > line_len {
        return Some(TextRange::with_len(line.end, 1).clamp_to(snapshot.len()));
    }

    let start = line.start + column;
    let byte_column = line
        .text
        .char_indices()
        .nth(column)
        .map_or(line.text.len(), |(byte, _)| byte);

    let end = match WORD_BOUNDARY.find_at(&line.text, byte_column) {
        Some(m) => line.start + line.text[..m.start()].chars().count(),
        None => line.end,
    };
    Some(TextRange::new(start, end))
}
