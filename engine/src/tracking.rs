//! Ranges that follow buffer edits.
//!
//! A diagnostic is resolved to a range once, against the snapshot current at
//! the time its tags were built. Afterwards every buffer change maps the range
//! forward instead of resolving again, so a marker keeps sitting on the text it
//! was attached to while the user types ahead of, inside, or after it.

use lintel_types::{TextChange, TextRange};

/// Which way a point moves when text is inserted exactly at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointTrackingMode {
    /// Stay before the inserted text.
    Negative,
    /// Move after the inserted text.
    Positive,
}

/// Map one offset through one change.
#[must_use]
pub fn map_point(pos: usize, change: &TextChange, mode: PointTrackingMode) -> usize {
    let TextChange {
        offset,
        old_len,
        new_len,
    } = *change;

    if pos < offset || (pos == offset && mode == PointTrackingMode::Negative) {
        return pos;
    }
    if pos >= offset + old_len {
        return pos - old_len + new_len;
    }
    // Inside the replaced region.
    match mode {
        PointTrackingMode::Negative => offset,
        PointTrackingMode::Positive => offset + new_len,
    }
}

/// A range tracked edge-inclusively: text typed at either edge grows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingSpan {
    range: TextRange,
}

impl TrackingSpan {
    #[must_use]
    pub fn new(range: TextRange) -> Self {
        Self { range }
    }

    #[must_use]
    pub fn range(&self) -> TextRange {
        self.range
    }

    /// Apply `changes` in order. Each offset is relative to the text produced
    /// by the previous change.
    pub fn map_through(&mut self, changes: &[TextChange]) {
        for change in changes {
            let start = map_point(self.range.start, change, PointTrackingMode::Negative);
            let end = map_point(self.range.end, change, PointTrackingMode::Positive);
            self.range = TextRange::new(start, end);
        }
    }
}
