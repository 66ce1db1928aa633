//! Text snapshot abstraction.
//!
//! Offsets are measured in Unicode scalar values (`char`) from the start of
//! the snapshot. Line text never includes the line break.

use std::sync::Arc;

use crate::ids::SnapshotVersion;

/// A half-open character range (`start..end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    /// Create a range; a reversed pair is normalized to `start..start`.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    #[must_use]
    pub fn with_len(start: usize, len: usize) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    /// Length; a hand-built reversed range counts as empty.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the ranges overlap or touch. Touching counts so that empty
    /// markers at a range boundary are still reported.
    #[must_use]
    pub fn intersects_with(&self, other: &TextRange) -> bool {
        self.start.max(other.start) <= self.end.min(other.end)
    }

    #[must_use]
    pub fn clamp_to(self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end.min(len))
    }
}

/// One replacement applied to a snapshot: `old_len` characters at `offset`
/// were replaced by `new_len` characters.
///
/// When a buffer change carries several of these they apply in order, each
/// offset relative to the text produced by the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChange {
    pub offset: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl TextChange {
    #[must_use]
    pub fn insertion(offset: usize, len: usize) -> Self {
        Self {
            offset,
            old_len: 0,
            new_len: len,
        }
    }

    #[must_use]
    pub fn deletion(offset: usize, len: usize) -> Self {
        Self {
            offset,
            old_len: len,
            new_len: 0,
        }
    }

    #[must_use]
    pub fn delta(&self) -> isize {
        self.new_len as isize - self.old_len as isize
    }
}

/// A line of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLine {
    /// 0-indexed line number.
    pub number: usize,
    /// Offset of the first character.
    pub start: usize,
    /// Offset just past the last character, before the line break.
    pub end: usize,
    pub text: String,
}

impl SnapshotLine {
    /// Length in characters, excluding the line break.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Read-only view of buffer content at one version. Provided by the host.
pub trait TextSnapshot: Send + Sync {
    fn version(&self) -> SnapshotVersion;

    /// Total length in characters.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn line_count(&self) -> usize;

    /// Line at `index`, or `None` past the end.
    fn line(&self, index: usize) -> Option<SnapshotLine>;

    /// Whole-snapshot range.
    fn full_range(&self) -> TextRange {
        TextRange::new(0, self.len())
    }
}

/// A buffer edit as delivered by the host: the changes and the snapshot after.
#[derive(Clone)]
pub struct BufferChange {
    pub changes: Vec<TextChange>,
    pub after: Arc<dyn TextSnapshot>,
}

/// An immutable in-memory snapshot backed by a string.
#[derive(Debug, Clone)]
pub struct StringSnapshot {
    version: SnapshotVersion,
    chars: Arc<[char]>,
    /// `(start, end)` of every line, end excluding the break.
    lines: Arc<[(usize, usize)]>,
}

impl StringSnapshot {
    #[must_use]
    pub fn new(version: SnapshotVersion, text: &str) -> Self {
        let chars: Arc<[char]> = text.chars().collect();
        let lines = compute_lines(&chars);
        Self {
            version,
            chars,
            lines,
        }
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    /// Replace `delete_len` characters at `offset` with `insert`, producing the
    /// next version and the change that describes the edit. Out-of-range
    /// offsets are clamped to the snapshot.
    #[must_use]
    pub fn edit(&self, offset: usize, delete_len: usize, insert: &str) -> (Self, TextChange) {
        let offset = offset.min(self.chars.len());
        let delete_len = delete_len.min(self.chars.len() - offset);
        let inserted: Vec<char> = insert.chars().collect();

        let mut chars = Vec::with_capacity(self.chars.len() - delete_len + inserted.len());
        chars.extend_from_slice(&self.chars[..offset]);
        chars.extend_from_slice(&inserted);
        chars.extend_from_slice(&self.chars[offset + delete_len..]);

        let chars: Arc<[char]> = chars.into();
        let lines = compute_lines(&chars);
        let next = Self {
            version: self.version.next(),
            chars,
            lines,
        };
        let change = TextChange {
            offset,
            old_len: delete_len,
            new_len: inserted.len(),
        };
        (next, change)
    }
}

fn compute_lines(chars: &[char]) -> Arc<[(usize, usize)]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\r' => {
                lines.push((start, i));
                i += if chars.get(i + 1) == Some(&'\n') { 2 } else { 1 };
                start = i;
            }
            '\n' => {
                lines.push((start, i));
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    lines.push((start, chars.len()));
    lines.into()
}

impl TextSnapshot for StringSnapshot {
    fn version(&self) -> SnapshotVersion {
        self.version
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line(&self, index: usize) -> Option<SnapshotLine> {
        let &(start, end) = self.lines.get(index)?;
        Some(SnapshotLine {
            number: index,
            start,
            end,
            text: self.chars[start..end].iter().collect(),
        })
    }
}
