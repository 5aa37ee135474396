use std::ops::Range;

/// A character-indexed text buffer.
///
/// The engine addresses everything in user-perceived characters: cursor
/// offsets, line end offsets and deletion counts all step one `char` at a
/// time, including double-width CJK. Backing the document with `Vec<char>`
/// keeps every offset O(1) to resolve and every splice O(n) in the spliced
/// region, which is all the editing engine needs — paragraphs are short.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharBuffer {
    chars: Vec<char>,
}

impl CharBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self { chars: Vec::new() }
    }

    /// Insert text at a char position.
    pub fn insert(&mut self, pos: usize, text: &str) {
        debug_assert!(pos <= self.chars.len());
        self.chars.splice(pos..pos, text.chars());
    }

    /// Remove `count` chars starting at `pos`. Clamped to the buffer end.
    pub fn remove(&mut self, pos: usize, count: usize) {
        let end = (pos + count).min(self.chars.len());
        let pos = pos.min(end);
        self.chars.drain(pos..end);
    }

    /// Get a slice of the buffer. Callers pass ranges derived from block
    /// spans, which are valid by the tiling invariant.
    pub fn slice(&self, range: Range<usize>) -> &[char] {
        &self.chars[range]
    }

    /// Char at `pos`, if in bounds.
    pub fn get(&self, pos: usize) -> Option<char> {
        self.chars.get(pos).copied()
    }

    /// Length of the buffer in chars.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Drop all content.
    pub fn clear(&mut self) {
        self.chars.clear();
    }

    /// Materialize a char range as an owned `String`.
    pub fn to_string_range(&self, range: Range<usize>) -> String {
        self.chars[range].iter().collect()
    }
}

impl From<&str> for CharBuffer {
    fn from(s: &str) -> Self {
        Self {
            chars: s.chars().collect(),
        }
    }
}

impl std::fmt::Display for CharBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in &self.chars {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
