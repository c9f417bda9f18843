//! Offset-based text resolution.
//!
//! Layout elements and entities returned by Document AI never carry their own
//! text. They carry text anchors: sequences of half-open `[start, end)` offsets
//! into the document's single text buffer, counted in UTF-16 code units.
//! [`resolve`] turns such a sequence back into the text it denotes.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` range of UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OffsetRange {
    pub start: usize,
    pub end: usize,
}

impl OffsetRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<(usize, usize)> for OffsetRange {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

/// Raised when a range does not satisfy `start <= end <= len`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("offset range #{index} ({start}..{end}) is out of bounds for text of length {len}")]
pub struct OutOfBoundsError {
    /// Position of the offending range in the sequence.
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub len: usize,
}

/// Read-only view of a document's full text, addressed in UTF-16 code units.
#[derive(Debug, Clone)]
pub struct TextBuffer<'a> {
    text: &'a str,
    utf16_len: usize,
    /// Byte offset of the char containing each UTF-16 unit, followed by
    /// `text.len()`. `None` for ASCII text, where both offsets coincide.
    unit_bytes: Option<Vec<usize>>,
}

impl<'a> TextBuffer<'a> {
    pub fn new(text: &'a str) -> Self {
        if text.is_ascii() {
            return Self {
                text,
                utf16_len: text.len(),
                unit_bytes: None,
            };
        }

        let mut unit_bytes = Vec::with_capacity(text.len() + 1);
        for (byte, c) in text.char_indices() {
            for _ in 0..c.len_utf16() {
                unit_bytes.push(byte);
            }
        }
        let utf16_len = unit_bytes.len();
        unit_bytes.push(text.len());

        Self {
            text,
            utf16_len,
            unit_bytes: Some(unit_bytes),
        }
    }

    /// Length in UTF-16 code units.
    pub fn len(&self) -> usize {
        self.utf16_len
    }

    /// Resolve a sequence of ranges against this buffer.
    pub fn resolve(&self, ranges: &[OffsetRange]) -> Result<String, OutOfBoundsError> {
        resolve(self, ranges)
    }

    fn check(&self, index: usize, range: &OffsetRange) -> Result<(), OutOfBoundsError> {
        if range.start > range.end || range.end > self.len() {
            return Err(OutOfBoundsError {
                index,
                start: range.start,
                end: range.end,
                len: self.len(),
            });
        }
        Ok(())
    }

    /// True when `unit` does not fall between the two halves of a surrogate pair.
    fn is_char_boundary(&self, unit: usize) -> bool {
        match &self.unit_bytes {
            None => true,
            Some(units) => unit == 0 || unit >= self.utf16_len || units[unit] != units[unit - 1],
        }
    }

    /// Slice a validated range.
    fn slice(&self, start: usize, end: usize) -> Cow<'a, str> {
        let text: &'a str = self.text;
        let Some(units) = &self.unit_bytes else {
            return Cow::Borrowed(&text[start..end]);
        };

        let (start_ok, end_ok) = (self.is_char_boundary(start), self.is_char_boundary(end));
        if start_ok && end_ok {
            return Cow::Borrowed(&text[units[start]..units[end]]);
        }

        // A boundary splits a surrogate pair: widen to whole chars, re-encode,
        // and decode exactly the addressed units. Orphaned halves become U+FFFD.
        let lo = if start_ok { start } else { start - 1 };
        let hi = if end_ok { end } else { end + 1 };
        let encoded: Vec<u16> = text[units[lo]..units[hi]].encode_utf16().collect();
        Cow::Owned(String::from_utf16_lossy(&encoded[start - lo..end - lo]))
    }
}

/// Concatenate `buffer[start..end]` for every range, in sequence order.
///
/// All ranges are validated before any text is built, so an invalid range
/// anywhere in the sequence yields an error and no partial text.
pub fn resolve(buffer: &TextBuffer<'_>, ranges: &[OffsetRange]) -> Result<String, OutOfBoundsError> {
    for (index, range) in ranges.iter().enumerate() {
        buffer.check(index, range)?;
    }

    let mut resolved = String::with_capacity(ranges.iter().map(OffsetRange::len).sum());
    for range in ranges.iter().filter(|r| !r.is_empty()) {
        resolved.push_str(&buffer.slice(range.start, range.end));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(pairs: &[(usize, usize)]) -> Vec<OffsetRange> {
        pairs.iter().copied().map(OffsetRange::from).collect()
    }

    #[test]
    fn test_empty_sequence_yields_empty_string() {
        let buffer = TextBuffer::new("anything at all");
        assert_eq!(resolve(&buffer, &[]).unwrap(), "");

        let empty = TextBuffer::new("");
        assert_eq!(resolve(&empty, &[]).unwrap(), "");
    }

    #[test]
    fn test_full_extent_is_identity() {
        let text = "Form W-9\nRequest for Taxpayer";
        let buffer = TextBuffer::new(text);
        let full = ranges(&[(0, buffer.len())]);
        assert_eq!(resolve(&buffer, &full).unwrap(), text);
    }

    #[test]
    fn test_disjoint_ranges_concatenate() {
        let buffer = TextBuffer::new("ABCDEFGHIJKLMNOP");
        let resolved = resolve(&buffer, &ranges(&[(0, 5), (10, 15)])).unwrap();
        assert_eq!(resolved, "ABCDEKLMNO");
    }

    #[test]
    fn test_empty_range_contributes_nothing() {
        let buffer = TextBuffer::new("HELLO");
        let resolved = resolve(&buffer, &ranges(&[(3, 3), (0, 2)])).unwrap();
        assert_eq!(resolved, "HE");
    }

    #[test]
    fn test_order_is_preserved() {
        let buffer = TextBuffer::new("ABCDEFGHIJ");
        let resolved = resolve(&buffer, &ranges(&[(5, 8), (0, 3)])).unwrap();
        assert_eq!(resolved, "FGHABC");
    }

    #[test]
    fn test_deterministic() {
        let buffer = TextBuffer::new("ABCDEFGHIJ");
        let seq = ranges(&[(2, 4), (7, 10), (0, 1)]);
        let first = resolve(&buffer, &seq).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&buffer, &seq).unwrap(), first);
        }
    }

    #[test]
    fn test_end_past_buffer_fails() {
        let buffer = TextBuffer::new("HELLO");
        let err = resolve(&buffer, &ranges(&[(0, 2), (3, 6)])).unwrap_err();
        assert_eq!(
            err,
            OutOfBoundsError {
                index: 1,
                start: 3,
                end: 6,
                len: 5
            }
        );
    }

    #[test]
    fn test_inverted_range_fails() {
        let buffer = TextBuffer::new("HELLO");
        let err = resolve(&buffer, &ranges(&[(4, 2)])).unwrap_err();
        assert_eq!(err.index, 0);
        assert_eq!((err.start, err.end), (4, 2));
    }

    #[test]
    fn test_range_at_exact_end_is_valid() {
        let buffer = TextBuffer::new("HELLO");
        assert_eq!(resolve(&buffer, &ranges(&[(5, 5), (4, 5)])).unwrap(), "O");
    }

    #[test]
    fn test_offsets_are_utf16_units() {
        // "é" is one unit, the emoji is a surrogate pair (two units).
        let buffer = TextBuffer::new("héllo 😀 world");
        assert_eq!(buffer.len(), 14);
        assert_eq!(buffer.resolve(&ranges(&[(1, 2)])).unwrap(), "é");
        assert_eq!(buffer.resolve(&ranges(&[(6, 8)])).unwrap(), "😀");
        assert_eq!(buffer.resolve(&ranges(&[(9, 14), (0, 5)])).unwrap(), "worldhéllo");
    }

    #[test]
    fn test_split_surrogate_pair_is_replaced() {
        let buffer = TextBuffer::new("a😀b");
        assert_eq!(buffer.resolve(&ranges(&[(1, 2)])).unwrap(), "\u{FFFD}");
        assert_eq!(buffer.resolve(&ranges(&[(2, 4)])).unwrap(), "\u{FFFD}b");
        assert_eq!(buffer.resolve(&ranges(&[(0, 2)])).unwrap(), "a\u{FFFD}");
    }

    #[test]
    fn test_utf16_length_bounds_check() {
        let buffer = TextBuffer::new("😀");
        assert!(buffer.resolve(&ranges(&[(0, 2)])).is_ok());
        assert!(buffer.resolve(&ranges(&[(0, 3)])).is_err());
    }

    #[test]
    fn test_concurrent_resolution() {
        let text = "The quick brown fox jumps over the lazy dog";
        let buffer = TextBuffer::new(text);
        let seq = ranges(&[(4, 9), (16, 19)]);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| assert_eq!(resolve(&buffer, &seq).unwrap(), "quickfox"));
            }
        });
    }
}
