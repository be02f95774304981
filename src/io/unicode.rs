//! Unicode utilities for text processing.
//!
//! Offsets inside the crate are byte offsets; the coverage audit reports
//! character offsets. These helpers keep slicing on valid UTF-8 boundaries
//! and convert between the two without rescanning from the start.

/// Finds a valid UTF-8 character boundary at or before the given position.
///
/// # Examples
///
/// ```
/// use chunkwise::io::find_char_boundary;
///
/// let s = "Hello 世界";
/// assert_eq!(find_char_boundary(s, 6), 6); // Before '世'
/// assert_eq!(find_char_boundary(s, 7), 6); // Middle of '世', backs up
/// ```
#[must_use]
pub const fn find_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let bytes = s.as_bytes();
    let mut boundary = pos;
    // UTF-8 continuation bytes start with 10xxxxxx (0x80-0xBF)
    while boundary > 0 && (bytes[boundary] & 0xC0) == 0x80 {
        boundary -= 1;
    }
    boundary
}

/// Finds a valid UTF-8 character boundary at or after the given position.
#[must_use]
pub const fn find_char_boundary_forward(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let bytes = s.as_bytes();
    let mut boundary = pos;
    while boundary < bytes.len() && (bytes[boundary] & 0xC0) == 0x80 {
        boundary += 1;
    }
    boundary
}

/// Sentence-ending markers preferred as hard-split points, in priority order.
pub const SENTENCE_MARKERS: [&str; 5] = [". ", ".\n", "! ", "?\n", "\n"];

/// Finds the first sentence break in `s[from..to]`.
///
/// Markers are tried in priority order; the returned offset is the byte
/// position just past the first marker found.
#[must_use]
pub fn find_sentence_break(s: &str, from: usize, to: usize) -> Option<usize> {
    let from = find_char_boundary_forward(s, from);
    let to = find_char_boundary(s, to);
    if from >= to {
        return None;
    }
    let window = &s[from..to];
    SENTENCE_MARKERS
        .iter()
        .find_map(|marker| window.find(marker).map(|idx| from + idx + marker.len()))
}

/// Incremental byte-to-character offset converter.
///
/// Conversions must be requested with non-decreasing byte offsets; each call
/// only scans the bytes since the previous one.
#[derive(Debug)]
pub struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCursor<'a> {
    /// Creates a cursor at the start of `text`.
    #[must_use]
    pub const fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    /// Returns the character offset of `byte`.
    ///
    /// Offsets behind the cursor are recomputed from the start.
    pub fn char_offset(&mut self, byte: usize) -> usize {
        let byte = find_char_boundary(self.text, byte);
        if byte < self.byte {
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_char_boundary() {
        let s = "Hello 世界!";
        assert_eq!(find_char_boundary(s, 0), 0);
        assert_eq!(find_char_boundary(s, 6), 6);
        assert_eq!(find_char_boundary(s, 7), 6);
        assert_eq!(find_char_boundary(s, 8), 6);
        assert_eq!(find_char_boundary(s, 9), 9);
        assert_eq!(find_char_boundary(s, 100), s.len());
    }

    #[test]
    fn test_find_char_boundary_forward() {
        let s = "Hello 世界!";
        assert_eq!(find_char_boundary_forward(s, 7), 9);
        assert_eq!(find_char_boundary_forward(s, 100), s.len());
    }

    #[test]
    fn test_find_sentence_break_prefers_period() {
        let s = "aaaa bbbb. cccc! dddd";
        // ". " wins over "! " regardless of position
        assert_eq!(find_sentence_break(s, 0, s.len()), Some(11));
    }

    #[test]
    fn test_find_sentence_break_window() {
        let s = "no break here. later";
        assert_eq!(find_sentence_break(s, 0, 5), None);
        assert_eq!(find_sentence_break(s, 5, s.len()), Some(15));
        assert_eq!(find_sentence_break(s, 10, 5), None);
    }

    #[test]
    fn test_find_sentence_break_multibyte() {
        let s = "ação concluída. próximo";
        let end = find_sentence_break(s, 1, s.len()).unwrap();
        assert!(s.is_char_boundary(end));
        assert_eq!(&s[end..], "próximo");
    }

    #[test]
    fn test_char_cursor() {
        let s = "héllo wörld";
        let mut cursor = CharCursor::new(s);
        assert_eq!(cursor.char_offset(0), 0);
        assert_eq!(cursor.char_offset(3), 2); // after 'h', 'é'
        assert_eq!(cursor.char_offset(s.len()), 11);
        // Going backwards restarts the scan
        assert_eq!(cursor.char_offset(1), 1);
    }
}
