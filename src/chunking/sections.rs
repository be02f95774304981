//! Section marker recognition.
//!
//! A section marker is a line consisting solely of a structural header
//! (for example `VOTO` or `DISPOSITIVO` in a court ruling). Markers only
//! label chunks; they never change how text is packed.

use crate::error::Result;
use regex::{Regex, RegexBuilder};

/// Label for text that precedes the first marker.
pub const PREAMBLE: &str = "PREAMBLE";

/// Headers of Brazilian court decisions, with and without accents.
const JUDICIAL_HEADERS: &str = r"EMENTA|RELAT[ÓO]RIO|VOTO|DISPOSITIVO|DECIS[ÃA]O|AC[ÓO]RD[ÃA]O|FUNDAMENTA[ÇC][ÃA]O";

/// A recognizer for section header lines.
///
/// # Examples
///
/// ```
/// use chunkwise::chunking::SectionMarkers;
///
/// let markers = SectionMarkers::new(&["Summary", "Details"]).unwrap();
/// assert_eq!(markers.label_of("  summary "), Some("SUMMARY".to_string()));
/// assert_eq!(markers.label_of("Summary of findings"), None);
/// ```
#[derive(Debug, Clone)]
pub struct SectionMarkers {
    pattern: Regex,
}

/// A labeled section of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    /// Upper-cased marker line, or [`PREAMBLE`].
    pub label: String,
    /// Trimmed text between this marker and the next.
    pub body: &'a str,
}

impl SectionMarkers {
    /// Builds a recognizer for the given literal header names
    /// (case-insensitive, whole line).
    ///
    /// # Errors
    ///
    /// Returns a chunking error if the resulting pattern fails to compile.
    pub fn new(headers: &[&str]) -> Result<Self> {
        let alternatives = headers
            .iter()
            .map(|h| regex::escape(h.trim()))
            .collect::<Vec<_>>()
            .join("|");
        Self::from_alternatives(&alternatives)
    }

    /// Builds a recognizer from a regex alternation of header names.
    ///
    /// # Errors
    ///
    /// Returns a chunking error if the pattern fails to compile.
    pub fn from_alternatives(alternatives: &str) -> Result<Self> {
        let pattern = RegexBuilder::new(&format!(r"^\s*(?:{alternatives})\s*$"))
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }

    /// Headers used in Brazilian court decisions.
    ///
    /// # Errors
    ///
    /// Returns a chunking error if the built-in pattern fails to compile.
    pub fn judicial() -> Result<Self> {
        Self::from_alternatives(JUDICIAL_HEADERS)
    }

    /// Returns the section label if `line` is a marker line.
    #[must_use]
    pub fn label_of(&self, line: &str) -> Option<String> {
        self.pattern
            .is_match(line)
            .then(|| line.trim().to_uppercase())
    }

    /// Splits `text` into labeled sections on marker lines.
    ///
    /// Non-empty text before the first marker becomes a [`PREAMBLE`] section.
    /// Marker lines themselves are not part of any body.
    #[must_use]
    pub fn split<'a>(&self, text: &'a str) -> Vec<Section<'a>> {
        let mut sections = Vec::new();
        let mut label = PREAMBLE.to_string();
        let mut body_start = 0;
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            if let Some(next_label) = self.label_of(line.trim_end_matches(['\r', '\n'])) {
                push_section(&mut sections, label, &text[body_start..line_start]);
                label = next_label;
                body_start = offset;
            }
        }
        push_section(&mut sections, label, &text[body_start..]);
        sections
    }
}

fn push_section<'a>(sections: &mut Vec<Section<'a>>, label: String, body: &'a str) {
    let body = body.trim();
    // A marker always opens a section, even an empty one
    if label != PREAMBLE || !body.is_empty() {
        sections.push(Section { label, body });
    }
}
