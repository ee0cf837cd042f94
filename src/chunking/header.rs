// Header classification for certificate text lines
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::config::DEFAULT_HEADER_TEXTS;

// Page footers and certificate ids are cut out of the text flow
static BOUNDARY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\bPage\s+\d+\s+of\s+\d+\b)|(?:CERTIFICATE\s+BAM-\S+)")
        .expect("boundary pattern is valid")
});

static DIGIT_OR_PUNCT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9!#$%&'()*+,\-./:;<=>?@\[\]^_`]").expect("punctuation pattern is valid")
});

const MAX_HEADER_WORDS: usize = 3;

/// How a single line participates in chunking.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Starts a new chunk and becomes its header.
    Header,
    /// Closes the open chunk; the line itself is dropped and the header cleared.
    Boundary,
    /// Ordinary content.
    Body,
}

#[derive(Debug, Clone)]
pub struct HeaderClassifier {
    known_headers: HashSet<String>,
}

impl Default for HeaderClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_HEADER_TEXTS.iter().copied())
    }
}

impl HeaderClassifier {
    pub fn new<I, S>(known_headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_headers: known_headers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, line: &str) -> LineClass {
        let line = line.trim();
        if line.is_empty() {
            return LineClass::Body;
        }
        if self.known_headers.contains(line) {
            return LineClass::Header;
        }
        if BOUNDARY_PATTERN.is_match(line) {
            return LineClass::Boundary;
        }
        if DIGIT_OR_PUNCT.is_match(line) {
            return LineClass::Body;
        }
        if line.split_whitespace().count() > MAX_HEADER_WORDS {
            return LineClass::Body;
        }
        if !line.chars().next().is_some_and(char::is_uppercase) {
            return LineClass::Body;
        }
        LineClass::Header
    }
}
