//! Literal and regex pattern matching

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while building a matcher
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error("search pattern must not be empty")]
    EmptyPattern,

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// What to search for and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    pub raw: String,
    pub is_regex: bool,
    pub case_sensitive: bool,
}

impl PatternSpec {
    pub fn new(raw: impl Into<String>, is_regex: bool, case_sensitive: bool) -> Self {
        Self {
            raw: raw.into(),
            is_regex,
            case_sensitive,
        }
    }

    /// A case-sensitive literal pattern
    #[cfg(test)]
    pub fn literal(raw: impl Into<String>) -> Self {
        Self::new(raw, false, true)
    }

    /// A case-sensitive regex pattern
    #[cfg(test)]
    pub fn regex(raw: impl Into<String>) -> Self {
        Self::new(raw, true, true)
    }
}

/// A located occurrence; `start..end` are byte offsets into the original text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Match {
    fn at(text: &str, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            text: text[start..end].to_string(),
        }
    }
}

/// Either kind of matcher, chosen from a [`PatternSpec`]
#[derive(Debug, Clone)]
pub enum Matcher {
    Literal(LiteralMatcher),
    Regex(RegexMatcher),
}

impl Matcher {
    /// Build a matcher; regex syntax errors surface here, never at match time
    pub fn new(spec: &PatternSpec) -> Result<Self, MatchError> {
        if spec.is_regex {
            RegexMatcher::new(&spec.raw, spec.case_sensitive).map(Matcher::Regex)
        } else {
            LiteralMatcher::new(&spec.raw, spec.case_sensitive).map(Matcher::Literal)
        }
    }

    /// All non-overlapping matches, left to right
    pub fn find_all_matches(&self, text: &str) -> Vec<Match> {
        match self {
            Matcher::Literal(m) => m.find_all_matches(text),
            Matcher::Regex(m) => m.find_all_matches(text),
        }
    }

    /// The text with every match replaced
    pub fn replace(&self, text: &str, replacement: &str) -> String {
        match self {
            Matcher::Literal(m) => m.replace(text, replacement),
            Matcher::Regex(m) => m.replace(text, replacement),
        }
    }
}

/// Exact substring matcher
#[derive(Debug, Clone)]
pub struct LiteralMatcher {
    pattern: String,
    /// Lower-cased pattern, present only in case-insensitive mode
    folded: Option<String>,
}

impl LiteralMatcher {
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self, MatchError> {
        if pattern.is_empty() {
            return Err(MatchError::EmptyPattern);
        }

        let folded = (!case_sensitive).then(|| fold_case(pattern).0);
        Ok(Self {
            pattern: pattern.to_string(),
            folded,
        })
    }

    /// Scan left to right, resuming at each match's end.
    ///
    /// Occurrences that start inside a consumed match are never reported.
    pub fn find_all_matches(&self, text: &str) -> Vec<Match> {
        let Some(needle) = &self.folded else {
            return text
                .match_indices(self.pattern.as_str())
                .map(|(start, found)| Match::at(text, start, start + found.len()))
                .collect();
        };

        // Compare on lower-cased copies, report against the original
        let (haystack, boundaries) = fold_case(text);
        let mut matches = Vec::new();
        let mut pos = 0;

        while let Some(idx) = haystack[pos..].find(needle.as_str()) {
            let lowered_start = pos + idx;
            let lowered_end = lowered_start + needle.len();

            match (boundaries[lowered_start], boundaries[lowered_end]) {
                (Some(start), Some(end)) => {
                    matches.push(Match::at(text, start, end));
                    pos = lowered_end;
                }
                _ => {
                    // Hit falls inside a character whose lowercase form is several chars
                    pos = lowered_start
                        + haystack[lowered_start..]
                            .chars()
                            .next()
                            .map_or(1, char::len_utf8);
                }
            }
        }

        matches
    }

    pub fn replace(&self, text: &str, replacement: &str) -> String {
        if self.folded.is_none() {
            return text.replace(self.pattern.as_str(), replacement);
        }

        // Splice from the back so earlier offsets stay valid
        let mut result = text.to_string();
        for m in self.find_all_matches(text).iter().rev() {
            result.replace_range(m.start..m.end, replacement);
        }
        result
    }
}

/// Lower-case `text` char by char.
///
/// Returns the folded string and, for every byte offset of it (plus its end), the
/// offset in `text` of the character whose folding starts there, or `None` when
/// the offset is in the middle of one character's folding.
fn fold_case(text: &str) -> (String, Vec<Option<usize>>) {
    let mut folded = String::with_capacity(text.len());
    let mut boundaries = Vec::with_capacity(text.len() + 1);

    for (offset, c) in text.char_indices() {
        let before = folded.len();
        folded.extend(c.to_lowercase());
        boundaries.push(Some(offset));
        boundaries.extend(std::iter::repeat_n(None, folded.len() - before - 1));
    }
    boundaries.push(Some(text.len()));

    (folded, boundaries)
}

/// Regular-expression matcher; `.` always matches newlines
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self, MatchError> {
        if pattern.is_empty() {
            return Err(MatchError::EmptyPattern);
        }

        let regex = RegexBuilder::new(pattern)
            .dot_matches_new_line(true)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|source| MatchError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self { regex })
    }

    pub fn find_all_matches(&self, text: &str) -> Vec<Match> {
        self.regex
            .find_iter(text)
            .map(|m| Match::at(text, m.start(), m.end()))
            .collect()
    }

    /// Replace with `$1` / `${name}` interpolation; missing groups expand to nothing
    pub fn replace(&self, text: &str, replacement: &str) -> String {
        self.regex.replace_all(text, replacement).into_owned()
    }
}
