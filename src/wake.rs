//! Wake phrase detection over noisy transcripts
//!
//! Speech engines rarely hear "hey cat" the same way twice, so detection runs
//! in two passes: an exact substring scan over the whole transcript, then a
//! bounded fuzzy scan over the start of it.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::fuzzy::distance;

/// Only this many leading characters are searched on the fuzzy path
pub const FUZZY_PREFIX_CHARS: usize = 40;

/// Built-in English wake phrases, canonical form first, then the ways the
/// recognizer tends to mishear it.
pub const ENGLISH_PHRASES: &[&str] = &[
    "hey cat",
    "lazy cat",
    "hey kat",
    "hay cat",
    "hey cad",
    "hey cap",
    "hey kitty",
    "okay cat",
];

/// How many edits a fuzzy wake match may need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Strict,
    #[default]
    Default,
    Loose,
}

impl Sensitivity {
    pub fn max_distance(self) -> usize {
        match self {
            Sensitivity::Strict => 1,
            Sensitivity::Default => 2,
            Sensitivity::Loose => 3,
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sensitivity::Strict => write!(f, "strict"),
            Sensitivity::Default => write!(f, "default"),
            Sensitivity::Loose => write!(f, "loose"),
        }
    }
}

impl FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" | "0" => Ok(Sensitivity::Strict),
            "default" | "1" => Ok(Sensitivity::Default),
            "loose" | "2" => Ok(Sensitivity::Loose),
            other => Err(format!(
                "unknown sensitivity '{}' (expected strict, default or loose)",
                other
            )),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WakePhraseError {
    #[error("wake phrase set must contain at least one non-blank phrase")]
    Empty,
}

/// Ordered, immutable list of wake phrase variants.
///
/// Entries are lowercase and trimmed; declaration order breaks ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakePhraseSet {
    phrases: Vec<String>,
}

impl WakePhraseSet {
    pub fn new<I, S>(phrases: I) -> Result<Self, WakePhraseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for phrase in phrases {
            let phrase = phrase.as_ref().trim().to_lowercase();
            if !phrase.is_empty() && !normalized.contains(&phrase) {
                normalized.push(phrase);
            }
        }

        if normalized.is_empty() {
            return Err(WakePhraseError::Empty);
        }
        Ok(Self { phrases: normalized })
    }

    /// The built-in English set
    pub fn english() -> Self {
        Self {
            phrases: ENGLISH_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.phrases.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn canonical(&self) -> &str {
        &self.phrases[0]
    }
}

impl Default for WakePhraseSet {
    fn default() -> Self {
        Self::english()
    }
}

/// Where a wake phrase was found. Indices count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatch {
    pub start_index: usize,
    pub matched_variant: String,
    /// Length of the matched span in the transcript; differs from the
    /// variant's length only for fuzzy matches near the end of short text.
    pub span_len: usize,
}

impl WakeMatch {
    pub fn end_index(&self) -> usize {
        self.start_index + self.span_len
    }
}

/// Find the earliest wake phrase in `text`, exact first, fuzzy second
pub fn find_wake(
    text: &str,
    phrases: &WakePhraseSet,
    sensitivity: Sensitivity,
) -> Option<WakeMatch> {
    let folded = fold_case(text);
    find_exact(&folded, phrases).or_else(|| find_fuzzy(&folded, phrases, sensitivity))
}

/// Text following the wake phrase, trimmed.
///
/// `Some("")` means a bare wake word; `None` means no wake phrase at all.
pub fn strip_after_wake(
    text: &str,
    phrases: &WakePhraseSet,
    sensitivity: Sensitivity,
) -> Option<String> {
    let found = find_wake(text, phrases, sensitivity)?;
    let rest: String = text.chars().skip(found.end_index()).collect();
    Some(trim_remainder(&rest).to_string())
}

/// Lowercase one char for one char so indices into the folded text stay
/// valid for the original.
fn fold_case(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn trim_remainder(rest: &str) -> &str {
    rest.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ';' | ':'))
}

fn find_exact(folded: &[char], phrases: &WakePhraseSet) -> Option<WakeMatch> {
    let mut best: Option<WakeMatch> = None;

    for phrase in phrases.iter() {
        let needle: Vec<char> = phrase.chars().collect();
        if needle.len() > folded.len() {
            continue;
        }
        let Some(start) = folded.windows(needle.len()).position(|w| w == needle.as_slice())
        else {
            continue;
        };
        // strictly smaller, so earlier-declared phrases keep ties
        if best.as_ref().is_none_or(|b| start < b.start_index) {
            best = Some(WakeMatch {
                start_index: start,
                matched_variant: phrase.to_string(),
                span_len: needle.len(),
            });
        }
    }

    best
}

fn find_fuzzy(
    folded: &[char],
    phrases: &WakePhraseSet,
    sensitivity: Sensitivity,
) -> Option<WakeMatch> {
    let prefix = &folded[..folded.len().min(FUZZY_PREFIX_CHARS)];
    if prefix.is_empty() {
        return None;
    }
    let max = sensitivity.max_distance();

    for phrase in phrases.iter() {
        let width = phrase.chars().count().min(prefix.len());
        for start in 0..=(prefix.len() - width) {
            let candidate: String = prefix[start..start + width].iter().collect();
            if distance(&candidate, phrase, max) <= max {
                return Some(WakeMatch {
                    start_index: start,
                    matched_variant: phrase.to_string(),
                    span_len: width,
                });
            }
        }
    }

    None
}
