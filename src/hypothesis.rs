//! N-best hypothesis selection
//!
//! The recognizer ranks alternatives by acoustic confidence and knows nothing
//! about the wake grammar. An alternative that contains the wake phrase gives a
//! cleaner command boundary, so it wins over a higher-ranked one that doesn't.

use crate::wake::{Sensitivity, WakePhraseSet, find_wake};

/// Pick the alternative to act on.
///
/// Blank alternatives are ignored. The first one (in engine order) with a wake
/// match is returned; failing that, the longest one by character count, the
/// earliest winning ties. Length is only a proxy for "most completely
/// transcribed" and may be worth revisiting. Returns `None` when every
/// alternative is blank.
pub fn select_hypothesis<S: AsRef<str>>(
    alternatives: &[S],
    phrases: &WakePhraseSet,
    sensitivity: Sensitivity,
) -> Option<String> {
    let candidates: Vec<&str> = alternatives
        .iter()
        .map(AsRef::as_ref)
        .filter(|text| !text.trim().is_empty())
        .collect();

    if let Some(with_wake) = candidates
        .iter()
        .find(|text| find_wake(text, phrases, sensitivity).is_some())
    {
        return Some(with_wake.to_string());
    }

    let mut longest: Option<(&str, usize)> = None;
    for text in candidates {
        let len = text.chars().count();
        if longest.is_none_or(|(_, best)| len > best) {
            longest = Some((text, len));
        }
    }
    longest.map(|(text, _)| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(alternatives: &[&str]) -> Option<String> {
        select_hypothesis(alternatives, &WakePhraseSet::english(), Sensitivity::Default)
    }

    #[test]
    fn test_prefers_exact_wake() {
        let picked = select(&["hey cat open the site", "hey cut open the site"]);
        assert_eq!(picked.as_deref(), Some("hey cat open the site"));
    }

    #[test]
    fn test_wake_beats_engine_rank() {
        let picked = select(&["a cab opened the site", "hey cat open the site"]);
        assert_eq!(picked.as_deref(), Some("hey cat open the site"));
    }

    #[test]
    fn test_falls_back_to_longest() {
        let picked = select(&["scroll", "scroll down please", "scroll down"]);
        assert_eq!(picked.as_deref(), Some("scroll down please"));
    }

    #[test]
    fn test_longest_tie_keeps_earliest() {
        let picked = select(&["open mail", "open main", "open"]);
        assert_eq!(picked.as_deref(), Some("open mail"));
    }

    #[test]
    fn test_blank_alternatives_skipped() {
        let picked = select(&["   ", "", "next page"]);
        assert_eq!(picked.as_deref(), Some("next page"));
        // a long run of spaces never wins the length fallback
        let picked = select(&["                        ", "go back"]);
        assert_eq!(picked.as_deref(), Some("go back"));
    }

    #[test]
    fn test_all_blank() {
        assert_eq!(select(&["", "  "]), None);
        assert_eq!(select(&[]), None);
    }
}
