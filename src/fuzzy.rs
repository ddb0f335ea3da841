//! Bounded edit distance for wake phrase matching
//!
//! The wake detector calls this once per phrase variant per candidate window,
//! so the distance is cut off at a caller-supplied bound instead of always
//! filling the whole table.

/// Levenshtein distance between `a` and `b`, counted in characters.
///
/// Anything above `max_distance` is reported as `max_distance + 1`. When the
/// lengths alone differ by more than `max_distance` no table is computed at all,
/// and the scan stops at the first row whose every cell exceeds the bound.
///
/// Only one row of `min(len(a), len(b)) + 1` cells is kept.
pub fn distance(a: &str, b: &str, max_distance: usize) -> usize {
    let over = max_distance.saturating_add(1);

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len.abs_diff(b_len) > max_distance {
        return over;
    }

    let (long, short) = if a_len >= b_len { (a, b) } else { (b, a) };
    let short: Vec<char> = short.chars().collect();
    if short.is_empty() {
        // length check above already bounded this
        return a_len.max(b_len);
    }

    let mut row: Vec<usize> = (0..=short.len()).collect();

    for (i, lc) in long.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        let mut row_min = row[0];

        for j in 1..=short.len() {
            let above = row[j];
            let cost = usize::from(lc != short[j - 1]);
            let value = (above + 1).min(row[j - 1] + 1).min(diagonal + cost);
            diagonal = above;
            row[j] = value;
            row_min = row_min.min(value);
        }

        if row_min > max_distance {
            return over;
        }
    }

    let result = row[short.len()];
    if result > max_distance { over } else { result }
}

/// True when `a` and `b` are at most `max_distance` edits apart
pub fn within(a: &str, b: &str, max_distance: usize) -> bool {
    distance(a, b, max_distance) <= max_distance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings() {
        for s in ["", "hey cat", "lazy cat", "ünïcödé"] {
            for k in 0..4 {
                assert_eq!(distance(s, s, k), 0);
            }
        }
    }

    #[test]
    fn test_exact_distances() {
        assert_eq!(distance("hello", "helo", 3), 1);
        assert_eq!(distance("kitten", "sitting", 5), 3);
        assert_eq!(distance("lazy cat", "lazy cut", 2), 1);
        assert_eq!(distance("hey cat", "hey, cat", 2), 1);
        assert_eq!(distance("", "abc", 3), 3);
        assert_eq!(distance("abc", "", 3), 3);
    }

    #[test]
    fn test_symmetric() {
        assert_eq!(distance("kitten", "sitting", 5), distance("sitting", "kitten", 5));
        assert_eq!(distance("hey cat", "hay kat", 3), distance("hay kat", "hey cat", 3));
    }

    #[test]
    fn test_length_gap_rejected() {
        // gap of 4 with a bound of 2
        assert_eq!(distance("hey", "hey cat", 2), 3);
        assert_eq!(distance("", "abcd", 0), 1);
        assert_eq!(distance("abcdefgh", "ab", 5), 6);
    }

    #[test]
    fn test_early_exit_clamps() {
        // true distance is 4, bound is 1
        assert_eq!(distance("hello", "world", 1), 2);
        // same length, everything different
        assert_eq!(distance("aaaa", "bbbb", 2), 3);
    }

    #[test]
    fn test_zero_bound() {
        assert_eq!(distance("cat", "cat", 0), 0);
        assert_eq!(distance("cat", "cut", 0), 1);
    }

    #[test]
    fn test_bound_does_not_overflow() {
        assert_eq!(distance("a", "b", usize::MAX), 1);
    }

    #[test]
    fn test_within() {
        assert!(within("hey cat", "hey kat", 1));
        assert!(!within("hey cat", "hey dog", 2));
    }
}
