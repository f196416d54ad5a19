//! Fuzzy answer matching used to judge submitted answers.

/// Submissions shorter than this must match exactly.
const EXACT_MATCH_BELOW: usize = 5;

/// Judge `submitted` against the official answer and every accepted alternative.
pub fn is_correct(submitted: &str, official: &str, alternatives: &[String]) -> bool {
    matches(submitted, official)
        || alternatives
            .iter()
            .any(|alternative| matches(submitted, alternative))
}

/// Compare a single candidate case-insensitively with a length-bucketed distance threshold.
pub fn matches(submitted: &str, expected: &str) -> bool {
    let submitted = submitted.trim().to_lowercase();
    let expected = expected.trim().to_lowercase();

    if submitted.chars().count() < EXACT_MATCH_BELOW {
        return submitted == expected;
    }

    levenshtein(&submitted, &expected) < threshold(expected.chars().count())
}

/// Exclusive distance bound for an official answer of `len` characters.
fn threshold(len: usize) -> usize {
    match len {
        0..7 => 2,
        7..9 => 3,
        9..11 => 4,
        11..13 => 5,
        13..15 => 6,
        _ => 7,
    }
}

/// Classic two-row edit distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_counts_edits() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("paris", "parsi"), 2);
    }

    #[test]
    fn short_official_answer_allows_one_typo() {
        assert!(matches("pariz", "Paris"));
        assert!(!matches("parsi", "Paris"));
    }

    #[test]
    fn short_submissions_must_be_exact() {
        assert!(matches("Nile", "nile"));
        assert!(!matches("Nil", "Nile"));
        assert!(!matches("Nilr", "Nile"));
    }

    #[test]
    fn thresholds_grow_with_official_length() {
        // 14 chars => fewer than 6 edits
        assert!(matches("samuel clemmons", "Samuel Clemens"));
        assert!(!matches("mark twain", "Samuel Clemens"));
        assert_eq!(threshold(6), 2);
        assert_eq!(threshold(7), 3);
        assert_eq!(threshold(12), 5);
        assert_eq!(threshold(40), 7);
    }

    #[test]
    fn alternatives_are_tried_in_turn() {
        let alternatives = vec!["Mark Twain".to_string()];
        assert!(is_correct("mark twain", "Samuel Clemens", &alternatives));
        assert!(!is_correct("hemingway", "Samuel Clemens", &alternatives));
    }
}
