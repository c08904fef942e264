//! Similarity metrics for duplicate scoring
//!
//! Pure functions shared by the scorer:
//! - Levenshtein edit distance (Wagner-Fischer, two rows)
//! - Token-sort ratio (sort tokens, join, normalised edit distance)
//! - File-size ratio and date proximity for the metadata signal

use chrono::{DateTime, Utc};

/// Levenshtein edit distance over characters.
///
/// Time O(m·n), space O(min(m, n)).
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut prev_row: Vec<usize> = (0..=len2).collect();
    let mut curr_row: Vec<usize> = vec![0; len2 + 1];

    for i in 1..=len1 {
        curr_row[0] = i;

        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };

            curr_row[j] = std::cmp::min(
                std::cmp::min(curr_row[j - 1] + 1, prev_row[j] + 1),
                prev_row[j - 1] + cost,
            );
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len2]
}

/// Token-sort ratio: whitespace-tokenise both strings, sort the tokens,
/// join with single spaces and compare with normalised edit distance.
///
/// Both empty ⇒ 1.0; exactly one empty ⇒ 0.0.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let mut tokens_a: Vec<&str> = a.split_whitespace().collect();
    let mut tokens_b: Vec<&str> = b.split_whitespace().collect();

    match (tokens_a.is_empty(), tokens_b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    tokens_a.sort_unstable();
    tokens_b.sort_unstable();
    let sorted_a = tokens_a.join(" ");
    let sorted_b = tokens_b.join(" ");

    let max_len = sorted_a.chars().count().max(sorted_b.chars().count());
    let distance = levenshtein_distance(&sorted_a, &sorted_b);
    1.0 - distance as f64 / max_len as f64
}

/// min/max ratio of two file sizes, in [0, 1].
pub fn size_ratio(a: i64, b: i64) -> f64 {
    if a <= 0 || b <= 0 {
        return 0.0;
    }
    a.min(b) as f64 / a.max(b) as f64
}

const DATE_DECAY_WINDOW_DAYS: f64 = 30.0;
const DATE_DECAY_TAIL: f64 = 0.05;

/// Date proximity: linear decay across a 30-day window, then a small
/// exponential tail. Continuous at the window edge.
pub fn date_proximity(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let days_apart = (a - b).num_seconds().abs() as f64 / 86_400.0;
    if days_apart <= DATE_DECAY_WINDOW_DAYS {
        1.0 - (days_apart / DATE_DECAY_WINDOW_DAYS) * (1.0 - DATE_DECAY_TAIL)
    } else {
        DATE_DECAY_TAIL * (-(days_apart - DATE_DECAY_WINDOW_DAYS) / DATE_DECAY_WINDOW_DAYS).exp()
    }
}
