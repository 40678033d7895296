//! The fuzzy substring locator: scoring (4.A), alphabet building (4.B), the
//! bitap search itself (4.C), and the dispatcher that shortcuts exact cases
//! before falling back to it (4.D).
//!
//! Grounded on the teacher crate's `AsciiPattern`: a per-byte mask table
//! built by clearing the bit at each position a byte occurs in the pattern,
//! with absent bytes implicitly all-ones (here: absent from the map, with
//! callers treating a missing entry as mask `0` per the bit convention used
//! below — this crate sets rather than clears bits, since a second axis,
//! positional score, needs a match bit to mean "present" not "absent"; see
//! [`build_alphabet`]).

use crate::Config;
use std::collections::HashMap;

/// Maps each byte occurring in `pattern` to a mask with bit `(m-1-i)` set
/// for every position `i` at which that byte appears. Bytes that never
/// occur in the pattern are absent; callers must treat a missing entry as
/// mask `0`.
pub fn build_alphabet(pattern: &[u8]) -> HashMap<u8, usize> {
    let m = pattern.len();
    let mut masks: HashMap<u8, usize> = HashMap::new();
    for (i, &b) in pattern.iter().enumerate() {
        let bit = 1usize << (m - 1 - i);
        *masks.entry(b).or_insert(0) |= bit;
    }
    masks
}

/// Combines edit-distance accuracy and positional proximity into a single
/// score where lower is better and `0` is a perfect hit.
pub fn score(config: &Config, errors: usize, x: usize, loc: usize, pattern_len: usize) -> f64 {
    let accuracy = errors as f64 / pattern_len as f64;
    let proximity = (loc as i64 - x as i64).unsigned_abs() as f64;
    if config.match_distance == 0 {
        return if x == loc { accuracy } else { 1.0 };
    }
    accuracy + proximity / config.match_distance as f64
}

/// Finds the best fuzzy occurrence of `pattern` in `text` near byte offset
/// `loc`, using bitap with an error budget driven by `config.match_threshold`
/// and a positional penalty driven by `config.match_distance`.
///
/// Preconditions: `pattern.len() <= config.match_max_bits`. Callers that
/// might be handed an oversized pattern (the patch applier's "oversized
/// path") must split it down first; this function does not check.
pub fn match_bitap(config: &Config, text: &str, pattern: &str, loc: usize) -> Option<usize> {
    let text = text.as_bytes();
    let pattern = pattern.as_bytes();
    let m = pattern.len();
    debug_assert!(m <= config.match_max_bits as usize);
    if m == 0 {
        return Some(loc.min(text.len()));
    }

    let alphabet = build_alphabet(pattern);
    let mut score_threshold = config.match_threshold;

    // Nearby-exact speedup: tighten the threshold using the nearest exact
    // occurrences on either side of `loc`, without yet committing to them as
    // `best_loc` — only a fuzzy match below sets that.
    if let Some(p) = find_from(text, pattern, loc) {
        score_threshold = score_threshold.min(score(config, 0, p, loc, m));
        if let Some(p2) = find_last_within(text, pattern, loc + m) {
            score_threshold = score_threshold.min(score(config, 0, p2, loc, m));
        }
    }

    let mask = 1usize << (m - 1);
    let mut best_loc: Option<usize> = None;
    let mut last_rd: Vec<usize> = Vec::new();
    let mut bin_max = m + text.len();

    for d in 0..m {
        // Binary search the maximum distance `bin_mid` from `loc` at which
        // the score for `d` errors still clears `score_threshold`, seeding
        // the search range from the previous iteration's result so the
        // overall work stays bounded.
        let mut bin_min = 0usize;
        let mut bin_mid = bin_max;
        while bin_min < bin_mid {
            if score(config, d, loc + bin_mid, loc, m) <= score_threshold {
                bin_min = bin_mid;
            } else {
                bin_max = bin_mid;
            }
            bin_mid = (bin_max - bin_min) / 2 + bin_min;
        }
        bin_max = bin_mid;

        let mut start = if loc > bin_mid { loc - bin_mid + 1 } else { 1 };
        let finish = (loc + bin_mid).min(text.len()) + m;

        let mut rd = vec![0usize; finish + 2];
        rd[finish + 1] = (1usize << d) - 1;

        let mut j = finish;
        while j >= start {
            let char_mask = if j >= 1 && j - 1 < text.len() {
                *alphabet.get(&text[j - 1]).unwrap_or(&0)
            } else {
                0
            };
            if d == 0 {
                rd[j] = ((rd[j + 1] << 1) | 1) & char_mask;
            } else {
                rd[j] = (((rd[j + 1] << 1) | 1) & char_mask)
                    | (((last_rd[j + 1] | last_rd[j]) << 1) | 1)
                    | last_rd[j + 1];
            }
            if rd[j] & mask != 0 {
                let s = score(config, d, j - 1, loc, m);
                if s <= score_threshold {
                    score_threshold = s;
                    best_loc = Some(j - 1);
                    if best_loc.unwrap() > loc {
                        let shrink = 2 * (loc as i64) - (best_loc.unwrap() as i64);
                        start = start.max(shrink.max(1) as usize);
                    } else {
                        break;
                    }
                }
            }
            if j == 0 {
                break;
            }
            j -= 1;
        }

        if score(config, d + 1, loc, loc, m) > score_threshold {
            break;
        }
        last_rd = rd;
    }

    best_loc
}

fn find_from(text: &[u8], pattern: &[u8], loc: usize) -> Option<usize> {
    if loc >= text.len() {
        return if pattern.is_empty() && loc <= text.len() {
            Some(loc)
        } else {
            None
        };
    }
    text[loc..]
        .windows(pattern.len().max(1))
        .enumerate()
        .find(|(_, w)| *w == pattern)
        .map(|(i, _)| loc + i)
}

fn find_last_within(text: &[u8], pattern: &[u8], end: usize) -> Option<usize> {
    let end = end.min(text.len());
    if pattern.len() > end {
        return None;
    }
    (0..=end - pattern.len())
        .rev()
        .find(|&i| &text[i..i + pattern.len()] == pattern)
}

/// Shortcuts the exact cases (`text == pattern`, empty `text`, an exact hit
/// already sitting at `loc`) before delegating to [`match_bitap`].
pub fn match_main(config: &Config, text: &str, pattern: &str, loc: usize) -> Option<usize> {
    let loc = loc.min(text.len());
    if text == pattern {
        return Some(0);
    }
    if text.is_empty() {
        return None;
    }
    if text[loc..].as_bytes().starts_with(pattern.as_bytes()) {
        return Some(loc);
    }
    match_bitap(config, text, pattern, loc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn s1_exact_match_near_loc() {
        assert_eq!(match_main(&cfg(), "abcdefghijk", "fgh", 5), Some(5));
    }

    #[test]
    fn s2_fuzzy_match_with_one_error() {
        assert_eq!(match_main(&cfg(), "abcdefghijk", "efxhi", 0), Some(4));
    }

    #[test]
    fn s3_no_match_within_threshold() {
        assert_eq!(match_main(&cfg(), "abcdef", "xxxxx", 3), None);
    }

    #[test]
    fn exact_text_equals_pattern() {
        assert_eq!(match_main(&cfg(), "same", "same", 0), Some(0));
    }

    #[test]
    fn empty_text_has_no_match() {
        assert_eq!(match_main(&cfg(), "", "abc", 0), None);
    }

    #[test]
    fn match_at_loc_shortcuts_bitap() {
        assert_eq!(match_main(&cfg(), "hello world", "world", 6), Some(6));
    }

    #[test]
    fn alphabet_sets_bit_per_position() {
        let a = build_alphabet(b"abcab");
        // 'a' occurs at positions 0 and 3 (0-indexed from the left); with
        // m=5, bit (m-1-i) so position 0 -> bit 4, position 3 -> bit 1.
        assert_eq!(a[&b'a'], (1 << 4) | (1 << 1));
        assert_eq!(a[&b'b'], (1 << 3) | (1 << 0));
        assert_eq!(a[&b'c'], 1 << 2);
    }

    #[test]
    fn score_is_monotone_in_errors_and_distance() {
        let c = cfg();
        let base = score(&c, 0, 10, 10, 5);
        assert!(score(&c, 1, 10, 10, 5) >= base);
        assert!(score(&c, 0, 20, 10, 5) >= base);
    }

    #[test]
    fn score_zero_distance_requires_exact_location() {
        let mut c = cfg();
        c.match_distance = 0;
        assert_eq!(score(&c, 2, 5, 5, 4), 0.5);
        assert_eq!(score(&c, 0, 6, 5, 4), 1.0);
    }

    /// Cross-checks `match_bitap` against a slow, obviously-correct scan
    /// over every window of `text`, the same role the teacher crate's
    /// `strsim`-backed `bitap-reference::baseline` plays for its own bitap.
    fn naive_bitap(config: &Config, text: &str, pattern: &str, loc: usize) -> Option<usize> {
        let m = pattern.len();
        if m == 0 {
            return Some(loc.min(text.len()));
        }
        let text = text.as_bytes();
        let pattern_str = pattern;
        let mut best: Option<(f64, usize)> = None;
        for start in 0..text.len() {
            for end in start..=text.len() {
                let window = match std::str::from_utf8(&text[start..end]) {
                    Ok(w) => w,
                    Err(_) => continue,
                };
                let dist = strsim::levenshtein(pattern_str, window);
                if dist as f64 / m as f64 > config.match_threshold {
                    continue;
                }
                let s = score(config, dist, start, loc, m);
                if s <= config.match_threshold && best.map(|(bs, _)| s < bs).unwrap_or(true) {
                    best = Some((s, start));
                }
            }
        }
        best.map(|(_, loc)| loc)
    }

    #[quickcheck_macros::quickcheck]
    fn bitap_never_beats_threshold(text: String, pattern: String, loc: usize) -> quickcheck::TestResult {
        if pattern.is_empty() || pattern.len() > 20 || text.len() > 40 || !text.is_ascii() || !pattern.is_ascii()
        {
            return quickcheck::TestResult::discard();
        }
        let config = Config::default();
        let loc = loc % (text.len() + 1);
        if let Some(found) = match_bitap(&config, &text, &pattern, loc) {
            let naive_best_score = naive_bitap(&config, &text, &pattern, loc)
                .map(|naive_loc| {
                    let dist = strsim::levenshtein(
                        &pattern,
                        &text[naive_loc..(naive_loc + pattern.len()).min(text.len())],
                    );
                    score(&config, dist, naive_loc, loc, pattern.len())
                });
            let dist = strsim::levenshtein(&pattern, &text[found..(found + pattern.len()).min(text.len())]);
            let found_score = score(&config, dist, found, loc, pattern.len());
            if let Some(naive_score) = naive_best_score {
                assert!(found_score <= naive_score + 1e-9);
            }
        }
        quickcheck::TestResult::passed()
    }
}
