//! Patch construction, context padding, splitting, and application
//! (components E through H).
//!
//! `Patch` is a value type: `patch_deep_copy` exists because the applier
//! must never mutate the caller's patches, but every field here is already
//! owned (`Vec`/`String`), so a deep copy is just [`Clone`].

use crate::diff::{
    ceil_char_boundary, diff_cleanup_efficiency, diff_cleanup_semantic, diff_cleanup_semantic_lossless,
    diff_levenshtein, diff_main, diff_text1, diff_text2, diff_x_index, floor_char_boundary, Diff, Op,
};
use crate::matching::match_main;
use crate::Config;

/// A localized edit: the mutating diffs plus enough surrounding context
/// (`Equal` diffs at the head and tail) to be individually locatable, and
/// the byte offsets/lengths it spans on both the pre- and post-image texts.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    pub diffs: Vec<Diff>,
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
}

impl Patch {
    fn new() -> Patch {
        Patch {
            diffs: Vec::new(),
            start1: 0,
            start2: 0,
            length1: 0,
            length2: 0,
        }
    }
}

/// Builds patches from two whole texts: diffs them, applies semantic and
/// efficiency cleanup if the diff has more than two steps, then builds from
/// `(text1, diffs)`.
pub fn patch_make_texts(config: &Config, text1: &str, text2: &str) -> Vec<Patch> {
    let mut diffs = diff_main(text1, text2, true, config);
    if diffs.len() > 2 {
        diff_cleanup_semantic(&mut diffs);
        diff_cleanup_efficiency(&mut diffs, config);
    }
    patch_make(config, text1, &diffs)
}

/// Builds patches from a diff alone, deriving `text1` via [`diff_text1`].
pub fn patch_make_diffs(config: &Config, diffs: &[Diff]) -> Vec<Patch> {
    let text1 = diff_text1(diffs);
    patch_make(config, &text1, diffs)
}

/// Core patch build: walks `diffs`, opening a patch at the first non-Equal
/// diff, folding in small equalities as internal context, and closing (with
/// [`add_context`]) once an equality grows large enough to be worth
/// splitting on.
pub fn patch_make(config: &Config, text1: &str, diffs: &[Diff]) -> Vec<Patch> {
    let mut patches = Vec::new();
    if diffs.is_empty() {
        return patches;
    }

    let margin = config.patch_margin as usize;
    let mut patch = Patch::new();
    let mut count1 = 0usize;
    let mut count2 = 0usize;
    let mut prepatch_text = text1.to_string();
    let mut postpatch_text = text1.to_string();

    for (i, diff) in diffs.iter().enumerate() {
        if patch.diffs.is_empty() && diff.op != Op::Equal {
            patch.start1 = count1;
            patch.start2 = count2;
        }

        match diff.op {
            Op::Insert => {
                patch.diffs.push(diff.clone());
                patch.length2 += diff.len();
                postpatch_text.insert_str(count2, &diff.text);
            }
            Op::Delete => {
                patch.diffs.push(diff.clone());
                patch.length1 += diff.len();
                postpatch_text.replace_range(count2..count2 + diff.len(), "");
            }
            Op::Equal => {
                let is_last = i == diffs.len() - 1;
                if diff.len() <= 2 * margin && !patch.diffs.is_empty() && !is_last {
                    patch.diffs.push(diff.clone());
                    patch.length1 += diff.len();
                    patch.length2 += diff.len();
                } else if diff.len() >= 2 * margin && !patch.diffs.is_empty() {
                    patches.push(add_context(config, patch, &prepatch_text));
                    patch = Patch::new();
                    prepatch_text = postpatch_text.clone();
                    count1 = count2;
                }
            }
        }

        if diff.op != Op::Insert {
            count1 += diff.len();
        }
        if diff.op != Op::Delete {
            count2 += diff.len();
        }
    }

    if !patch.diffs.is_empty() {
        patches.push(add_context(config, patch, &prepatch_text));
    }

    patches
}

/// Extends a patch's prefix/suffix (drawn from `text`) until its pattern is
/// unique in `text`, bounded by `config.match_max_bits`, then adds one more
/// margin of slack "for luck".
pub fn add_context(config: &Config, mut patch: Patch, text: &str) -> Patch {
    if text.is_empty() {
        return patch;
    }
    let margin = config.patch_margin as usize;
    let max_bits = config.match_max_bits as usize;

    let mut pattern = text[patch.start2..patch.start2 + patch.length1].to_string();
    let mut padding = 0usize;

    while find_first(text, &pattern) != find_last(text, &pattern)
        && pattern.len() < max_bits.saturating_sub(2 * margin)
    {
        padding += margin;
        let start = patch.start2.saturating_sub(padding);
        let end = (patch.start2 + patch.length1 + padding).min(text.len());
        if start == 0 && end == text.len() {
            // Already grown to cover the whole text; no more context to add.
            pattern = text[start..end].to_string();
            break;
        }
        pattern = text[start..end].to_string();
    }
    padding += margin;

    let prefix_start = patch.start2.saturating_sub(padding);
    let prefix = text[prefix_start..patch.start2].to_string();
    let suffix_end = (patch.start2 + patch.length1 + padding).min(text.len());
    let suffix = text[patch.start2 + patch.length1..suffix_end].to_string();

    if !prefix.is_empty() {
        patch.diffs.insert(0, Diff::new(Op::Equal, prefix.clone()));
    }
    if !suffix.is_empty() {
        patch.diffs.push(Diff::new(Op::Equal, suffix.clone()));
    }

    patch.start1 = patch.start1.saturating_sub(prefix.len());
    patch.start2 = patch.start2.saturating_sub(prefix.len());
    patch.length1 += prefix.len() + suffix.len();
    patch.length2 += prefix.len() + suffix.len();

    patch
}

fn find_first(text: &str, pattern: &str) -> Option<usize> {
    text.find(pattern)
}

fn find_last(text: &str, pattern: &str) -> Option<usize> {
    text.rfind(pattern)
}

/// Deep-copies a patch list. Every field is already owned, so this is a
/// plain clone — kept as a named function so the applier's "never mutate
/// the caller's patches" contract stays visible at call sites.
pub fn patch_deep_copy(patches: &[Patch]) -> Vec<Patch> {
    patches.to_vec()
}

/// Wraps every patch's starts in `config.patch_margin` bytes of a null-byte
/// sentinel so that patches near the very start or end of a document still
/// have context to match against, and returns the padding that was added
/// (the caller must wrap `text` in it the same way before applying).
///
/// The sentinel is literally the bytes `1..=patch_margin`, matching the
/// source behavior bit-for-bit; whether this interacts correctly with text
/// that happens to contain those control bytes is undefined, but changing
/// it would break interop with the on-wire format (see crate-level design
/// notes).
pub fn add_padding(config: &Config, patches: &mut Vec<Patch>) -> String {
    let margin = config.patch_margin as usize;
    let null_padding: String = (1..=margin as u8).map(|b| b as char).collect();

    for patch in patches.iter_mut() {
        patch.start1 += margin;
        patch.start2 += margin;
    }

    if let Some(first) = patches.first_mut() {
        if first.diffs.first().map(|d| d.op) != Some(Op::Equal) {
            first.diffs.insert(0, Diff::new(Op::Equal, null_padding.clone()));
            first.start1 -= margin;
            first.start2 -= margin;
            first.length1 += margin;
            first.length2 += margin;
        } else if margin > first.diffs[0].len() {
            let extra_len = margin - first.diffs[0].len();
            let extra = null_padding[first.diffs[0].len()..].to_string();
            first.diffs[0].text = format!("{}{}", extra, first.diffs[0].text);
            first.start1 -= extra_len;
            first.start2 -= extra_len;
            first.length1 += extra_len;
            first.length2 += extra_len;
        }
    }

    if let Some(last) = patches.last_mut() {
        if last.diffs.last().map(|d| d.op) != Some(Op::Equal) {
            last.diffs.push(Diff::new(Op::Equal, null_padding.clone()));
            last.length1 += margin;
            last.length2 += margin;
        } else if margin > last.diffs.last().unwrap().len() {
            let last_len = last.diffs.last().unwrap().len();
            let extra_len = margin - last_len;
            let extra = null_padding[..extra_len].to_string();
            last.diffs.last_mut().unwrap().text.push_str(&extra);
            last.length1 += extra_len;
            last.length2 += extra_len;
        }
    }

    null_padding
}

/// Breaks any patch whose `length1` exceeds `config.match_max_bits` into a
/// run of smaller patches, each individually locatable.
pub fn split_max(config: &Config, patches: Vec<Patch>) -> Vec<Patch> {
    let max_bits = config.match_max_bits as usize;
    let margin = config.patch_margin as usize;
    let mut result = Vec::with_capacity(patches.len());

    for big in patches {
        if big.length1 <= max_bits {
            result.push(big);
            continue;
        }

        let mut start1 = big.start1;
        let mut start2 = big.start2;
        let mut precontext = String::new();
        let mut remaining: Vec<Diff> = big.diffs;

        while !remaining.is_empty() {
            let mut sub = Patch::new();
            let mut empty = true;
            if !precontext.is_empty() {
                sub.length1 = precontext.len();
                sub.length2 = precontext.len();
                sub.diffs.push(Diff::new(Op::Equal, precontext.clone()));
            }
            sub.start1 = start1.saturating_sub(precontext.len());
            sub.start2 = start2.saturating_sub(precontext.len());

            while !remaining.is_empty() && sub.length1 < max_bits.saturating_sub(margin) {
                let diff_type = remaining[0].op;
                let diff_len = remaining[0].len();

                if diff_type == Op::Insert {
                    let d = remaining.remove(0);
                    sub.length2 += d.len();
                    start2 += d.len();
                    sub.diffs.push(d);
                    empty = false;
                } else if diff_type == Op::Delete
                    && sub.diffs.len() == 1
                    && sub.diffs[0].op == Op::Equal
                    && diff_len > 2 * max_bits
                {
                    // Monster delete: passes through oversized rather than
                    // being chopped, since slicing it wouldn't help it fit
                    // anyway.
                    let d = remaining.remove(0);
                    sub.length1 += d.len();
                    start1 += d.len();
                    empty = false;
                    sub.diffs.push(d);
                } else {
                    let available = max_bits.saturating_sub(margin).saturating_sub(sub.length1);
                    let take = diff_len.min(available);
                    let text: String = remaining[0].text[..take].to_string();
                    if take == diff_len {
                        let d = remaining.remove(0);
                        if d.op == Op::Equal {
                            sub.length1 += d.len();
                            sub.length2 += d.len();
                            start1 += d.len();
                            start2 += d.len();
                        } else {
                            sub.length1 += d.len();
                            start1 += d.len();
                            empty = false;
                        }
                        sub.diffs.push(d);
                    } else {
                        remaining[0].text = remaining[0].text[take..].to_string();
                        let op = remaining[0].op;
                        sub.length1 += take;
                        start1 += take;
                        if op != Op::Equal {
                            empty = false;
                        } else {
                            sub.length2 += take;
                            start2 += take;
                        }
                        sub.diffs.push(Diff::new(op, text));
                    }
                }
            }

            precontext = {
                let t2 = diff_text2(&sub.diffs);
                let n = margin.min(t2.len());
                t2[t2.len() - n..].to_string()
            };

            let text1_remaining = diff_text1(&remaining);
            let postcontext_len = margin.min(text1_remaining.len());
            let postcontext = text1_remaining[..postcontext_len].to_string();
            if !postcontext.is_empty() {
                sub.length1 += postcontext.len();
                sub.length2 += postcontext.len();
                if sub.diffs.last().map(|d| d.op) == Some(Op::Equal) {
                    sub.diffs.last_mut().unwrap().text.push_str(&postcontext);
                } else {
                    sub.diffs.push(Diff::new(Op::Equal, postcontext));
                }
            }

            if !empty {
                result.push(sub);
            }
        }
    }

    result
}

/// Applies `patches` to `text`, returning the rewritten text and one success
/// flag per patch, in order.
///
/// Never fails and never panics: a patch that can't be located is simply
/// marked unsuccessful, and `delta` accounting keeps later patches' expected
/// positions from drifting because of it.
pub fn patch_apply(config: &Config, patches: &[Patch], text: &str) -> (String, Vec<bool>) {
    if patches.is_empty() {
        return (text.to_string(), Vec::new());
    }

    let mut patches = patch_deep_copy(patches);
    let null_padding = add_padding(config, &mut patches);
    let mut text = format!("{}{}{}", null_padding, text, null_padding);
    let patches = split_max(config, patches);

    let max_bits = config.match_max_bits as usize;
    let mut results = Vec::with_capacity(patches.len());
    let mut delta: i64 = 0;

    for patch in &patches {
        let expected_loc = (patch.start2 as i64 + delta).max(0) as usize;
        let text1 = diff_text1(&patch.diffs);

        let (start_loc, end_loc) = if text1.len() > max_bits {
            let head_len = floor_char_boundary(text1.as_bytes(), max_bits);
            let head = &text1[..head_len];
            match match_main(config, &text, head, expected_loc) {
                Some(s) => {
                    let tail_start = ceil_char_boundary(text1.as_bytes(), text1.len() - max_bits);
                    let tail = &text1[tail_start..];
                    match match_main(config, &text, tail, expected_loc + text1.len() - max_bits) {
                        Some(e) if e > s => (Some(s), Some(e)),
                        _ => (None, None),
                    }
                }
                None => (None, None),
            }
        } else {
            (match_main(config, &text, &text1, expected_loc), None)
        };

        let start_loc = match start_loc {
            Some(s) => s,
            None => {
                results.push(false);
                delta -= patch.length2 as i64 - patch.length1 as i64;
                continue;
            }
        };

        results.push(true);
        delta = start_loc as i64 - expected_loc as i64;

        let text2_end = match end_loc {
            Some(e) => floor_char_boundary(text.as_bytes(), (e + max_bits).min(text.len())),
            None => floor_char_boundary(text.as_bytes(), (start_loc + text1.len()).min(text.len())),
        };
        let text2 = text[start_loc..text2_end].to_string();

        if text1 == text2 {
            let replacement = diff_text2(&patch.diffs);
            text.replace_range(start_loc..start_loc + text1.len(), &replacement);
        } else {
            let mut diffs = diff_main(&text1, &text2, false, config);
            if end_loc.is_some() && diff_levenshtein(&diffs) as f64 / text1.len() as f64 > config.patch_delete_threshold
            {
                *results.last_mut().unwrap() = false;
                continue;
            }
            diff_cleanup_semantic_lossless(&mut diffs);

            let mut index1 = 0usize;
            for d in &patch.diffs {
                if d.op != Op::Equal {
                    let index2 = diff_x_index(&diffs, index1);
                    match d.op {
                        Op::Insert => {
                            text.insert_str(start_loc + index2, &d.text);
                        }
                        Op::Delete => {
                            let end2 = diff_x_index(&diffs, index1 + d.len());
                            text.replace_range(start_loc + index2..start_loc + end2, "");
                        }
                        Op::Equal => unreachable!(),
                    }
                }
                if d.op != Op::Delete {
                    index1 += d.len();
                }
            }
        }
    }

    let padding_len = null_padding.len();
    let stripped = text[padding_len..text.len() - padding_len].to_string();
    (stripped, results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn make_then_apply_round_trips() {
        let a = "The quick brown fox jumps over the lazy dog.";
        let b = "That quick brown fox jumped over a lazy dog.";
        let patches = patch_make_texts(&cfg(), a, b);
        let (out, results) = patch_apply(&cfg(), &patches, a);
        assert_eq!(out, b);
        assert!(results.iter().all(|&r| r));
    }

    #[test]
    fn s5_applies_against_drifted_text() {
        let a = "The quick brown fox jumps over the lazy dog.";
        let b = "That quick brown fox jumped over a lazy dog.";
        let patches = patch_make_texts(&cfg(), a, b);
        let drifted = "The quick red rabbit jumps over the tired tiger.";
        let (out, results) = patch_apply(&cfg(), &patches, drifted);
        assert_eq!(out, "That quick red rabbit jumped over a tired tiger.");
        assert_eq!(results, vec![true, true]);
    }

    #[test]
    fn empty_patch_list_returns_input_unchanged() {
        let (out, results) = patch_apply(&cfg(), &[], "unchanged");
        assert_eq!(out, "unchanged");
        assert!(results.is_empty());
    }

    #[test]
    fn deep_copy_is_isolated_from_original() {
        let patches = patch_make_texts(&cfg(), "hello", "hullo");
        let mut copy = patch_deep_copy(&patches);
        copy[0].start1 = 999;
        assert_ne!(patches[0].start1, copy[0].start1);
    }

    #[test]
    fn padding_grows_every_start_by_margin() {
        let mut patches = patch_make_texts(&cfg(), "hello world", "hello there world");
        let before: Vec<(usize, usize)> = patches.iter().map(|p| (p.start1, p.start2)).collect();
        let padding = add_padding(&cfg(), &mut patches);
        assert_eq!(padding.len(), cfg().patch_margin as usize);
        for (p, (s1, s2)) in patches.iter().zip(before) {
            assert_eq!(p.start1, s1 + cfg().patch_margin as usize);
            assert_eq!(p.start2, s2 + cfg().patch_margin as usize);
        }
    }

    #[test]
    fn split_max_bounds_pattern_length() {
        let config = Config {
            match_max_bits: 8,
            ..Config::default()
        };
        let a = "abcdefghijklmnopqrstuvwxyz";
        let b = "abcdefghijklmnopQRSTUVWXYZ";
        let patches = patch_make_texts(&config, a, b);
        let split = split_max(&config, patches);
        for p in &split {
            assert!(p.length1 <= config.match_max_bits as usize);
        }
        let (out, _) = patch_apply(&config, &split, a);
        assert_eq!(out, b);
    }

    #[test]
    fn builder_handles_pure_insertion() {
        let a = "hello";
        let b = "hello world";
        let patches = patch_make_texts(&cfg(), a, b);
        let (out, results) = patch_apply(&cfg(), &patches, a);
        assert_eq!(out, b);
        assert!(results.iter().all(|&r| r));
    }

    #[test]
    fn builder_from_diffs_matches_builder_from_texts() {
        let a = "foo bar baz";
        let b = "foo qux baz";
        let diffs = diff_main(a, b, true, &cfg());
        let from_diffs = patch_make_diffs(&cfg(), &diffs);
        let from_texts = patch_make(&cfg(), a, &diffs);
        assert_eq!(from_diffs, from_texts);
    }
}
