//! Fuzzy matching and patching for plain text.
//!
//! This crate couples a bitap-based fuzzy substring locator with a patch
//! builder/splitter/applier and a portable textual serialization, in the
//! style of Neil Fraser's `diff_match_patch`. It is split into four modules:
//!
//! - [`matching`]: the locator (`match_main`/`match_bitap`) and its scoring
//!   function.
//! - [`diff`]: the supporting diff engine (`diff_main` and friends) that the
//!   patch builder and applier use to reconcile texts.
//! - [`patch`]: `Patch` construction, context padding, splitting, and
//!   application.
//! - [`text`]: serializing patches to and parsing them from the on-wire
//!   `@@ ... @@` format.

pub mod diff;
pub mod matching;
pub mod patch;
pub mod text;

pub use diff::{Diff, Op};
pub use matching::{match_bitap, match_main};
pub use patch::{
    add_context, add_padding, patch_apply, patch_deep_copy, patch_make, patch_make_diffs,
    patch_make_texts, split_max, Patch,
};
pub use text::{patch_from_text, patch_to_text, ParseError};

/// Tunable parameters shared by every function in this crate.
///
/// Created once with [`Config::default`] and optionally adjusted before use;
/// it is read-only (`&Config`) during any single call. Callers who need
/// different parameters for different calls should keep their own instance
/// per call site rather than mutating a shared one.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Score above which no match is accepted. 0 means a perfect match is
    /// required; 1 means any match is accepted.
    pub match_threshold: f64,
    /// Number of characters of drift from the expected location at which the
    /// positional penalty in [`matching::score`] reaches 1.0.
    pub match_distance: i64,
    /// Maximum pattern length the bitap locator can handle. Patterns longer
    /// than this must be split before calling [`matching::match_bitap`]
    /// directly; [`matching::match_main`] enforces this for callers that go
    /// through it.
    pub match_max_bits: u32,
    /// Maximum ratio of Levenshtein distance to pattern length tolerated for
    /// an oversized patch body before [`patch::patch_apply`] rejects it even
    /// though both endpoints were located.
    pub patch_delete_threshold: f64,
    /// Number of bytes of context kept on each side of a patch.
    pub patch_margin: u32,
    /// Soft wall-clock budget, in seconds, for the diff engine's bisect
    /// phase. Zero disables the deadline check.
    pub diff_timeout: f64,
    /// Cost, in arbitrary units, charged per edit operation by
    /// [`diff::diff_cleanup_efficiency`] when weighing whether to merge a
    /// short equality between two edits.
    pub diff_edit_cost: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            match_threshold: 0.5,
            match_distance: 1000,
            match_max_bits: 32,
            patch_delete_threshold: 0.5,
            patch_margin: 4,
            diff_timeout: 1.0,
            diff_edit_cost: 4,
        }
    }
}
