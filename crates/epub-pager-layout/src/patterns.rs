//! Embedded Liang pattern tables.
//!
//! Patterns use TeX notation: letters interleaved with priority digits,
//! `.` marks a word boundary. Each table is sorted by its letter bytes
//! (digits removed) so lookups can binary-search it. German patterns carry
//! UTF-8 letters; matching works on bytes throughout.
//!
//! The tables are the complete TeX sets: `hyph-en-us` for English and
//! `hyph-de-1996` for German.

use core::cmp::Ordering;

pub(crate) const ENGLISH: &[&str] = &include!("../patterns/hyph-en-us.in");

pub(crate) const GERMAN: &[&str] = &include!("../patterns/hyph-de-1996.in");

/// Longest pattern letter sequence in either table, in bytes.
pub(crate) const MAX_PATTERN_LETTERS: usize = 12;

fn letters(pattern: &str) -> impl Iterator<Item = u8> + '_ {
    pattern.bytes().filter(|b| !b.is_ascii_digit())
}

fn compare(pattern: &str, segment: &[u8]) -> Ordering {
    letters(pattern).cmp(segment.iter().copied())
}

/// Find the pattern whose letters equal `segment`.
pub(crate) fn lookup(table: &'static [&'static str], segment: &[u8]) -> Option<&'static str> {
    table
        .binary_search_by(|pattern| compare(pattern, segment))
        .ok()
        .map(|idx| table[idx])
}

/// Fold the priorities of `pattern`, anchored at `start`, into `scores`.
///
/// `scores[i]` is the priority of the gap before byte `i` of the
/// extended word.
pub(crate) fn apply(pattern: &str, start: usize, scores: &mut [u8]) {
    let mut gap = start;
    for byte in pattern.bytes() {
        if byte.is_ascii_digit() {
            let value = byte - b'0';
            if let Some(slot) = scores.get_mut(gap) {
                if *slot < value {
                    *slot = value;
                }
            }
        } else {
            gap += 1;
        }
    }
}
