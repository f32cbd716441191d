//! First-fit line breaking.

use crate::paragraph::{break_extra, Fragment};

/// Line start indices for `fragments` filled first-fit into `width`.
///
/// A line takes fragments while the accumulated width fits and ends at the
/// last break opportunity that still fits. A line with no such opportunity
/// is cut before the fragment that overflowed.
pub fn greedy_breaks(fragments: &[Fragment], width: i32, hyphen_width: i32) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut start = 0usize;
    while start < fragments.len() {
        starts.push(start);
        let mut used = fragments[start].width;
        let mut best: Option<usize> = None;
        let mut next = start + 1;
        while next < fragments.len() {
            let candidate = &fragments[next];
            if candidate.break_before.allows_break()
                && used + break_extra(fragments, next, hyphen_width) <= width
            {
                best = Some(next);
            }
            used += candidate.glue_before + candidate.width;
            if used > width {
                break;
            }
            next += 1;
        }
        if next >= fragments.len() {
            break;
        }
        start = best.unwrap_or(next);
    }
    starts
}
