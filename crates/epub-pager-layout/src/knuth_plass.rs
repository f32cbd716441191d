//! Total-fit line breaking.
//!
//! Only inter-word glue stretches; nothing shrinks. A line's badness is
//! `100 * (slack / stretch)^3`, capped at [`INFINITY_PENALTY`]. Demerits
//! per line are `(1 + badness)^2`, plus `HYPHEN_PENALTY^2` for a break
//! inside a word and [`FITNESS_DEMERITS`] when the line's fitness class is
//! more than one step away from the previous line's. The last line of a
//! paragraph is free.
//!
//! Break candidates live in an arena; each active record points back at
//! its predecessor by index.

use crate::paragraph::{break_extra, natural_width, BreakKind, Fragment};

/// Badness of a line that cannot be set without overflowing.
pub const INFINITY_PENALTY: i64 = 1_000_000;
/// Penalty for ending a line inside a word.
pub const HYPHEN_PENALTY: i64 = 50;
/// Penalty for adjacent lines in non-neighbouring fitness classes.
pub const FITNESS_DEMERITS: i64 = 100;

/// Class of the first line's virtual predecessor.
const START_FITNESS: u8 = 1;

/// Cost terms of one line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCost {
    /// Stretch badness.
    pub badness: i64,
    /// Tightness class, `0` tight to `3` very loose.
    pub fitness: u8,
    /// Whether the line ends inside a word.
    pub hyphenated: bool,
    /// Whether this is the paragraph's last line.
    pub last: bool,
}

/// Cost terms of the line `fragments[from..to]`.
pub fn line_cost(
    fragments: &[Fragment],
    from: usize,
    to: usize,
    width: i32,
    hyphen_width: i32,
) -> LineCost {
    let last = to >= fragments.len();
    let hyphenated = matches!(
        fragments.get(to).map(|f| f.break_before),
        Some(BreakKind::Hyphen { .. })
    );
    let natural = natural_width(fragments, from, to) + break_extra(fragments, to, hyphen_width);
    let stretch: i64 = fragments[from + 1..to]
        .iter()
        .map(|f| i64::from(f.glue_before))
        .sum();
    let slack = i64::from(width) - i64::from(natural);

    let (badness, fitness) = if slack < 0 {
        (INFINITY_PENALTY, 0)
    } else if last {
        (0, START_FITNESS)
    } else if stretch == 0 {
        if slack == 0 {
            (0, 0)
        } else {
            (INFINITY_PENALTY, 3)
        }
    } else {
        let badness = (100 * slack * slack * slack / (stretch * stretch * stretch))
            .min(INFINITY_PENALTY);
        let fitness = if 10 * slack <= stretch {
            0
        } else if 2 * slack <= stretch {
            1
        } else if slack <= stretch {
            2
        } else {
            3
        };
        (badness, fitness)
    };

    LineCost {
        badness,
        fitness,
        hyphenated,
        last,
    }
}

/// Demerits of a line following a line of class `prev_fitness`.
pub fn demerits_for(cost: LineCost, prev_fitness: u8) -> i64 {
    let mut demerits = (1 + cost.badness) * (1 + cost.badness);
    if cost.hyphenated {
        demerits += HYPHEN_PENALTY * HYPHEN_PENALTY;
    }
    if !cost.last && cost.fitness.abs_diff(prev_fitness) > 1 {
        demerits += FITNESS_DEMERITS;
    }
    demerits
}

/// Total demerits of any break set, given as line start indices.
pub fn total_demerits(fragments: &[Fragment], starts: &[usize], width: i32, hyphen_width: i32) -> i64 {
    let mut prev = START_FITNESS;
    let mut total = 0;
    for (from, to) in crate::paragraph::line_ranges(starts, fragments.len()) {
        let cost = line_cost(fragments, from, to, width, hyphen_width);
        total += demerits_for(cost, prev);
        prev = cost.fitness;
    }
    total
}

#[derive(Clone, Copy, Debug)]
struct Node {
    position: usize,
    fitness: u8,
    total_demerits: i64,
    prev: Option<usize>,
}

/// Line start indices minimizing [`total_demerits`].
///
/// Every line ends at a break opportunity or the paragraph end. When every
/// active record would overflow to reach a candidate, the latest of them is
/// forced onto it with an overflowing line.
pub fn optimal_breaks(fragments: &[Fragment], width: i32, hyphen_width: i32) -> Vec<usize> {
    let len = fragments.len();
    if len == 0 {
        return Vec::new();
    }

    let mut arena = vec![Node {
        position: 0,
        fitness: START_FITNESS,
        total_demerits: 0,
        prev: None,
    }];
    let mut active: Vec<usize> = vec![0];

    let candidates = (1..len)
        .filter(|&i| fragments[i].break_before.allows_break())
        .chain(core::iter::once(len));

    for candidate in candidates {
        let mut best: [Option<(i64, usize)>; 4] = [None; 4];
        let mut retired: Option<usize> = None;
        let mut survivors = Vec::with_capacity(active.len());

        for &idx in &active {
            let node = arena[idx];
            let base = natural_width(fragments, node.position, candidate);
            if base > width {
                let better = retired.is_none_or(|r| {
                    let held = arena[r];
                    (node.position, -node.total_demerits) > (held.position, -held.total_demerits)
                });
                if better {
                    retired = Some(idx);
                }
                continue;
            }
            survivors.push(idx);
            let cost = line_cost(fragments, node.position, candidate, width, hyphen_width);
            let total = node.total_demerits + demerits_for(cost, node.fitness);
            let slot = &mut best[usize::from(cost.fitness)];
            if slot.is_none_or(|(current, _)| total < current) {
                *slot = Some((total, idx));
            }
        }

        if best.iter().all(Option::is_none) && survivors.is_empty() {
            if let Some(idx) = retired {
                let node = arena[idx];
                let cost = line_cost(fragments, node.position, candidate, width, hyphen_width);
                let total = node.total_demerits + demerits_for(cost, node.fitness);
                best[usize::from(cost.fitness)] = Some((total, idx));
            }
        }

        active = survivors;
        for (fitness, entry) in best.iter().enumerate() {
            if let Some((total, prev)) = *entry {
                arena.push(Node {
                    position: candidate,
                    fitness: fitness as u8,
                    total_demerits: total,
                    prev: Some(prev),
                });
                active.push(arena.len() - 1);
            }
        }
    }

    let Some(end) = arena
        .iter()
        .enumerate()
        .filter(|(_, node)| node.position == len)
        .min_by_key(|(_, node)| node.total_demerits)
        .map(|(idx, _)| idx)
    else {
        log::warn!("[LAYOUT] no total-fit path over {} fragments", len);
        return crate::greedy::greedy_breaks(fragments, width, hyphen_width);
    };

    let mut starts = Vec::new();
    let mut cursor = arena[end].prev;
    while let Some(idx) = cursor {
        starts.push(arena[idx].position);
        cursor = arena[idx].prev;
    }
    starts.reverse();
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greedy::greedy_breaks;

    fn words(widths: &[i32]) -> Vec<Fragment> {
        widths
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let f = Fragment::word("w", w);
                if i == 0 {
                    f
                } else {
                    f.after_space(10)
                }
            })
            .collect()
    }

    #[test]
    fn single_line_paragraph() {
        let frags = words(&[20, 20]);
        assert_eq!(optimal_breaks(&frags, 100, 5), vec![0]);
        assert_eq!(total_demerits(&frags, &[0], 100, 5), 1);
    }

    #[test]
    fn never_costs_more_than_greedy() {
        // Greedy sets [40 40] [40 20] [60 30].
        let frags = words(&[40, 40, 40, 20, 60, 30]);
        let greedy = greedy_breaks(&frags, 130, 5);
        let optimal = optimal_breaks(&frags, 130, 5);
        assert!(
            total_demerits(&frags, &optimal, 130, 5) <= total_demerits(&frags, &greedy, 130, 5)
        );
        assert_eq!(optimal[0], 0);
    }

    #[test]
    fn last_line_is_free() {
        let frags = words(&[50, 10]);
        let cost = line_cost(&frags, 1, 2, 100, 5);
        assert!(cost.last);
        assert_eq!(cost.badness, 0);
        assert_eq!(demerits_for(cost, 3), 1);
    }

    #[test]
    fn badness_grows_with_slack() {
        let frags = words(&[40, 40, 40]);
        // Line of two words: natural 90, stretch 10.
        let tight = line_cost(&frags, 0, 2, 95, 5);
        let loose = line_cost(&frags, 0, 2, 100, 5);
        assert_eq!(tight.badness, 12);
        assert_eq!(tight.fitness, 1);
        assert_eq!(loose.badness, 100);
        assert_eq!(loose.fitness, 2);
    }

    #[test]
    fn overlong_word_is_forced_onto_its_own_line() {
        let frags = words(&[10, 300, 10]);
        assert_eq!(optimal_breaks(&frags, 100, 5), vec![0, 1, 2]);
    }

    #[test]
    fn hyphen_breaks_carry_a_penalty() {
        let mut frags = words(&[30, 30]);
        frags[1].break_before = BreakKind::Hyphen {
            insert_hyphen: true,
        };
        frags[1].glue_before = 0;
        let cost = line_cost(&frags, 0, 1, 100, 5);
        assert!(cost.hyphenated);
        assert_eq!(cost.badness, INFINITY_PENALTY);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let frags = words(&[12, 33, 7, 21, 40, 18, 9, 27, 31, 15, 22, 8]);
        let first = optimal_breaks(&frags, 80, 4);
        for _ in 0..4 {
            assert_eq!(optimal_breaks(&frags, 80, 4), first);
        }
    }
}
