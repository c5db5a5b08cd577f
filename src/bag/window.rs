// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Window planning for the streaming iterators.
//!
//! Chunk time ranges may overlap, so chunks cannot be read one at a time.
//! Each step picks a *window*: every chunk that can hold a message in the
//! time range about to be emitted. All of their index entries in that range
//! are queued before anything is emitted, so no later chunk can produce a
//! message that sorts before one already handed out.
//!
//! Forward, from position `P`:
//! ```text
//!   A [------P-----]          A, B contain P      -> selected
//!   B      [----------]       window end = max end of A, B
//!   C              [-----]    C starts inside the window -> selected
//!   D                  [--]   D starts after the window   -> next step
//! ```
//! The window covers `[P, window_end]`; the next step starts at
//! `window_end + 1ns`. Reverse is the mirror image.

use serde::{Deserialize, Serialize};

use super::record::ChunkSummary;
use crate::Time;

/// Traversal direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Earliest message first
    #[default]
    Forward,
    /// Latest message first
    Reverse,
}

/// One planned window step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    /// Indices (into the summary list) of the chunks to load
    pub selected: Vec<usize>,
    /// Inclusive lower time bound of the entries to queue
    pub lower: Time,
    /// Inclusive upper time bound of the entries to queue
    pub upper: Time,
    /// Position of the following step; `None` when nothing can follow
    pub next: Option<Time>,
    /// Selected chunks that straddle `next` and will be needed again
    pub retained: Vec<usize>,
}

impl WindowPlan {
    /// Check if an entry time falls inside this window.
    pub fn covers(&self, time: Time) -> bool {
        self.lower <= time && time <= self.upper
    }
}

/// Plan the window starting at `position`.
///
/// `candidates` holds indices of chunks that may still contribute; chunks that
/// lie entirely behind `position` are removed from it. Returns `None` once no
/// candidate remains in the traversal direction.
pub fn plan_window(
    summaries: &[ChunkSummary],
    candidates: &mut Vec<usize>,
    position: Time,
    direction: Direction,
) -> Option<WindowPlan> {
    match direction {
        Direction::Forward => plan_forward(summaries, candidates, position),
        Direction::Reverse => plan_reverse(summaries, candidates, position),
    }
}

fn plan_forward(
    summaries: &[ChunkSummary],
    candidates: &mut Vec<usize>,
    position: Time,
) -> Option<WindowPlan> {
    candidates.retain(|&i| summaries[i].end_time >= position);

    let mut lower = position;
    let mut selected: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&i| summaries[i].contains(position))
        .collect();

    if selected.is_empty() {
        // Gap: jump to the earliest chunk start after the position.
        lower = candidates.iter().map(|&i| summaries[i].start_time).min()?;
        selected = candidates
            .iter()
            .copied()
            .filter(|&i| summaries[i].start_time == lower)
            .collect();
    }

    let window_end = selected
        .iter()
        .map(|&i| summaries[i].end_time)
        .max()
        .unwrap_or(lower);

    for &i in candidates.iter() {
        let start = summaries[i].start_time;
        if start > lower && start <= window_end && !selected.contains(&i) {
            selected.push(i);
        }
    }
    selected.sort_unstable();

    let retained = selected
        .iter()
        .copied()
        .filter(|&i| summaries[i].end_time > window_end)
        .collect();

    Some(WindowPlan {
        selected,
        lower,
        upper: window_end,
        next: window_end.next_nano(),
        retained,
    })
}

fn plan_reverse(
    summaries: &[ChunkSummary],
    candidates: &mut Vec<usize>,
    position: Time,
) -> Option<WindowPlan> {
    candidates.retain(|&i| summaries[i].start_time <= position);

    let mut upper = position;
    let mut selected: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&i| summaries[i].contains(position))
        .collect();

    if selected.is_empty() {
        // Gap: jump to the latest chunk end before the position.
        upper = candidates.iter().map(|&i| summaries[i].end_time).max()?;
        selected = candidates
            .iter()
            .copied()
            .filter(|&i| summaries[i].end_time == upper)
            .collect();
    }

    let window_start = selected
        .iter()
        .map(|&i| summaries[i].start_time)
        .min()
        .unwrap_or(upper);

    for &i in candidates.iter() {
        let end = summaries[i].end_time;
        if end < upper && end >= window_start && !selected.contains(&i) {
            selected.push(i);
        }
    }
    selected.sort_unstable();

    let retained = selected
        .iter()
        .copied()
        .filter(|&i| summaries[i].start_time < window_start)
        .collect();

    Some(WindowPlan {
        selected,
        lower: window_start,
        upper,
        next: window_start.prev_nano(),
        retained,
    })
}
