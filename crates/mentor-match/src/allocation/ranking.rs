//! Stable ranking of surviving candidates and the selection explanation.
//!
//! The comparator composes the three policy rules: occupancy ratio
//! ascending (with an equality epsilon for float noise), new allocations
//! ascending, then the natural-order mentor key. The natural key is total,
//! so the composed order is total and the stable sort makes the winner a
//! pure function of the inputs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::domain::MentorId;
use super::normalize::NaturalKey;
use super::pool::{MentorPool, StateTable};

/// Occupancy ratios closer than this are considered tied.
pub const OCCUPANCY_EPSILON: f64 = 1e-9;

/// Which rule first discriminated the chosen mentor from the runner-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    MinOccupancyRatio,
    TieBrokenByAllocationsNew,
    TieBrokenByMentorId,
}

impl SelectionReason {
    pub const fn label(self) -> &'static str {
        match self {
            SelectionReason::MinOccupancyRatio => "min_occupancy_ratio",
            SelectionReason::TieBrokenByAllocationsNew => "tie_broken_by_allocations_new",
            SelectionReason::TieBrokenByMentorId => "tie_broken_by_mentor_id",
        }
    }
}

/// A survivor with its ranking fields captured at ranking time.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    /// Index into the governed pool.
    pub index: usize,
    pub mentor_id: MentorId,
    pub sort_key: NaturalKey,
    pub occupancy_ratio: f64,
    pub allocations_new: u32,
    pub remaining_capacity: u32,
}

/// Preview entry recorded on success rows so ties stay auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieBreaker {
    pub mentor_id: MentorId,
    pub occupancy_ratio: f64,
    pub allocations_new: u32,
    pub remaining_capacity: u32,
}

/// Maximum number of candidates kept in the tie-breaker preview.
pub const TIE_BREAKER_PREVIEW: usize = 5;

/// Rank the surviving pool indices; lowest-ranked candidate first.
pub(crate) fn rank_candidates(
    survivors: &[usize],
    pool: &MentorPool,
    states: &StateTable,
) -> Vec<RankedCandidate> {
    let mentors = pool.mentors();
    let mut ranked: Vec<RankedCandidate> = survivors
        .iter()
        .map(|&index| {
            let mentor = &mentors[index];
            let state = states.get(index);
            RankedCandidate {
                index,
                mentor_id: mentor.mentor_id.clone(),
                sort_key: mentor.sort_key.clone(),
                occupancy_ratio: state.occupancy_ratio(),
                allocations_new: state.allocations_new,
                remaining_capacity: state.remaining_capacity,
            }
        })
        .collect();
    ranked.sort_by(compare);
    ranked
}

/// The composed three-rule comparator. Total over distinct mentor IDs.
pub(crate) fn compare(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    if (a.occupancy_ratio - b.occupancy_ratio).abs() > OCCUPANCY_EPSILON {
        return a
            .occupancy_ratio
            .partial_cmp(&b.occupancy_ratio)
            .unwrap_or(Ordering::Equal);
    }
    a.allocations_new
        .cmp(&b.allocations_new)
        .then_with(|| a.sort_key.cmp(&b.sort_key))
}

/// Derive the selection reason by finding the first rule that separates the
/// winner from the runner-up. A lone candidate reports the primary rule.
pub(crate) fn selection_reason(
    best: &RankedCandidate,
    second: Option<&RankedCandidate>,
) -> SelectionReason {
    let Some(second) = second else {
        return SelectionReason::MinOccupancyRatio;
    };
    if (best.occupancy_ratio - second.occupancy_ratio).abs() > OCCUPANCY_EPSILON {
        SelectionReason::MinOccupancyRatio
    } else if best.allocations_new != second.allocations_new {
        SelectionReason::TieBrokenByAllocationsNew
    } else {
        SelectionReason::TieBrokenByMentorId
    }
}

/// Top-k preview of the ranked candidates.
pub(crate) fn tie_breaker_preview(ranked: &[RankedCandidate]) -> Vec<TieBreaker> {
    ranked
        .iter()
        .take(TIE_BREAKER_PREVIEW)
        .map(|candidate| TieBreaker {
            mentor_id: candidate.mentor_id.clone(),
            occupancy_ratio: candidate.occupancy_ratio,
            allocations_new: candidate.allocations_new,
            remaining_capacity: candidate.remaining_capacity,
        })
        .collect()
}
