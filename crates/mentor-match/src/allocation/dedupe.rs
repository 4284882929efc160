//! National-code history deduplication.
//!
//! A student whose normalized national code already appears in the prior
//! allocation snapshot is diverted out of the allocation queue; everyone
//! else enters as a new candidate with a reason explaining the split.
//! Screening is pure and idempotent over its inputs.

use super::domain::{DedupeReason, HistoryRecord, HistorySnapshot, HistoryStatus, Student};

/// Decision made by the screen for one student.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDecision<'a> {
    pub status: HistoryStatus,
    pub reason: DedupeReason,
    pub national_code: Option<String>,
    pub prior: Option<&'a HistoryRecord>,
}

/// Deduplicator over a read-only history snapshot.
#[derive(Debug, Clone, Copy)]
pub struct HistoryScreen<'a> {
    snapshot: &'a HistorySnapshot,
}

impl<'a> HistoryScreen<'a> {
    pub fn new(snapshot: &'a HistorySnapshot) -> Self {
        Self { snapshot }
    }

    pub fn screen(&self, student: &Student) -> HistoryDecision<'a> {
        let Some(code) = student.national_code_normalized() else {
            return HistoryDecision {
                status: HistoryStatus::NewCandidate,
                reason: DedupeReason::MissingOrInvalidNationalCode,
                national_code: None,
                prior: None,
            };
        };

        match self.snapshot.get(&code) {
            Some(prior) => HistoryDecision {
                status: HistoryStatus::AlreadyAllocated,
                reason: DedupeReason::PriorAllocation,
                national_code: Some(code),
                prior: Some(prior),
            },
            None => HistoryDecision {
                status: HistoryStatus::NewCandidate,
                reason: DedupeReason::NoHistoryMatch,
                national_code: Some(code),
                prior: None,
            },
        }
    }
}

/// Split a batch into `(already_allocated, new_candidates)` preserving the
/// input order on both sides.
pub fn partition_by_history<'a>(
    students: &'a [Student],
    snapshot: &HistorySnapshot,
) -> (Vec<&'a Student>, Vec<&'a Student>) {
    let screen = HistoryScreen::new(snapshot);
    let mut already = Vec::new();
    let mut fresh = Vec::new();
    for student in students {
        match screen.screen(student).status {
            HistoryStatus::AlreadyAllocated => already.push(student),
            HistoryStatus::NewCandidate => fresh.push(student),
        }
    }
    (already, fresh)
}
