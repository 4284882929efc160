//! The eight-stage eligibility filter chain and the per-student trace it
//! produces.
//!
//! The chain walks the policy-declared stages in order, recording the
//! surviving candidate count before and after every stage. It never mutates
//! the pool or the student; each student gets a fresh candidate view.
//! A stage that eliminates the last candidate records the policy's
//! canonical drop reason, and wildcard no-ops are recorded explicitly.

use serde::{Deserialize, Serialize};

use super::domain::{
    AllocationChannel, DedupeReason, HistoryStatus, Student, StudentId,
};
use super::policy::{InvalidCenterAction, PolicyConfig, StageName};
use super::pool::{MentorPool, StateTable};

/// Outcome of one stage for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub before_count: usize,
    pub after_count: usize,
    pub drop_reason: Option<String>,
    pub note: Option<String>,
}

/// The full audit record for one processed student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub row_index: usize,
    pub student_id: StudentId,
    pub stages: Vec<StageResult>,
    pub allocation_channel: AllocationChannel,
    pub history_status: HistoryStatus,
    pub dedupe_reason: DedupeReason,
}

impl TraceRecord {
    /// Trace for a student that never entered the filter chain (history
    /// diversion or missing join-key data). All eight stages are present
    /// with empty candidate views so stage completeness still holds.
    pub(crate) fn without_chain(
        row_index: usize,
        student_id: StudentId,
        history_status: HistoryStatus,
        dedupe_reason: DedupeReason,
        allocation_channel: AllocationChannel,
        policy: &PolicyConfig,
    ) -> Self {
        let stages = policy
            .trace_stages
            .iter()
            .map(|stage| StageResult {
                stage: stage.name,
                before_count: 0,
                after_count: 0,
                drop_reason: None,
                note: None,
            })
            .collect();
        Self {
            row_index,
            student_id,
            stages,
            allocation_channel,
            history_status,
            dedupe_reason,
        }
    }
}

/// Result of running the chain for one student.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChainOutcome {
    /// Pool indices of the mentors that survived all eight stages.
    pub survivors: Vec<usize>,
    pub stages: Vec<StageResult>,
    /// Set when the center column held an out-of-range value.
    pub center_violation: Option<InvalidCenterAction>,
}

const NOTE_WILDCARD: &str = "wildcard";
const NOTE_INVALID_CENTER: &str = "invalid_center_downgraded_to_wildcard";

/// Apply the eight ordered stages to the governed pool.
pub(crate) fn run_filter_chain(
    student: &Student,
    pool: &MentorPool,
    states: &StateTable,
    policy: &PolicyConfig,
) -> ChainOutcome {
    let mentors = pool.mentors();
    let mut current: Vec<usize> = (0..mentors.len()).collect();
    let mut stages = Vec::with_capacity(policy.trace_stages.len());
    let mut center_violation = None;

    for stage in &policy.trace_stages {
        let before_count = current.len();
        let column = stage.source_column.as_str();
        let mut note = None;

        let filtered: Vec<usize> = match stage.name {
            StageName::Type => {
                let value = student.join_value(column);
                current
                    .iter()
                    .copied()
                    .filter(|&index| {
                        let mentor = &mentors[index];
                        value.is_some_and(|value| {
                            mentor.accepts(column, value)
                                && class_compatible(policy, value, mentor.has_school_constraint)
                        })
                    })
                    .collect()
            }
            StageName::Group
            | StageName::Gender
            | StageName::GraduationStatus
            | StageName::Finance => {
                let value = student.join_value(column);
                current
                    .iter()
                    .copied()
                    .filter(|&index| {
                        value.is_some_and(|value| mentors[index].accepts(column, value))
                    })
                    .collect()
            }
            StageName::Center => {
                let value = student.join_value(column);
                match value {
                    Some(0) => {
                        note = Some(NOTE_WILDCARD.to_string());
                        current.clone()
                    }
                    Some(value) if is_invalid_center(policy, value) => {
                        let action = policy
                            .center_rule
                            .as_ref()
                            .map(|rule| rule.on_invalid)
                            .unwrap_or(InvalidCenterAction::Wildcard);
                        center_violation = Some(action);
                        match action {
                            InvalidCenterAction::Wildcard => {
                                note = Some(NOTE_INVALID_CENTER.to_string());
                                current.clone()
                            }
                            InvalidCenterAction::Fail => Vec::new(),
                        }
                    }
                    Some(value) => current
                        .iter()
                        .copied()
                        .filter(|&index| mentors[index].accepts(column, value))
                        .collect(),
                    None => Vec::new(),
                }
            }
            StageName::School => {
                let codes = student.school_codes(&policy.school_binding);
                if codes.passes_unfiltered() {
                    note = Some(NOTE_WILDCARD.to_string());
                }
                let mode = policy.school_binding.mode;
                current
                    .iter()
                    .copied()
                    .filter(|&index| mentors[index].accepts_school(&codes, mode))
                    .collect()
            }
            StageName::CapacityGate => current
                .iter()
                .copied()
                .filter(|&index| states.get(index).remaining_capacity > 0)
                .collect(),
        };

        let after_count = filtered.len();
        let drop_reason =
            (before_count > 0 && after_count == 0).then(|| stage.drop_reason.clone());
        stages.push(StageResult {
            stage: stage.name,
            before_count,
            after_count,
            drop_reason,
            note,
        });
        current = filtered;
    }

    ChainOutcome {
        survivors: current,
        stages,
        center_violation,
    }
}

/// Class restriction applied by the `type` stage: group codes listed in
/// `school_statuses` only match school-bound mentors. Codes listed in
/// `normal_statuses` (or in neither set) impose no class restriction here;
/// the school stage already gates bound mentors against normal students.
fn class_compatible(policy: &PolicyConfig, group_code: i64, has_school_constraint: bool) -> bool {
    if policy.school_statuses.contains(&group_code) {
        has_school_constraint
    } else {
        true
    }
}

fn is_invalid_center(policy: &PolicyConfig, value: i64) -> bool {
    policy
        .center_rule
        .as_ref()
        .is_some_and(|rule| !rule.valid.contains(&value))
}
