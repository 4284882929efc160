//! Batch driver: runs dedupe → channel → filter chain → rank/commit for
//! every student in input order, keeps the mentor state coherent, and
//! produces the four output tables.
//!
//! The driver is strictly sequential and owns the only mutable state in the
//! core. Progress and cancellation are injected as plain functions; neither
//! is stored and neither can mutate engine state. The output is a pure
//! function of `(students, pool, history, policy)`.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::channels::route_student;
use super::dedupe::HistoryScreen;
use super::domain::{
    AllocationChannel, DedupeReason, HistoryRecord, HistorySnapshot, HistoryStatus, Mentor,
    MentorId, Student, StudentId,
};
use super::metrics::{self, BatchSummary, StudentFact};
use super::policy::{HistoryOnMatch, InvalidCenterAction, PolicyConfig, StageName};
use super::pool::{MentorPool, PoolGovernance, StateTable};
use super::ranking::{
    rank_candidates, selection_reason, tie_breaker_preview, SelectionReason, TieBreaker,
};
use super::trace::{run_filter_chain, ChainOutcome, TraceRecord};

/// Terminal status of one student's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    SkippedHistory,
}

impl OutcomeStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::SkippedHistory => "skipped_history",
        }
    }
}

/// Typed failure kinds recorded on per-student outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    EligibilityNoMatch,
    CapacityFull,
    JoinKeyDataMissing,
    InvalidCenter,
    InternalError,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::EligibilityNoMatch => "ELIGIBILITY_NO_MATCH",
            ErrorKind::CapacityFull => "CAPACITY_FULL",
            ErrorKind::JoinKeyDataMissing => "JOIN_KEY_DATA_MISSING",
            ErrorKind::InvalidCenter => "INVALID_CENTER",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Success side of an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessDetail {
    pub mentor_id: MentorId,
    pub occupancy_ratio_before: f64,
    pub occupancy_ratio_after: f64,
    pub capacity_before: u32,
    pub capacity_after: u32,
    pub selection_reason: SelectionReason,
    pub tie_breakers: Vec<TieBreaker>,
}

/// Failure side of an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub error_kind: ErrorKind,
    pub failure_stage: Option<StageName>,
    pub detailed_reason: String,
    pub suggested_actions: Vec<String>,
    pub candidate_count: usize,
}

/// History-diversion side of an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDetail {
    pub mentor_id: MentorId,
    pub center_code: Option<i64>,
    pub reemitted: bool,
}

/// One per student, paired with its [`TraceRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AllocationOutcome {
    Success(SuccessDetail),
    Failed(FailureDetail),
    SkippedHistory(HistoryDetail),
}

impl AllocationOutcome {
    pub const fn status(&self) -> OutcomeStatus {
        match self {
            AllocationOutcome::Success(_) => OutcomeStatus::Success,
            AllocationOutcome::Failed(_) => OutcomeStatus::Failed,
            AllocationOutcome::SkippedHistory(_) => OutcomeStatus::SkippedHistory,
        }
    }
}

/// One row of the assignments table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub row_index: usize,
    pub student_id: StudentId,
    pub mentor_id: MentorId,
    pub occupancy_ratio_before: f64,
    pub occupancy_ratio_after: f64,
    pub capacity_before: u32,
    pub capacity_after: u32,
    pub allocation_channel: AllocationChannel,
    /// `None` on rows re-emitted from history, where no ranking ran.
    pub selection_reason: Option<SelectionReason>,
}

/// One row of the per-student log table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub row_index: usize,
    pub student_id: StudentId,
    pub status: OutcomeStatus,
    pub error_kind: Option<ErrorKind>,
    pub detailed_reason: String,
    pub suggested_actions: Vec<String>,
    pub candidate_count: usize,
    pub allocation_channel: AllocationChannel,
}

/// Injected observation hooks. Both are plain functions, polled between
/// students; neither is stored inside the engine.
#[derive(Default, Clone, Copy)]
pub struct BatchHooks<'a> {
    pub progress: Option<&'a dyn Fn(u8, &str)>,
    pub cancel: Option<&'a dyn Fn() -> bool>,
}

/// Everything a finished batch produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub assignments: Vec<AssignmentRow>,
    pub traces: Vec<TraceRecord>,
    pub log: Vec<LogRow>,
    pub outcomes: Vec<AllocationOutcome>,
    pub summary: BatchSummary,
}

/// Batch-aborting failures. Per-student problems never surface here; they
/// are captured in the log and outcome tables instead.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("allocation batch cancelled after {processed} students")]
    Cancelled {
        processed: usize,
        report: Box<BatchReport>,
    },
    #[error("capacity underflow committing against mentor '{id}'", id = .mentor_id.0)]
    CapacityUnderflow { mentor_id: MentorId },
    #[error("allocation invariant violated: {0}")]
    Internal(String),
}

/// The eligibility & allocation engine.
pub struct AllocationEngine {
    policy: PolicyConfig,
}

impl AllocationEngine {
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Run one batch. Students are processed in input order; the output
    /// order of every table matches it.
    pub fn run(
        &self,
        students: &[Student],
        mentors: Vec<Mentor>,
        history: &HistorySnapshot,
        hooks: BatchHooks<'_>,
    ) -> Result<BatchReport, BatchError> {
        let pool = MentorPool::build(mentors);
        let mut states = StateTable::build(&pool);
        let screen = HistoryScreen::new(history);
        let total = students.len();

        let mut assignments = Vec::new();
        let mut traces = Vec::with_capacity(total);
        let mut log = Vec::with_capacity(total);
        let mut outcomes = Vec::with_capacity(total);
        let mut facts: Vec<StudentFact> = Vec::with_capacity(total);

        for (row_index, student) in students.iter().enumerate() {
            if hooks.cancel.is_some_and(|cancel| cancel()) {
                let summary = metrics::summarize(
                    &self.policy,
                    &facts,
                    &traces,
                    pool.governance(),
                    false,
                );
                return Err(BatchError::Cancelled {
                    processed: row_index,
                    report: Box::new(BatchReport {
                        assignments,
                        traces,
                        log,
                        outcomes,
                        summary,
                    }),
                });
            }
            if let Some(progress) = hooks.progress {
                let percent = if total == 0 {
                    100
                } else {
                    ((row_index * 100) / total) as u8
                };
                progress(
                    percent,
                    &format!("allocating student {}/{}", row_index + 1, total),
                );
            }

            let decision = screen.screen(student);
            let channel = route_student(student, &self.policy);

            if let (HistoryStatus::AlreadyAllocated, Some(prior)) =
                (decision.status, decision.prior)
            {
                self.emit_history_diversion(
                    row_index,
                    student,
                    channel,
                    prior,
                    &pool,
                    &states,
                    &mut assignments,
                    &mut traces,
                    &mut log,
                    &mut outcomes,
                    &mut facts,
                );
                continue;
            }

            if let Some(missing_key) = self
                .policy
                .join_keys
                .iter()
                .find(|key| !student.join_values.contains_key(*key))
            {
                self.emit_missing_join_key(
                    row_index,
                    student,
                    channel,
                    decision.reason,
                    missing_key,
                    &mut traces,
                    &mut log,
                    &mut outcomes,
                    &mut facts,
                );
                continue;
            }

            let chain = run_filter_chain(student, &pool, &states, &self.policy);
            let trace = TraceRecord {
                row_index,
                student_id: student.student_id.clone(),
                stages: chain.stages.clone(),
                allocation_channel: channel,
                history_status: HistoryStatus::NewCandidate,
                dedupe_reason: decision.reason,
            };
            traces.push(trace);

            if chain.center_violation == Some(InvalidCenterAction::Fail) {
                let detail = self.center_failure(student, &chain);
                log.push(LogRow {
                    row_index,
                    student_id: student.student_id.clone(),
                    status: OutcomeStatus::Failed,
                    error_kind: Some(detail.error_kind),
                    detailed_reason: detail.detailed_reason.clone(),
                    suggested_actions: detail.suggested_actions.clone(),
                    candidate_count: detail.candidate_count,
                    allocation_channel: channel,
                });
                outcomes.push(AllocationOutcome::Failed(detail));
                facts.push(StudentFact {
                    channel,
                    history_status: HistoryStatus::NewCandidate,
                    dedupe_reason: decision.reason,
                    same_history_mentor: None,
                    success: false,
                    skipped: false,
                });
                continue;
            }

            if chain.survivors.is_empty() {
                let detail = classify_empty(&chain);
                log.push(LogRow {
                    row_index,
                    student_id: student.student_id.clone(),
                    status: OutcomeStatus::Failed,
                    error_kind: Some(detail.error_kind),
                    detailed_reason: detail.detailed_reason.clone(),
                    suggested_actions: detail.suggested_actions.clone(),
                    candidate_count: detail.candidate_count,
                    allocation_channel: channel,
                });
                outcomes.push(AllocationOutcome::Failed(detail));
                facts.push(StudentFact {
                    channel,
                    history_status: HistoryStatus::NewCandidate,
                    dedupe_reason: decision.reason,
                    same_history_mentor: None,
                    success: false,
                    skipped: false,
                });
                continue;
            }

            let ranked = rank_candidates(&chain.survivors, &pool, &states);
            let best = &ranked[0];
            let reason = selection_reason(best, ranked.get(1));
            let tie_breakers = tie_breaker_preview(&ranked);

            let occupancy_before = best.occupancy_ratio;
            let capacity_before = best.remaining_capacity;
            states
                .get_mut(best.index)
                .commit()
                .map_err(|_| BatchError::CapacityUnderflow {
                    mentor_id: best.mentor_id.clone(),
                })?;
            let after = states.get(best.index);
            let occupancy_after = after.occupancy_ratio();
            let capacity_after = after.remaining_capacity;

            let downgraded_center = chain.center_violation == Some(InvalidCenterAction::Wildcard);
            if downgraded_center {
                warn!(
                    student_id = %student.student_id.0,
                    "center value out of range, downgraded to wildcard by policy"
                );
            }
            debug!(
                student_id = %student.student_id.0,
                mentor_id = %best.mentor_id.0,
                selection_reason = reason.label(),
                "student allocated"
            );

            assignments.push(AssignmentRow {
                row_index,
                student_id: student.student_id.clone(),
                mentor_id: best.mentor_id.clone(),
                occupancy_ratio_before: occupancy_before,
                occupancy_ratio_after: occupancy_after,
                capacity_before,
                capacity_after,
                allocation_channel: channel,
                selection_reason: Some(reason),
            });
            log.push(LogRow {
                row_index,
                student_id: student.student_id.clone(),
                status: OutcomeStatus::Success,
                error_kind: downgraded_center.then_some(ErrorKind::InvalidCenter),
                detailed_reason: if downgraded_center {
                    format!(
                        "assigned to {} via {}; center value out of range, treated as wildcard",
                        best.mentor_id.0,
                        reason.label()
                    )
                } else {
                    format!("assigned to {} via {}", best.mentor_id.0, reason.label())
                },
                suggested_actions: Vec::new(),
                candidate_count: ranked.len(),
                allocation_channel: channel,
            });
            outcomes.push(AllocationOutcome::Success(SuccessDetail {
                mentor_id: best.mentor_id.clone(),
                occupancy_ratio_before: occupancy_before,
                occupancy_ratio_after: occupancy_after,
                capacity_before,
                capacity_after,
                selection_reason: reason,
                tie_breakers,
            }));
            facts.push(StudentFact {
                channel,
                history_status: HistoryStatus::NewCandidate,
                dedupe_reason: decision.reason,
                same_history_mentor: None,
                success: true,
                skipped: false,
            });
        }

        if let Some(progress) = hooks.progress {
            progress(100, "batch complete");
        }

        let successes = facts.iter().filter(|fact| fact.success).count() as u64;
        let committed = states.committed_this_batch(&pool);
        if committed != successes {
            return Err(BatchError::Internal(format!(
                "committed allocations ({committed}) do not match success outcomes ({successes})"
            )));
        }

        let summary = metrics::summarize(&self.policy, &facts, &traces, pool.governance(), true);
        Ok(BatchReport {
            assignments,
            traces,
            log,
            outcomes,
            summary,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_history_diversion(
        &self,
        row_index: usize,
        student: &Student,
        channel: AllocationChannel,
        prior: &HistoryRecord,
        pool: &MentorPool,
        states: &StateTable,
        assignments: &mut Vec<AssignmentRow>,
        traces: &mut Vec<TraceRecord>,
        log: &mut Vec<LogRow>,
        outcomes: &mut Vec<AllocationOutcome>,
        facts: &mut Vec<StudentFact>,
    ) {
        let reemitted = self.policy.history.on_match == HistoryOnMatch::Reemit;
        traces.push(TraceRecord::without_chain(
            row_index,
            student.student_id.clone(),
            HistoryStatus::AlreadyAllocated,
            DedupeReason::PriorAllocation,
            channel,
            &self.policy,
        ));

        if reemitted {
            // Cite the historic mentor without touching any state; the
            // before/after pairs are intentionally equal.
            let state = pool
                .mentors()
                .iter()
                .position(|mentor| mentor.mentor_id == prior.mentor_id)
                .map(|index| *states.get(index));
            let (ratio, capacity) = state
                .map(|state| (state.occupancy_ratio(), state.remaining_capacity))
                .unwrap_or((0.0, 0));
            assignments.push(AssignmentRow {
                row_index,
                student_id: student.student_id.clone(),
                mentor_id: prior.mentor_id.clone(),
                occupancy_ratio_before: ratio,
                occupancy_ratio_after: ratio,
                capacity_before: capacity,
                capacity_after: capacity,
                allocation_channel: channel,
                selection_reason: None,
            });
        }

        log.push(LogRow {
            row_index,
            student_id: student.student_id.clone(),
            status: OutcomeStatus::SkippedHistory,
            error_kind: None,
            detailed_reason: format!(
                "prior allocation to {} found in history; mentor state unchanged",
                prior.mentor_id.0
            ),
            suggested_actions: Vec::new(),
            candidate_count: 0,
            allocation_channel: channel,
        });
        outcomes.push(AllocationOutcome::SkippedHistory(HistoryDetail {
            mentor_id: prior.mentor_id.clone(),
            center_code: prior.center_code,
            reemitted,
        }));
        facts.push(StudentFact {
            channel,
            history_status: HistoryStatus::AlreadyAllocated,
            dedupe_reason: DedupeReason::PriorAllocation,
            // Only a re-emitted row cites a mentor that can be compared
            // against the snapshot; a plain skip chooses nobody.
            same_history_mentor: reemitted.then_some(true),
            success: false,
            skipped: true,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_missing_join_key(
        &self,
        row_index: usize,
        student: &Student,
        channel: AllocationChannel,
        dedupe_reason: DedupeReason,
        missing_key: &str,
        traces: &mut Vec<TraceRecord>,
        log: &mut Vec<LogRow>,
        outcomes: &mut Vec<AllocationOutcome>,
        facts: &mut Vec<StudentFact>,
    ) {
        let failure_stage = self
            .policy
            .trace_stages
            .iter()
            .find(|stage| stage.source_column == missing_key)
            .map(|stage| stage.name);
        traces.push(TraceRecord::without_chain(
            row_index,
            student.student_id.clone(),
            HistoryStatus::NewCandidate,
            dedupe_reason,
            channel,
            &self.policy,
        ));
        let detail = FailureDetail {
            error_kind: ErrorKind::JoinKeyDataMissing,
            failure_stage,
            detailed_reason: format!(
                "join key '{missing_key}' is missing or not an integer at row {row_index}"
            ),
            suggested_actions: vec![format!(
                "fix the '{missing_key}' value on the student row and re-run"
            )],
            candidate_count: 0,
        };
        log.push(LogRow {
            row_index,
            student_id: student.student_id.clone(),
            status: OutcomeStatus::Failed,
            error_kind: Some(detail.error_kind),
            detailed_reason: detail.detailed_reason.clone(),
            suggested_actions: detail.suggested_actions.clone(),
            candidate_count: 0,
            allocation_channel: channel,
        });
        outcomes.push(AllocationOutcome::Failed(detail));
        facts.push(StudentFact {
            channel,
            history_status: HistoryStatus::NewCandidate,
            dedupe_reason,
            same_history_mentor: None,
            success: false,
            skipped: false,
        });
    }

    fn center_failure(&self, student: &Student, chain: &ChainOutcome) -> FailureDetail {
        let column = self.policy.stage_column(StageName::Center);
        let value = student.join_value(column);
        FailureDetail {
            error_kind: ErrorKind::InvalidCenter,
            failure_stage: Some(StageName::Center),
            detailed_reason: match value {
                Some(value) => {
                    format!("center value {value} is outside the policy's valid set")
                }
                None => "center value is missing".to_string(),
            },
            suggested_actions: vec![
                "correct the center value on the student row".to_string(),
                "or relax center_rule.on_invalid to 'wildcard'".to_string(),
            ],
            candidate_count: eligibility_count(chain),
        }
    }
}

/// Count of candidates that survived the seven eligibility stages, i.e.
/// the population entering the capacity gate.
fn eligibility_count(chain: &ChainOutcome) -> usize {
    chain
        .stages
        .iter()
        .find(|result| result.stage == StageName::CapacityGate)
        .map(|result| result.before_count)
        .unwrap_or(0)
}

/// Classify an empty survivor set by the last non-trivial eliminating stage.
fn classify_empty(chain: &ChainOutcome) -> FailureDetail {
    let eliminator = chain
        .stages
        .iter()
        .find(|result| result.before_count > 0 && result.after_count == 0);
    let failure_stage = eliminator.map(|result| result.stage);

    match failure_stage {
        Some(StageName::CapacityGate) => FailureDetail {
            error_kind: ErrorKind::CapacityFull,
            failure_stage,
            detailed_reason: format!(
                "{} eligible mentors found but none has remaining capacity",
                eligibility_count(chain)
            ),
            suggested_actions: vec![
                "increase mentor capacity limits".to_string(),
                "add mentors covering this student profile".to_string(),
            ],
            candidate_count: eligibility_count(chain),
        },
        stage => {
            let stage_label = stage.map(|name| name.label()).unwrap_or("type");
            let drop_reason = eliminator
                .and_then(|result| result.drop_reason.clone())
                .unwrap_or_else(|| "no eligible mentors".to_string());
            FailureDetail {
                error_kind: ErrorKind::EligibilityNoMatch,
                failure_stage: stage,
                detailed_reason: format!(
                    "no mentors left after stage '{stage_label}': {drop_reason}"
                ),
                suggested_actions: vec![
                    "verify the student's join-key values".to_string(),
                    "check mentor coverage for this profile".to_string(),
                ],
                candidate_count: 0,
            }
        }
    }
}
