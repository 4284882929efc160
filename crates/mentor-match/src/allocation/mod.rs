//! The eligibility & allocation engine.
//!
//! Pipeline, leaves first: policy loading ([`policy`]), input normalization
//! ([`normalize`]), history deduplication ([`dedupe`]), channel routing
//! ([`channels`]), the eight-stage eligibility filter chain ([`trace`]),
//! mentor capacity state ([`pool`]), ranking ([`ranking`]), and the batch
//! driver ([`engine`]) that stitches them together and emits the output
//! tables summarized by [`metrics`].

pub mod channels;
pub mod dedupe;
pub mod domain;
pub mod engine;
pub mod metrics;
pub mod normalize;
pub mod policy;
pub mod pool;
pub mod ranking;
pub mod trace;

#[cfg(test)]
mod tests;

pub use channels::route_student;
pub use dedupe::{partition_by_history, HistoryDecision, HistoryScreen};
pub use domain::{
    AllocationChannel, DedupeReason, HistoryRecord, HistorySnapshot, HistoryStatus, Mentor,
    MentorId, MentorStatus, SchoolCodeSet, Student, StudentId,
};
pub use engine::{
    AllocationEngine, AllocationOutcome, AssignmentRow, BatchError, BatchHooks, BatchReport,
    ErrorKind, FailureDetail, HistoryDetail, LogRow, OutcomeStatus, SuccessDetail,
};
pub use metrics::{BatchSummary, ChannelCount, HistoryMetricsRow, StageSurvival};
pub use normalize::{natural_key, NaturalKey};
pub use policy::{
    parse_policy_str, parse_policy_value, HistoryOnMatch, InvalidCenterAction, PolicyConfig,
    PolicyError, RankingRule, SchoolBindingMode, StageKind, StageName,
};
pub use pool::{MentorPool, MentorState, PoolGovernance, StateTable};
pub use ranking::{SelectionReason, TieBreaker, OCCUPANCY_EPSILON, TIE_BREAKER_PREVIEW};
pub use trace::{StageResult, TraceRecord};
