//! Aggregate metrics emitted once per batch: channel counts, the per-stage
//! survival histogram, and the per-channel history table with the
//! `same_history_mentor` ratio.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{AllocationChannel, DedupeReason, HistoryStatus};
use super::policy::{PolicyConfig, StageName};
use super::pool::PoolGovernance;
use super::trace::TraceRecord;

/// Number of students tagged with each channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCount {
    pub channel: AllocationChannel,
    pub count: usize,
}

/// Aggregate before/after counts for one stage across the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSurvival {
    pub stage: StageName,
    pub entered: usize,
    pub survived: usize,
}

/// Per-channel history KPIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMetricsRow {
    pub allocation_channel: AllocationChannel,
    pub students_total: usize,
    pub history_already_allocated: usize,
    pub history_no_history_match: usize,
    pub history_missing_or_invalid: usize,
    pub same_history_mentor_true: usize,
    pub same_history_mentor_ratio: f64,
}

/// Summary of one finished (or cancelled) batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub students_total: usize,
    pub successes: usize,
    pub failures: usize,
    pub skipped_history: usize,
    /// False when the batch was cancelled before processing every student.
    pub complete: bool,
    pub channel_counts: Vec<ChannelCount>,
    pub stage_survival: Vec<StageSurvival>,
    pub history_metrics: Vec<HistoryMetricsRow>,
    /// Among history-diverted students that were re-emitted per policy,
    /// the share whose cited mentor matches the snapshot record. Students
    /// skipped outright cite no mentor and stay out of the denominator.
    pub same_history_mentor_ratio: f64,
    pub pool: PoolGovernance,
}

/// Per-student facts the engine accumulates for summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StudentFact {
    pub channel: AllocationChannel,
    pub history_status: HistoryStatus,
    pub dedupe_reason: DedupeReason,
    /// For history-diverted students re-emitted per policy: whether the
    /// cited row matches the snapshot's mentor. `None` for new candidates
    /// and for skip-mode diversions, which choose no mentor at all.
    pub same_history_mentor: Option<bool>,
    pub success: bool,
    pub skipped: bool,
}

pub(crate) fn summarize(
    policy: &PolicyConfig,
    facts: &[StudentFact],
    traces: &[TraceRecord],
    pool: PoolGovernance,
    complete: bool,
) -> BatchSummary {
    let students_total = facts.len();
    let successes = facts.iter().filter(|fact| fact.success).count();
    let skipped_history = facts.iter().filter(|fact| fact.skipped).count();
    let failures = students_total - successes - skipped_history;

    let mut channel_totals: BTreeMap<AllocationChannel, usize> = BTreeMap::new();
    for fact in facts {
        *channel_totals.entry(fact.channel).or_default() += 1;
    }
    let channel_counts = channel_totals
        .iter()
        .map(|(&channel, &count)| ChannelCount { channel, count })
        .collect();

    let mut stage_survival: Vec<StageSurvival> = policy
        .trace_stages
        .iter()
        .map(|stage| StageSurvival {
            stage: stage.name,
            entered: 0,
            survived: 0,
        })
        .collect();
    for trace in traces {
        for (slot, result) in stage_survival.iter_mut().zip(&trace.stages) {
            slot.entered += result.before_count;
            slot.survived += result.after_count;
        }
    }

    let history_metrics = history_rows(&channel_totals, facts);

    let cited_total = facts
        .iter()
        .filter(|fact| fact.same_history_mentor.is_some())
        .count();
    let same_true = facts
        .iter()
        .filter(|fact| fact.same_history_mentor == Some(true))
        .count();
    let same_history_mentor_ratio = if cited_total == 0 {
        0.0
    } else {
        same_true as f64 / cited_total as f64
    };

    BatchSummary {
        students_total,
        successes,
        failures,
        skipped_history,
        complete,
        channel_counts,
        stage_survival,
        history_metrics,
        same_history_mentor_ratio,
        pool,
    }
}

fn history_rows(
    channel_totals: &BTreeMap<AllocationChannel, usize>,
    facts: &[StudentFact],
) -> Vec<HistoryMetricsRow> {
    channel_totals
        .iter()
        .map(|(&channel, &students_total)| {
            let in_channel = facts.iter().filter(|fact| fact.channel == channel);
            let mut already = 0;
            let mut no_match = 0;
            let mut missing = 0;
            let mut same_true = 0;
            for fact in in_channel {
                match fact.dedupe_reason {
                    DedupeReason::PriorAllocation => already += 1,
                    DedupeReason::NoHistoryMatch => no_match += 1,
                    DedupeReason::MissingOrInvalidNationalCode => missing += 1,
                }
                if fact.same_history_mentor == Some(true) {
                    same_true += 1;
                }
            }
            let ratio = if students_total == 0 {
                0.0
            } else {
                same_true as f64 / students_total as f64
            };
            HistoryMetricsRow {
                allocation_channel: channel,
                students_total,
                history_already_allocated: already,
                history_no_history_match: no_match,
                history_missing_or_invalid: missing,
                same_history_mentor_true: same_true,
                same_history_mentor_ratio: ratio,
            }
        })
        .collect()
}
