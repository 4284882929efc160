use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::allocation::domain::AllocationChannel;

/// Major.minor line the loader accepts; the patch component is free.
pub const SUPPORTED_POLICY_VERSION: (u64, u64) = (1, 0);

/// Number of join keys every policy must declare.
pub const JOIN_KEY_COUNT: usize = 6;

/// The eight trace stages in their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Type,
    Group,
    Gender,
    GraduationStatus,
    Center,
    Finance,
    School,
    CapacityGate,
}

impl StageName {
    pub const fn ordered() -> [StageName; 8] {
        [
            StageName::Type,
            StageName::Group,
            StageName::Gender,
            StageName::GraduationStatus,
            StageName::Center,
            StageName::Finance,
            StageName::School,
            StageName::CapacityGate,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            StageName::Type => "type",
            StageName::Group => "group",
            StageName::Gender => "gender",
            StageName::GraduationStatus => "graduation_status",
            StageName::Center => "center",
            StageName::Finance => "finance",
            StageName::School => "school",
            StageName::CapacityGate => "capacity_gate",
        }
    }

    pub fn from_label(label: &str) -> Option<StageName> {
        StageName::ordered()
            .into_iter()
            .find(|stage| stage.label() == label)
    }
}

/// How a stage compares the student value against the mentor column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    ExactInt,
    Membership,
    WildcardAware,
    CapacityGate,
}

impl StageKind {
    pub const fn label(self) -> &'static str {
        match self {
            StageKind::ExactInt => "exact_int",
            StageKind::Membership => "membership",
            StageKind::WildcardAware => "wildcard_aware",
            StageKind::CapacityGate => "capacity_gate",
        }
    }

    pub fn from_label(label: &str) -> Option<StageKind> {
        [
            StageKind::ExactInt,
            StageKind::Membership,
            StageKind::WildcardAware,
            StageKind::CapacityGate,
        ]
        .into_iter()
        .find(|kind| kind.label() == label)
    }
}

/// One entry of the eight-stage trace plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStage {
    pub name: StageName,
    pub source_column: String,
    pub kind: StageKind,
    pub drop_reason: String,
}

/// Ranking rules; the loader requires exactly this sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingRule {
    MinOccupancyRatio,
    MinAllocationsNew,
    MinMentorId,
}

impl RankingRule {
    pub const fn expected_sequence() -> [RankingRule; 3] {
        [
            RankingRule::MinOccupancyRatio,
            RankingRule::MinAllocationsNew,
            RankingRule::MinMentorId,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            RankingRule::MinOccupancyRatio => "min_occupancy_ratio",
            RankingRule::MinAllocationsNew => "min_allocations_new",
            RankingRule::MinMentorId => "min_mentor_id",
        }
    }

    pub fn from_label(label: &str) -> Option<RankingRule> {
        RankingRule::expected_sequence()
            .into_iter()
            .find(|rule| rule.label() == label)
    }
}

/// Predicate of one allocation-channel rule: the named join-key column must
/// hold one of the listed values. For the school column the student's
/// resolved school tokens are tested for intersection instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPredicate {
    pub column: String,
    #[serde(rename = "in")]
    pub values: BTreeSet<i64>,
}

/// Ordered channel rule; the first matching predicate tags the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRule {
    pub predicate: ChannelPredicate,
    pub tag: AllocationChannel,
}

/// School-binding mode for the seventh trace stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchoolBindingMode {
    /// Mentors without a school constraint accept any student.
    Global,
    /// Mentors without a school constraint only accept students that carry
    /// no school code of their own.
    Restricted,
}

/// School-code interpretation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolBinding {
    pub mode: SchoolBindingMode,
    pub empty_tokens: BTreeSet<String>,
    pub zero_as_wildcard: bool,
}

/// What to do when the center column holds a value outside the valid set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidCenterAction {
    Wildcard,
    Fail,
}

/// Optional validity window for the center join key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterRule {
    pub valid: BTreeSet<i64>,
    pub on_invalid: InvalidCenterAction,
}

/// How a student already present in the history snapshot is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOnMatch {
    /// Emit a neutral `skipped_history` row citing the historic mentor.
    Skip,
    /// Emit a success-style row citing the historic mentor.
    Reemit,
}

/// History-handling knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPolicy {
    pub on_match: HistoryOnMatch,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            on_match: HistoryOnMatch::Skip,
        }
    }
}

/// The validated, immutable allocation policy.
///
/// Built once per run by [`super::loader`]; every component receives it by
/// reference and no stage ever mutates it. All rule parameters — column
/// names, stage plan, channel predicates, binding mode — live here so the
/// engine itself embeds no domain constants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyConfig {
    pub version: String,
    pub join_keys: Vec<String>,
    pub normal_statuses: BTreeSet<i64>,
    pub school_statuses: BTreeSet<i64>,
    pub ranking_rules: Vec<RankingRule>,
    pub trace_stages: Vec<TraceStage>,
    pub allocation_channels: Vec<ChannelRule>,
    pub school_binding: SchoolBinding,
    pub center_rule: Option<CenterRule>,
    pub history: HistoryPolicy,
}

impl PolicyConfig {
    /// Stage descriptor by name. Validation guarantees all eight exist.
    pub fn stage(&self, name: StageName) -> &TraceStage {
        self.trace_stages
            .iter()
            .find(|stage| stage.name == name)
            .expect("policy validation guarantees all eight trace stages")
    }

    /// Source column of a stage.
    pub fn stage_column(&self, name: StageName) -> &str {
        &self.stage(name).source_column
    }

    /// The school-code column (source of the `school` stage).
    pub fn school_column(&self) -> &str {
        self.stage_column(StageName::School)
    }

    /// The group-code column shared by the `type` and `group` stages.
    pub fn group_column(&self) -> &str {
        self.stage_column(StageName::Group)
    }
}
