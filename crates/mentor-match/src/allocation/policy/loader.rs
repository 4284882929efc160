//! Parsing and validation of the declarative policy file.
//!
//! The loader is the only place that sees the raw JSON shape; everything
//! after it works against the typed [`PolicyConfig`]. Every §-level rule is
//! enforced here with a distinct [`PolicyError`] so a rejected policy names
//! its first offending field.

use std::collections::{BTreeSet, HashSet};

use serde::Deserialize;

use super::config::{
    CenterRule, ChannelPredicate, ChannelRule, HistoryPolicy, PolicyConfig, RankingRule,
    SchoolBinding, SchoolBindingMode, StageKind, StageName, TraceStage, JOIN_KEY_COUNT,
    SUPPORTED_POLICY_VERSION,
};
use crate::allocation::domain::AllocationChannel;

/// Validation failure; fatal, aborts the run before any allocation.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("policy version '{found}' is not a major.minor.patch version")]
    MalformedVersion { found: String },
    #[error("policy version '{found}' is outside the supported {major}.{minor} line",
        major = SUPPORTED_POLICY_VERSION.0, minor = SUPPORTED_POLICY_VERSION.1)]
    UnsupportedVersion { found: String },
    #[error("join_keys must contain exactly {JOIN_KEY_COUNT} entries, found {found}")]
    JoinKeyCount { found: usize },
    #[error("join_keys must be non-empty strings")]
    EmptyJoinKey,
    #[error("join_keys must be unique, '{key}' appears more than once")]
    DuplicateJoinKey { key: String },
    #[error("ranking_rules must equal [{expected}], found [{found}]",
        expected = "min_occupancy_ratio, min_allocations_new, min_mentor_id")]
    RankingSequence { found: String },
    #[error("trace_stages must define exactly eight stages, found {found}")]
    StageCount { found: usize },
    #[error("unknown trace stage '{found}' at position {position}")]
    UnknownStage { position: usize, found: String },
    #[error("trace stage order mismatch at position {position}: expected '{expected_label}', found '{found}'",
        expected_label = .expected.label())]
    StageOrder {
        position: usize,
        expected: StageName,
        found: String,
    },
    #[error("unknown comparison kind '{found}' for stage '{stage_label}'", stage_label = .stage.label())]
    UnknownStageKind { stage: StageName, found: String },
    #[error("stage '{stage_label}' must use the '{expected_label}' comparison kind",
        stage_label = .stage.label(), expected_label = .expected.label())]
    StageKindMismatch {
        stage: StageName,
        expected: StageKind,
    },
    #[error("stage '{stage_label}' source column '{column}' is not a declared join key",
        stage_label = .stage.label())]
    StageColumnUnknown { stage: StageName, column: String },
    #[error("stage '{stage_label}' must declare a non-empty drop_reason", stage_label = .stage.label())]
    EmptyDropReason { stage: StageName },
    #[error("the 'type' and 'group' stages must share the group-code column, found '{type_column}' and '{group_column}'")]
    GroupColumnMismatch {
        type_column: String,
        group_column: String,
    },
    #[error("allocation_channels must declare at least one rule")]
    NoChannels,
    #[error("unknown allocation channel tag '{found}' at rule {position}")]
    UnknownChannelTag { position: usize, found: String },
    #[error("allocation channel rule {position} references unknown column '{column}'")]
    ChannelColumnUnknown { position: usize, column: String },
    #[error("allocation channel rule {position} declares an empty value set")]
    EmptyChannelPredicate { position: usize },
    #[error("school_binding.mode must be 'global' or 'restricted', found '{found}'")]
    UnknownBindingMode { found: String },
    #[error("center_rule.on_invalid must be 'wildcard' or 'fail', found '{found}'")]
    UnknownCenterAction { found: String },
    #[error("history.on_match must be 'skip' or 'reemit', found '{found}'")]
    UnknownHistoryMode { found: String },
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    version: String,
    join_keys: Vec<String>,
    #[serde(default)]
    normal_statuses: Vec<i64>,
    #[serde(default)]
    school_statuses: Vec<i64>,
    ranking_rules: Vec<String>,
    trace_stages: Vec<StageFile>,
    allocation_channels: Vec<ChannelFile>,
    school_binding: BindingFile,
    #[serde(default)]
    center_rule: Option<CenterRuleFile>,
    #[serde(default)]
    history: Option<HistoryFile>,
}

#[derive(Debug, Deserialize)]
struct StageFile {
    name: String,
    source_column: String,
    kind: String,
    drop_reason: String,
}

#[derive(Debug, Deserialize)]
struct ChannelFile {
    predicate: PredicateFile,
    tag: String,
}

#[derive(Debug, Deserialize)]
struct PredicateFile {
    column: String,
    #[serde(rename = "in")]
    values: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct BindingFile {
    mode: String,
    #[serde(default)]
    empty_tokens: Vec<String>,
    #[serde(default)]
    zero_as_wildcard: bool,
}

#[derive(Debug, Deserialize)]
struct CenterRuleFile {
    valid: Vec<i64>,
    on_invalid: String,
}

#[derive(Debug, Deserialize)]
struct HistoryFile {
    on_match: String,
}

/// Parse and validate a policy document from its JSON text.
pub fn parse_policy_str(raw: &str) -> Result<PolicyConfig, PolicyError> {
    let file: PolicyFile = serde_json::from_str(raw)?;
    validate(file)
}

/// Parse and validate a policy document from an already-parsed JSON value.
pub fn parse_policy_value(value: serde_json::Value) -> Result<PolicyConfig, PolicyError> {
    let file: PolicyFile = serde_json::from_value(value)?;
    validate(file)
}

fn validate(file: PolicyFile) -> Result<PolicyConfig, PolicyError> {
    check_version(&file.version)?;
    let join_keys = check_join_keys(file.join_keys)?;
    let ranking_rules = check_ranking(&file.ranking_rules)?;
    let trace_stages = check_stages(file.trace_stages, &join_keys)?;
    let allocation_channels = check_channels(file.allocation_channels, &join_keys)?;
    let school_binding = check_binding(file.school_binding)?;
    let center_rule = file.center_rule.map(check_center_rule).transpose()?;
    let history = match file.history {
        Some(history) => check_history(history)?,
        None => HistoryPolicy::default(),
    };

    Ok(PolicyConfig {
        version: file.version,
        join_keys,
        normal_statuses: file.normal_statuses.into_iter().collect(),
        school_statuses: file.school_statuses.into_iter().collect(),
        ranking_rules,
        trace_stages,
        allocation_channels,
        school_binding,
        center_rule,
        history,
    })
}

fn check_version(version: &str) -> Result<(), PolicyError> {
    let mut parts = version.split('.');
    let (major, minor, patch) = (parts.next(), parts.next(), parts.next());
    if parts.next().is_some() {
        return Err(PolicyError::MalformedVersion {
            found: version.to_string(),
        });
    }
    let parse = |part: Option<&str>| {
        part.and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| PolicyError::MalformedVersion {
                found: version.to_string(),
            })
    };
    let (major, minor, _patch) = (parse(major)?, parse(minor)?, parse(patch)?);
    if (major, minor) != SUPPORTED_POLICY_VERSION {
        return Err(PolicyError::UnsupportedVersion {
            found: version.to_string(),
        });
    }
    Ok(())
}

fn check_join_keys(join_keys: Vec<String>) -> Result<Vec<String>, PolicyError> {
    if join_keys.len() != JOIN_KEY_COUNT {
        return Err(PolicyError::JoinKeyCount {
            found: join_keys.len(),
        });
    }
    let mut seen = HashSet::new();
    for key in &join_keys {
        if key.trim().is_empty() {
            return Err(PolicyError::EmptyJoinKey);
        }
        if !seen.insert(key.as_str()) {
            return Err(PolicyError::DuplicateJoinKey { key: key.clone() });
        }
    }
    Ok(join_keys)
}

fn check_ranking(rules: &[String]) -> Result<Vec<RankingRule>, PolicyError> {
    let parsed: Vec<Option<RankingRule>> = rules
        .iter()
        .map(|rule| RankingRule::from_label(rule))
        .collect();
    let expected = RankingRule::expected_sequence();
    let matches = parsed.len() == expected.len()
        && parsed
            .iter()
            .zip(expected)
            .all(|(found, want)| *found == Some(want));
    if !matches {
        return Err(PolicyError::RankingSequence {
            found: rules.join(", "),
        });
    }
    Ok(expected.to_vec())
}

fn check_stages(
    stages: Vec<StageFile>,
    join_keys: &[String],
) -> Result<Vec<TraceStage>, PolicyError> {
    let order = StageName::ordered();
    if stages.len() != order.len() {
        return Err(PolicyError::StageCount {
            found: stages.len(),
        });
    }

    let mut checked = Vec::with_capacity(order.len());
    for (position, (expected, stage)) in order.into_iter().zip(stages).enumerate() {
        let name = StageName::from_label(&stage.name).ok_or(PolicyError::UnknownStage {
            position,
            found: stage.name.clone(),
        })?;
        if name != expected {
            return Err(PolicyError::StageOrder {
                position,
                expected,
                found: stage.name,
            });
        }
        let kind = StageKind::from_label(&stage.kind).ok_or(PolicyError::UnknownStageKind {
            stage: name,
            found: stage.kind.clone(),
        })?;
        let expected_kind = expected_kind_for(name);
        if kind != expected_kind {
            return Err(PolicyError::StageKindMismatch {
                stage: name,
                expected: expected_kind,
            });
        }
        if name != StageName::CapacityGate && !join_keys.contains(&stage.source_column) {
            return Err(PolicyError::StageColumnUnknown {
                stage: name,
                column: stage.source_column,
            });
        }
        if stage.drop_reason.trim().is_empty() {
            return Err(PolicyError::EmptyDropReason { stage: name });
        }
        checked.push(TraceStage {
            name,
            source_column: stage.source_column,
            kind,
            drop_reason: stage.drop_reason,
        });
    }

    // The first two stages both read the group-code key; a policy that
    // splits them is declaring a different pipeline than the one shipped.
    let type_column = &checked[0].source_column;
    let group_column = &checked[1].source_column;
    if type_column != group_column {
        return Err(PolicyError::GroupColumnMismatch {
            type_column: type_column.clone(),
            group_column: group_column.clone(),
        });
    }

    Ok(checked)
}

fn expected_kind_for(name: StageName) -> StageKind {
    match name {
        StageName::Type | StageName::Group => StageKind::Membership,
        StageName::Gender | StageName::GraduationStatus | StageName::Finance => StageKind::ExactInt,
        StageName::Center | StageName::School => StageKind::WildcardAware,
        StageName::CapacityGate => StageKind::CapacityGate,
    }
}

fn check_channels(
    channels: Vec<ChannelFile>,
    join_keys: &[String],
) -> Result<Vec<ChannelRule>, PolicyError> {
    if channels.is_empty() {
        return Err(PolicyError::NoChannels);
    }
    let mut checked = Vec::with_capacity(channels.len());
    for (position, channel) in channels.into_iter().enumerate() {
        let tag = AllocationChannel::from_label(&channel.tag).ok_or(
            PolicyError::UnknownChannelTag {
                position,
                found: channel.tag.clone(),
            },
        )?;
        if !join_keys.contains(&channel.predicate.column) {
            return Err(PolicyError::ChannelColumnUnknown {
                position,
                column: channel.predicate.column,
            });
        }
        if channel.predicate.values.is_empty() {
            return Err(PolicyError::EmptyChannelPredicate { position });
        }
        checked.push(ChannelRule {
            predicate: ChannelPredicate {
                column: channel.predicate.column,
                values: channel.predicate.values.into_iter().collect(),
            },
            tag,
        });
    }
    Ok(checked)
}

fn check_binding(binding: BindingFile) -> Result<SchoolBinding, PolicyError> {
    let mode = match binding.mode.as_str() {
        "global" => SchoolBindingMode::Global,
        "restricted" => SchoolBindingMode::Restricted,
        other => {
            return Err(PolicyError::UnknownBindingMode {
                found: other.to_string(),
            })
        }
    };
    let empty_tokens: BTreeSet<String> = binding.empty_tokens.into_iter().collect();
    Ok(SchoolBinding {
        mode,
        empty_tokens,
        zero_as_wildcard: binding.zero_as_wildcard,
    })
}

fn check_center_rule(rule: CenterRuleFile) -> Result<CenterRule, PolicyError> {
    let on_invalid = match rule.on_invalid.as_str() {
        "wildcard" => super::config::InvalidCenterAction::Wildcard,
        "fail" => super::config::InvalidCenterAction::Fail,
        other => {
            return Err(PolicyError::UnknownCenterAction {
                found: other.to_string(),
            })
        }
    };
    Ok(CenterRule {
        valid: rule.valid.into_iter().collect(),
        on_invalid,
    })
}

fn check_history(history: HistoryFile) -> Result<HistoryPolicy, PolicyError> {
    let on_match = match history.on_match.as_str() {
        "skip" => super::config::HistoryOnMatch::Skip,
        "reemit" => super::config::HistoryOnMatch::Reemit,
        other => {
            return Err(PolicyError::UnknownHistoryMode {
                found: other.to_string(),
            })
        }
    };
    Ok(HistoryPolicy { on_match })
}
