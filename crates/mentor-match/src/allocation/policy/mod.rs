//! Declarative allocation policy: typed configuration plus the validating
//! loader that is the single entry point for raw policy documents.

mod config;
mod loader;

pub use config::{
    CenterRule, ChannelPredicate, ChannelRule, HistoryOnMatch, HistoryPolicy, InvalidCenterAction,
    PolicyConfig, RankingRule, SchoolBinding, SchoolBindingMode, StageKind, StageName, TraceStage,
    JOIN_KEY_COUNT, SUPPORTED_POLICY_VERSION,
};
pub use loader::{parse_policy_str, parse_policy_value, PolicyError};
