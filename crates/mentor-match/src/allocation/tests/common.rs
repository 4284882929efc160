use std::collections::BTreeMap;

use serde_json::json;

use crate::allocation::domain::{HistoryRecord, Mentor, MentorId, Student};
use crate::allocation::policy::{parse_policy_value, PolicyConfig};

pub(crate) const GROUP: &str = "group_code";
pub(crate) const GENDER: &str = "gender";
pub(crate) const GRADUATION: &str = "graduation_status";
pub(crate) const CENTER: &str = "center";
pub(crate) const FINANCE: &str = "finance";
pub(crate) const SCHOOL: &str = "school_code";

pub(crate) fn base_policy_value() -> serde_json::Value {
    json!({
        "version": "1.0.3",
        "join_keys": [GROUP, GENDER, GRADUATION, CENTER, FINANCE, SCHOOL],
        "normal_statuses": [1201, 1202],
        "school_statuses": [3101],
        "ranking_rules": ["min_occupancy_ratio", "min_allocations_new", "min_mentor_id"],
        "trace_stages": [
            {"name": "type", "source_column": GROUP, "kind": "membership",
             "drop_reason": "type_mismatch"},
            {"name": "group", "source_column": GROUP, "kind": "membership",
             "drop_reason": "group_mismatch"},
            {"name": "gender", "source_column": GENDER, "kind": "exact_int",
             "drop_reason": "gender_mismatch"},
            {"name": "graduation_status", "source_column": GRADUATION, "kind": "exact_int",
             "drop_reason": "graduation_status_mismatch"},
            {"name": "center", "source_column": CENTER, "kind": "wildcard_aware",
             "drop_reason": "center_mismatch"},
            {"name": "finance", "source_column": FINANCE, "kind": "exact_int",
             "drop_reason": "finance_mismatch"},
            {"name": "school", "source_column": SCHOOL, "kind": "wildcard_aware",
             "drop_reason": "school_mismatch"},
            {"name": "capacity_gate", "source_column": "remaining_capacity",
             "kind": "capacity_gate", "drop_reason": "capacity_full"}
        ],
        "allocation_channels": [
            {"predicate": {"column": SCHOOL, "in": [500, 501]}, "tag": "SCHOOL"},
            {"predicate": {"column": CENTER, "in": [1]}, "tag": "GOLESTAN"},
            {"predicate": {"column": CENTER, "in": [2]}, "tag": "SADRA"}
        ],
        "school_binding": {
            "mode": "global",
            "empty_tokens": ["", "-"],
            "zero_as_wildcard": true
        }
    })
}

pub(crate) fn policy() -> PolicyConfig {
    parse_policy_value(base_policy_value()).expect("base test policy is valid")
}

/// Student with the default profile every base mentor accepts:
/// group 1201, gender 1, not graduated, center 1, finance 0, no school code.
pub(crate) fn student(id: &str) -> Student {
    let mut join_values = BTreeMap::new();
    join_values.insert(GROUP.to_string(), 1201);
    join_values.insert(GENDER.to_string(), 1);
    join_values.insert(GRADUATION.to_string(), 0);
    join_values.insert(CENTER.to_string(), 1);
    join_values.insert(FINANCE.to_string(), 0);
    join_values.insert(SCHOOL.to_string(), 0);
    Student {
        join_values,
        ..Student::new(id)
    }
}

pub(crate) fn student_with(id: &str, column: &str, value: i64) -> Student {
    let mut built = student(id);
    built.join_values.insert(column.to_string(), value);
    built
}

/// Mentor accepting the default student profile.
pub(crate) fn mentor(id: &str, capacity: u32) -> Mentor {
    let mut built = Mentor::new(id, capacity);
    built.eligibility.insert(GROUP.to_string(), 1201);
    built.eligibility.insert(GENDER.to_string(), 1);
    built.eligibility.insert(GRADUATION.to_string(), 0);
    built.eligibility.insert(CENTER.to_string(), 1);
    built.eligibility.insert(FINANCE.to_string(), 0);
    built
}

pub(crate) fn history_record(mentor_id: &str) -> HistoryRecord {
    HistoryRecord {
        mentor_id: MentorId(mentor_id.to_string()),
        center_code: Some(1),
        last_allocation_date: None,
    }
}
