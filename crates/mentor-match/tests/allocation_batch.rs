use std::collections::BTreeMap;

use mentor_match::allocation::{
    parse_policy_str, AllocationChannel, AllocationEngine, AllocationOutcome, BatchHooks,
    ErrorKind, HistoryRecord, HistorySnapshot, Mentor, MentorId, OutcomeStatus, SelectionReason,
    Student,
};

const GROUP: &str = "group_code";
const GENDER: &str = "gender";
const GRADUATION: &str = "graduation_status";
const CENTER: &str = "center";
const FINANCE: &str = "finance";
const SCHOOL: &str = "school_code";

fn policy_json() -> String {
    format!(
        r#"{{
  "version": "1.0.3",
  "join_keys": ["{GROUP}", "{GENDER}", "{GRADUATION}", "{CENTER}", "{FINANCE}", "{SCHOOL}"],
  "normal_statuses": [1201],
  "school_statuses": [],
  "ranking_rules": ["min_occupancy_ratio", "min_allocations_new", "min_mentor_id"],
  "trace_stages": [
    {{"name": "type", "source_column": "{GROUP}", "kind": "membership", "drop_reason": "type_mismatch"}},
    {{"name": "group", "source_column": "{GROUP}", "kind": "membership", "drop_reason": "group_mismatch"}},
    {{"name": "gender", "source_column": "{GENDER}", "kind": "exact_int", "drop_reason": "gender_mismatch"}},
    {{"name": "graduation_status", "source_column": "{GRADUATION}", "kind": "exact_int", "drop_reason": "graduation_status_mismatch"}},
    {{"name": "center", "source_column": "{CENTER}", "kind": "wildcard_aware", "drop_reason": "center_mismatch"}},
    {{"name": "finance", "source_column": "{FINANCE}", "kind": "exact_int", "drop_reason": "finance_mismatch"}},
    {{"name": "school", "source_column": "{SCHOOL}", "kind": "wildcard_aware", "drop_reason": "school_mismatch"}},
    {{"name": "capacity_gate", "source_column": "remaining_capacity", "kind": "capacity_gate", "drop_reason": "capacity_full"}}
  ],
  "allocation_channels": [
    {{"predicate": {{"column": "{CENTER}", "in": [1]}}, "tag": "GOLESTAN"}},
    {{"predicate": {{"column": "{CENTER}", "in": [2]}}, "tag": "SADRA"}}
  ],
  "school_binding": {{
    "mode": "global",
    "empty_tokens": ["", "-"],
    "zero_as_wildcard": true
  }}
}}"#
    )
}

fn engine() -> AllocationEngine {
    let policy = parse_policy_str(&policy_json()).expect("scenario policy is valid");
    AllocationEngine::new(policy)
}

fn student(id: &str, center: i64) -> Student {
    let mut join_values = BTreeMap::new();
    join_values.insert(GROUP.to_string(), 1201);
    join_values.insert(GENDER.to_string(), 1);
    join_values.insert(GRADUATION.to_string(), 0);
    join_values.insert(CENTER.to_string(), center);
    join_values.insert(FINANCE.to_string(), 0);
    join_values.insert(SCHOOL.to_string(), 0);
    Student {
        join_values,
        ..Student::new(id)
    }
}

fn mentor(id: &str, capacity: u32, center: i64) -> Mentor {
    let mut built = Mentor::new(id, capacity);
    built.eligibility.insert(GROUP.to_string(), 1201);
    built.eligibility.insert(GENDER.to_string(), 1);
    built.eligibility.insert(GRADUATION.to_string(), 0);
    built.eligibility.insert(CENTER.to_string(), center);
    built.eligibility.insert(FINANCE.to_string(), 0);
    built
}

#[test]
fn s1_tie_break_by_natural_mentor_id() {
    let pool = vec![
        mentor("EMP-10", 5, 1),
        mentor("EMP-2", 5, 1),
        mentor("EMP-010", 5, 1),
    ];
    let report = engine()
        .run(
            &[student("s1", 1)],
            pool,
            &HistorySnapshot::empty(),
            BatchHooks::default(),
        )
        .expect("batch completes");

    assert_eq!(report.assignments.len(), 1);
    assert_eq!(report.assignments[0].mentor_id.0, "EMP-2");
    assert_eq!(
        report.assignments[0].selection_reason,
        Some(SelectionReason::TieBrokenByMentorId)
    );

    match &report.outcomes[0] {
        AllocationOutcome::Success(detail) => {
            assert_eq!(detail.tie_breakers.len(), 3);
            assert_eq!(detail.tie_breakers[0].mentor_id.0, "EMP-2");
            assert_eq!(detail.tie_breakers[1].mentor_id.0, "EMP-010");
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn s2_capacity_exhaustion_cascade() {
    let report = engine()
        .run(
            &[student("a", 1), student("b", 1), student("c", 1)],
            vec![mentor("M1", 1, 1)],
            &HistorySnapshot::empty(),
            BatchHooks::default(),
        )
        .expect("batch completes");

    assert_eq!(report.log[0].status, OutcomeStatus::Success);
    assert_eq!(report.log[1].error_kind, Some(ErrorKind::CapacityFull));
    assert_eq!(report.log[2].error_kind, Some(ErrorKind::CapacityFull));

    // After the batch: remaining 0, one new allocation.
    assert_eq!(report.assignments[0].capacity_after, 0);
    assert_eq!(report.summary.successes, 1);
    assert_eq!(report.summary.failures, 2);

    let gate = report
        .summary
        .stage_survival
        .iter()
        .last()
        .expect("capacity gate row");
    assert_eq!(gate.survived, 1, "only the first student found capacity");
}

#[test]
fn s3_school_wildcard_keeps_bound_mentor() {
    let mut bound = mentor("M1", 5, 1);
    bound.has_school_constraint = true;
    bound.bound_schools.insert(123);

    let mut wildcarded = student("s1", 1);
    wildcarded.school_code = Some("0".to_string());

    let report = engine()
        .run(
            &[wildcarded],
            vec![bound],
            &HistorySnapshot::empty(),
            BatchHooks::default(),
        )
        .expect("batch completes");

    assert_eq!(report.assignments.len(), 1);
    assert_eq!(report.assignments[0].mentor_id.0, "M1");
    let school_stage = &report.traces[0].stages[6];
    assert_eq!(school_stage.before_count, school_stage.after_count);
    assert_eq!(school_stage.note.as_deref(), Some("wildcard"));
}

#[test]
fn s4_history_diversion_changes_nothing() {
    let history = HistorySnapshot::from_records([(
        "0012345678",
        HistoryRecord {
            mentor_id: MentorId("M-OLD".to_string()),
            center_code: Some(1),
            last_allocation_date: None,
        },
    )]);
    let mut diverted = student("s1", 1);
    diverted.national_code = Some("0012345678".to_string());

    let with = engine()
        .run(
            &[diverted, student("s2", 1)],
            vec![mentor("M1", 3, 1)],
            &history,
            BatchHooks::default(),
        )
        .expect("batch completes");
    let without = engine()
        .run(
            &[student("s2", 1)],
            vec![mentor("M1", 3, 1)],
            &HistorySnapshot::empty(),
            BatchHooks::default(),
        )
        .expect("batch completes");

    assert_eq!(with.log[0].status, OutcomeStatus::SkippedHistory);
    assert_eq!(with.traces[0].dedupe_reason.label(), "prior_allocation");
    assert_eq!(
        with.assignments[0].capacity_before,
        without.assignments[0].capacity_before,
        "mentor state matches a run without the diverted student"
    );
    assert_eq!(
        with.assignments[0].capacity_after,
        without.assignments[0].capacity_after
    );
}

#[test]
fn s5_channel_routing_by_center() {
    let report = engine()
        .run(
            &[student("s1", 1), student("s2", 2)],
            vec![mentor("M1", 5, 1), mentor("M2", 5, 2)],
            &HistorySnapshot::empty(),
            BatchHooks::default(),
        )
        .expect("batch completes");

    assert_eq!(report.summary.successes, 2);
    assert_eq!(
        report.assignments[0].allocation_channel,
        AllocationChannel::Golestan
    );
    assert_eq!(
        report.assignments[1].allocation_channel,
        AllocationChannel::Sadra
    );
}

#[test]
fn s6_stable_ordering_under_equal_ranks() {
    let report = engine()
        .run(
            &[student("s1", 1), student("s2", 1)],
            vec![mentor("MA", 5, 1), mentor("MB", 5, 1)],
            &HistorySnapshot::empty(),
            BatchHooks::default(),
        )
        .expect("batch completes");

    assert_eq!(report.assignments[0].mentor_id.0, "MA");
    assert_eq!(report.assignments[1].mentor_id.0, "MB");
}

#[test]
fn byte_identical_reports_across_runs() {
    let students = vec![student("s1", 1), student("s2", 2), student("s3", 1)];
    let pool = || vec![mentor("EMP-2", 1, 1), mentor("EMP-10", 2, 1), mentor("M2", 2, 2)];

    let first = engine()
        .run(&students, pool(), &HistorySnapshot::empty(), BatchHooks::default())
        .expect("first run completes");
    let second = engine()
        .run(&students, pool(), &HistorySnapshot::empty(), BatchHooks::default())
        .expect("second run completes");

    let first_json = serde_json::to_string(&first).expect("report serializes");
    let second_json = serde_json::to_string(&second).expect("report serializes");
    assert_eq!(first_json, second_json);
}

#[test]
fn capacity_is_conserved_across_the_batch() {
    let students: Vec<Student> = (0..6).map(|n| student(&format!("s{n}"), 1)).collect();
    let report = engine()
        .run(
            &students,
            vec![mentor("M1", 2, 1), mentor("M2", 3, 1)],
            &HistorySnapshot::empty(),
            BatchHooks::default(),
        )
        .expect("batch completes");

    assert_eq!(report.summary.successes, 5);
    assert_eq!(report.summary.failures, 1);
    for row in &report.assignments {
        assert_eq!(row.capacity_before - 1, row.capacity_after);
    }
}
