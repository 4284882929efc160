use super::common::{history_record, student};
use crate::allocation::dedupe::{partition_by_history, HistoryScreen};
use crate::allocation::domain::{DedupeReason, HistorySnapshot, HistoryStatus};

fn snapshot_with(code: &str) -> HistorySnapshot {
    HistorySnapshot::from_records([(code, history_record("EMP-7"))])
}

#[test]
fn diverts_students_found_in_history() {
    let snapshot = snapshot_with("0012345678");
    let screen = HistoryScreen::new(&snapshot);
    let mut s = student("s-1");
    s.national_code = Some("001-234 5678".to_string());

    let decision = screen.screen(&s);

    assert_eq!(decision.status, HistoryStatus::AlreadyAllocated);
    assert_eq!(decision.reason, DedupeReason::PriorAllocation);
    assert_eq!(decision.national_code.as_deref(), Some("0012345678"));
    assert_eq!(decision.prior.expect("prior record").mentor_id.0, "EMP-7");
}

#[test]
fn matches_persian_digit_codes_against_ascii_history() {
    let snapshot = snapshot_with("0012345678");
    let screen = HistoryScreen::new(&snapshot);
    let mut s = student("s-1");
    s.national_code = Some("۰۰۱۲۳۴۵۶۷۸".to_string());

    assert_eq!(
        screen.screen(&s).status,
        HistoryStatus::AlreadyAllocated
    );
}

#[test]
fn tags_missing_or_short_codes() {
    let snapshot = snapshot_with("0012345678");
    let screen = HistoryScreen::new(&snapshot);

    let missing = student("s-1");
    assert_eq!(
        screen.screen(&missing).reason,
        DedupeReason::MissingOrInvalidNationalCode
    );

    let mut short = student("s-2");
    short.national_code = Some("123".to_string());
    assert_eq!(
        screen.screen(&short).reason,
        DedupeReason::MissingOrInvalidNationalCode
    );
}

#[test]
fn tags_unmatched_codes_as_new_candidates() {
    let snapshot = snapshot_with("0012345678");
    let screen = HistoryScreen::new(&snapshot);
    let mut s = student("s-1");
    s.national_code = Some("9998887776".to_string());

    let decision = screen.screen(&s);

    assert_eq!(decision.status, HistoryStatus::NewCandidate);
    assert_eq!(decision.reason, DedupeReason::NoHistoryMatch);
    assert!(decision.prior.is_none());
}

#[test]
fn partition_is_idempotent() {
    let snapshot = snapshot_with("0012345678");
    let mut matched = student("s-1");
    matched.national_code = Some("0012345678".to_string());
    let mut fresh = student("s-2");
    fresh.national_code = Some("9998887776".to_string());
    let unmarked = student("s-3");
    let students = vec![matched, fresh, unmarked];

    let (already_first, new_first) = partition_by_history(&students, &snapshot);
    let (already_second, new_second) = partition_by_history(&students, &snapshot);

    assert_eq!(already_first, already_second);
    assert_eq!(new_first, new_second);
    assert_eq!(already_first.len(), 1);
    assert_eq!(new_first.len(), 2);
    assert_eq!(already_first[0].student_id.0, "s-1");
}

#[test]
fn snapshot_drops_invalid_codes_and_keeps_the_first_record() {
    let snapshot = HistorySnapshot::from_records([
        ("not-a-code", history_record("EMP-1")),
        ("0012345678", history_record("EMP-2")),
        ("0012345678", history_record("EMP-3")),
    ]);

    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        snapshot.get("0012345678").expect("record").mentor_id.0,
        "EMP-2"
    );
}
