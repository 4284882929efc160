use super::common::{policy, student_with, CENTER};
use crate::allocation::channels::route_student;
use crate::allocation::domain::AllocationChannel;

#[test]
fn routes_by_center_values() {
    let policy = policy();
    let golestan = student_with("s-1", CENTER, 1);
    let sadra = student_with("s-2", CENTER, 2);

    assert_eq!(
        route_student(&golestan, &policy),
        AllocationChannel::Golestan
    );
    assert_eq!(route_student(&sadra, &policy), AllocationChannel::Sadra);
}

#[test]
fn falls_back_to_generic() {
    let policy = policy();
    let unrouted = student_with("s-1", CENTER, 9);

    assert_eq!(route_student(&unrouted, &policy), AllocationChannel::Generic);
}

#[test]
fn school_membership_uses_resolved_tokens() {
    let policy = policy();
    let mut s = student_with("s-1", CENTER, 9);
    s.school_code = Some("77, 500".to_string());

    assert_eq!(route_student(&s, &policy), AllocationChannel::School);
}

#[test]
fn first_matching_rule_wins() {
    let policy = policy();
    // Matches both the SCHOOL rule and the GOLESTAN center rule; the
    // school rule is declared first.
    let mut s = student_with("s-1", CENTER, 1);
    s.school_code = Some("500".to_string());

    assert_eq!(route_student(&s, &policy), AllocationChannel::School);
}

#[test]
fn wildcard_school_code_does_not_match_school_predicates() {
    let policy = policy();
    let mut s = student_with("s-1", CENTER, 9);
    s.school_code = Some("0".to_string());

    assert_eq!(route_student(&s, &policy), AllocationChannel::Generic);
}
