use std::cmp::Ordering;

use super::common::{mentor, policy, student};
use crate::allocation::pool::{MentorPool, StateTable};
use crate::allocation::ranking::{
    compare, rank_candidates, selection_reason, tie_breaker_preview, SelectionReason,
    TIE_BREAKER_PREVIEW,
};
use crate::allocation::trace::run_filter_chain;

fn ranked_for(
    mentors: Vec<crate::allocation::domain::Mentor>,
) -> Vec<crate::allocation::ranking::RankedCandidate> {
    let policy = policy();
    let pool = MentorPool::build(mentors);
    let states = StateTable::build(&pool);
    let chain = run_filter_chain(&student("s-1"), &pool, &states, &policy);
    rank_candidates(&chain.survivors, &pool, &states)
}

#[test]
fn natural_key_breaks_full_ties() {
    let ranked = ranked_for(vec![
        mentor("EMP-10", 5),
        mentor("EMP-2", 5),
        mentor("EMP-010", 5),
    ]);

    let ids: Vec<&str> = ranked
        .iter()
        .map(|candidate| candidate.mentor_id.0.as_str())
        .collect();
    assert_eq!(ids, vec!["EMP-2", "EMP-010", "EMP-10"]);
    assert_eq!(
        selection_reason(&ranked[0], ranked.get(1)),
        SelectionReason::TieBrokenByMentorId
    );
}

#[test]
fn lower_occupancy_wins_outright() {
    let mut busy = mentor("EMP-1", 10);
    busy.allocations_new = 5;
    let idle = mentor("EMP-2", 10);

    let ranked = ranked_for(vec![busy, idle]);

    assert_eq!(ranked[0].mentor_id.0, "EMP-2");
    assert_eq!(
        selection_reason(&ranked[0], ranked.get(1)),
        SelectionReason::MinOccupancyRatio
    );
}

#[test]
fn equal_ratios_fall_back_to_new_allocations() {
    // 1/2 and 2/4 share the same occupancy ratio.
    let mut fewer = mentor("EMP-9", 2);
    fewer.allocations_new = 1;
    let mut more = mentor("EMP-1", 4);
    more.allocations_new = 2;

    let ranked = ranked_for(vec![more, fewer]);

    assert_eq!(ranked[0].mentor_id.0, "EMP-9");
    assert_eq!(
        selection_reason(&ranked[0], ranked.get(1)),
        SelectionReason::TieBrokenByAllocationsNew
    );
}

#[test]
fn ratios_within_epsilon_count_as_tied() {
    let a = crate::allocation::ranking::RankedCandidate {
        index: 0,
        mentor_id: crate::allocation::domain::MentorId("EMP-1".to_string()),
        sort_key: crate::allocation::normalize::natural_key("EMP-1"),
        occupancy_ratio: 0.5,
        allocations_new: 0,
        remaining_capacity: 1,
    };
    let mut b = a.clone();
    b.mentor_id = crate::allocation::domain::MentorId("EMP-2".to_string());
    b.sort_key = crate::allocation::normalize::natural_key("EMP-2");
    b.occupancy_ratio = 0.5 + 1e-12;

    assert_eq!(compare(&a, &b), Ordering::Less, "tie falls to the mentor key");
    assert_eq!(
        selection_reason(&a, Some(&b)),
        SelectionReason::TieBrokenByMentorId
    );
}

#[test]
fn comparator_is_total_over_distinct_mentors() {
    let ranked = ranked_for(vec![mentor("EMP-1", 5), mentor("EMP-2", 5)]);
    assert_ne!(compare(&ranked[0], &ranked[1]), Ordering::Equal);
    assert_ne!(compare(&ranked[1], &ranked[0]), Ordering::Equal);
}

#[test]
fn preview_is_capped() {
    let mentors = (1..=8).map(|n| mentor(&format!("EMP-{n}"), 5)).collect();
    let ranked = ranked_for(mentors);
    let preview = tie_breaker_preview(&ranked);

    assert_eq!(preview.len(), TIE_BREAKER_PREVIEW);
    assert_eq!(preview[0].mentor_id.0, "EMP-1");
}

#[test]
fn single_candidate_reports_the_primary_rule() {
    let ranked = ranked_for(vec![mentor("EMP-1", 5)]);
    assert_eq!(
        selection_reason(&ranked[0], None),
        SelectionReason::MinOccupancyRatio
    );
}
