//! Channel router: tags each new candidate with one of the four
//! allocation streams by evaluating the policy's ordered predicate rules
//! top-down. The router performs no I/O and never consults the mentor pool.

use super::domain::{AllocationChannel, Student};
use super::policy::PolicyConfig;

/// Resolve the student's allocation channel.
///
/// The first rule whose predicate matches wins; a student matching no rule
/// is tagged `GENERIC`. Predicates on the school column test the student's
/// resolved school-code set for intersection, so multi-valued and wildcard
/// cells behave the same way they do in the school trace stage.
pub fn route_student(student: &Student, policy: &PolicyConfig) -> AllocationChannel {
    let school_column = policy.school_column();
    for rule in &policy.allocation_channels {
        let predicate = &rule.predicate;
        let matched = if predicate.column == school_column {
            let codes = student.school_codes(&policy.school_binding);
            codes
                .codes
                .iter()
                .any(|code| predicate.values.contains(code))
        } else {
            student
                .join_value(&predicate.column)
                .is_some_and(|value| predicate.values.contains(&value))
        };
        if matched {
            return rule.tag;
        }
    }
    AllocationChannel::Generic
}
