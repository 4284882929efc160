//! Deterministic, policy-driven allocation of students to mentors.
//!
//! The crate consumes normalized tabular inputs and a validated policy
//! object, and emits tabular outputs plus a per-student audit trail. It
//! performs no I/O, reads no clocks, and uses no randomness: two runs over
//! the same inputs produce identical output tables.

pub mod allocation;
pub mod error;
