//! Mentor pool governance and live capacity state.
//!
//! The pool is built once per batch: frozen mentors are dropped before the
//! filter chain ever sees them, restricted profiles stay in with their
//! eligibility intersection applied at match time. The mutable side —
//! remaining capacity, new allocations, occupancy — lives in [`StateTable`],
//! owned exclusively by the batch driver.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{Mentor, MentorStatus};

/// Counts reported by the pool pre-filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolGovernance {
    pub admitted: usize,
    pub removed_frozen: usize,
    pub restricted_retained: usize,
}

/// The immutable mentor pool after governance.
#[derive(Debug, Clone)]
pub struct MentorPool {
    mentors: Vec<Mentor>,
    governance: PoolGovernance,
}

impl MentorPool {
    /// Apply the pool pre-filter: `FROZEN` mentors are removed entirely,
    /// `RESTRICTED` profiles are retained and counted.
    pub fn build(mentors: Vec<Mentor>) -> Self {
        let mut governance = PoolGovernance::default();
        let mut admitted = Vec::with_capacity(mentors.len());
        for mentor in mentors {
            match mentor.status {
                MentorStatus::Frozen => governance.removed_frozen += 1,
                MentorStatus::Restricted { .. } => {
                    governance.restricted_retained += 1;
                    admitted.push(mentor);
                }
                MentorStatus::Active => admitted.push(mentor),
            }
        }
        governance.admitted = admitted.len();
        debug!(
            admitted = governance.admitted,
            removed_frozen = governance.removed_frozen,
            restricted_retained = governance.restricted_retained,
            "mentor pool governance applied"
        );
        Self {
            mentors: admitted,
            governance,
        }
    }

    pub fn mentors(&self) -> &[Mentor] {
        &self.mentors
    }

    pub fn governance(&self) -> PoolGovernance {
        self.governance
    }

    pub fn len(&self) -> usize {
        self.mentors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mentors.is_empty()
    }
}

/// Raised when a commit would drive remaining capacity negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityUnderflow;

/// Per-mentor mutable record tracked through a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentorState {
    pub declared_capacity: u32,
    pub remaining_capacity: u32,
    pub allocations_new: u32,
}

impl MentorState {
    fn seed(mentor: &Mentor) -> Self {
        Self {
            declared_capacity: mentor.capacity,
            remaining_capacity: mentor.capacity.saturating_sub(mentor.allocations_new),
            allocations_new: mentor.allocations_new,
        }
    }

    /// `allocations_new / declared_capacity`, with `0/0` treated as `0`.
    pub fn occupancy_ratio(&self) -> f64 {
        if self.declared_capacity == 0 {
            0.0
        } else {
            f64::from(self.allocations_new) / f64::from(self.declared_capacity)
        }
    }

    /// Commit one allocation against this mentor.
    pub fn commit(&mut self) -> Result<(), CapacityUnderflow> {
        if self.remaining_capacity == 0 {
            return Err(CapacityUnderflow);
        }
        self.remaining_capacity -= 1;
        self.allocations_new += 1;
        Ok(())
    }
}

/// Mutable state table parallel to the pool's mentor order.
#[derive(Debug, Clone)]
pub struct StateTable {
    states: Vec<MentorState>,
}

impl StateTable {
    pub fn build(pool: &MentorPool) -> Self {
        Self {
            states: pool.mentors().iter().map(MentorState::seed).collect(),
        }
    }

    pub fn get(&self, index: usize) -> &MentorState {
        &self.states[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut MentorState {
        &mut self.states[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MentorState> {
        self.states.iter()
    }

    /// Total allocations committed during this batch (seed values excluded).
    pub fn committed_this_batch(&self, pool: &MentorPool) -> u64 {
        self.states
            .iter()
            .zip(pool.mentors())
            .map(|(state, mentor)| u64::from(state.allocations_new - mentor.allocations_new))
            .sum()
    }
}
