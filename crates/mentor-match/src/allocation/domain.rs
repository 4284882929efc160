use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::normalize::{
    coerce_join_int, natural_key, normalize_national_code, split_school_tokens, NaturalKey,
};
use super::policy::{SchoolBinding, SchoolBindingMode};

/// Identifier wrapper for students as they appear in the input table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Identifier wrapper for mentors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MentorId(pub String);

/// One of the four routing streams a student is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationChannel {
    School,
    Golestan,
    Sadra,
    Generic,
}

impl AllocationChannel {
    pub const fn label(self) -> &'static str {
        match self {
            AllocationChannel::School => "SCHOOL",
            AllocationChannel::Golestan => "GOLESTAN",
            AllocationChannel::Sadra => "SADRA",
            AllocationChannel::Generic => "GENERIC",
        }
    }

    pub fn from_label(label: &str) -> Option<AllocationChannel> {
        [
            AllocationChannel::School,
            AllocationChannel::Golestan,
            AllocationChannel::Sadra,
            AllocationChannel::Generic,
        ]
        .into_iter()
        .find(|channel| channel.label() == label)
    }
}

/// A student row after normalization. Never mutated by the engine.
///
/// Join-key values are kept in a map keyed by the policy column names; a
/// key absent from the map means the source cell could not be coerced to an
/// integer, which the engine reports as a per-student data failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: StudentId,
    pub national_code: Option<String>,
    pub school_code: Option<String>,
    pub join_values: BTreeMap<String, i64>,
}

impl Student {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: StudentId(student_id.into()),
            national_code: None,
            school_code: None,
            join_values: BTreeMap::new(),
        }
    }

    /// Join-key value by policy column name.
    pub fn join_value(&self, column: &str) -> Option<i64> {
        self.join_values.get(column).copied()
    }

    /// The normalized ten-digit national code, if the raw value carries one.
    pub fn national_code_normalized(&self) -> Option<String> {
        self.national_code
            .as_deref()
            .and_then(normalize_national_code)
    }

    /// Resolve the raw school cell into a code set under the policy's
    /// binding rules: multi-valued cells split on `, ; |`, empty tokens
    /// dropped, and zero treated as a wildcard when the policy says so.
    pub fn school_codes(&self, binding: &SchoolBinding) -> SchoolCodeSet {
        let Some(raw) = self.school_code.as_deref() else {
            return SchoolCodeSet::missing();
        };

        let mut codes = BTreeSet::new();
        let mut wildcard = false;
        for token in split_school_tokens(raw) {
            let normalized = super::normalize::normalize_text(&token);
            if normalized.is_empty() {
                continue;
            }
            // The zero-as-wildcard flag outranks the empty-token list, so a
            // policy may list "0" among its empty tokens without losing the
            // wildcard behavior.
            if let Some(code) = coerce_join_int(&normalized) {
                if code == 0 && binding.zero_as_wildcard {
                    wildcard = true;
                    continue;
                }
                if binding.empty_tokens.contains(&normalized) {
                    continue;
                }
                codes.insert(code);
            }
        }

        if codes.is_empty() {
            if wildcard {
                SchoolCodeSet::wildcard()
            } else {
                SchoolCodeSet::missing()
            }
        } else {
            SchoolCodeSet {
                codes,
                wildcard,
                missing: false,
            }
        }
    }
}

/// Outcome of resolving a student's school cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchoolCodeSet {
    pub codes: BTreeSet<i64>,
    pub wildcard: bool,
    pub missing: bool,
}

impl SchoolCodeSet {
    pub fn missing() -> Self {
        Self {
            codes: BTreeSet::new(),
            wildcard: false,
            missing: true,
        }
    }

    pub fn wildcard() -> Self {
        Self {
            codes: BTreeSet::new(),
            wildcard: true,
            missing: false,
        }
    }

    /// Whether the school stage applies no filter for this student.
    pub fn passes_unfiltered(&self) -> bool {
        self.wildcard || self.missing
    }
}

/// Lifecycle tag controlling a mentor's participation in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MentorStatus {
    Active,
    /// Excluded from the pool entirely before the filter chain runs.
    Frozen,
    /// Retained, but eligibility columns are intersected with the listed
    /// allowed values before stage 1.
    Restricted {
        #[serde(default)]
        allowed: BTreeMap<String, BTreeSet<i64>>,
    },
}

impl MentorStatus {
    pub const fn label(&self) -> &'static str {
        match self {
            MentorStatus::Active => "ACTIVE",
            MentorStatus::Frozen => "FROZEN",
            MentorStatus::Restricted { .. } => "RESTRICTED",
        }
    }
}

/// A mentor row from the pool table. Immutable; the batch driver tracks the
/// mutable capacity side in [`super::pool::MentorState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mentor {
    pub mentor_id: MentorId,
    pub sort_key: NaturalKey,
    pub capacity: u32,
    pub allocations_new: u32,
    pub status: MentorStatus,
    pub eligibility: BTreeMap<String, i64>,
    pub bound_schools: BTreeSet<i64>,
    pub has_school_constraint: bool,
}

impl Mentor {
    pub fn new(mentor_id: impl Into<String>, capacity: u32) -> Self {
        let id = mentor_id.into();
        let sort_key = natural_key(&id);
        Self {
            mentor_id: MentorId(id),
            sort_key,
            capacity,
            allocations_new: 0,
            status: MentorStatus::Active,
            eligibility: BTreeMap::new(),
            bound_schools: BTreeSet::new(),
            has_school_constraint: false,
        }
    }

    /// Whether this mentor accepts `value` on `column`, taking any
    /// restricted-profile intersection into account.
    pub fn accepts(&self, column: &str, value: i64) -> bool {
        match self.eligibility.get(column) {
            Some(own) if *own == value => {}
            _ => return false,
        }
        match &self.status {
            MentorStatus::Restricted { allowed } => allowed
                .get(column)
                .map_or(true, |values| values.contains(&value)),
            _ => true,
        }
    }

    /// Whether the school stage passes this mentor for the given student
    /// code set under the policy's binding mode.
    pub fn accepts_school(&self, codes: &SchoolCodeSet, mode: SchoolBindingMode) -> bool {
        if !self.has_school_constraint {
            return match mode {
                SchoolBindingMode::Global => true,
                SchoolBindingMode::Restricted => codes.passes_unfiltered(),
            };
        }
        if codes.passes_unfiltered() {
            return true;
        }
        codes
            .codes
            .iter()
            .any(|code| self.bound_schools.contains(code))
    }
}

/// History tag attached to every processed student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    AlreadyAllocated,
    NewCandidate,
}

impl HistoryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            HistoryStatus::AlreadyAllocated => "already_allocated",
            HistoryStatus::NewCandidate => "new_candidate",
        }
    }
}

/// Why the deduplicator placed a student on its side of the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeReason {
    PriorAllocation,
    MissingOrInvalidNationalCode,
    NoHistoryMatch,
}

impl DedupeReason {
    pub const fn label(self) -> &'static str {
        match self {
            DedupeReason::PriorAllocation => "prior_allocation",
            DedupeReason::MissingOrInvalidNationalCode => "missing_or_invalid_national_code",
            DedupeReason::NoHistoryMatch => "no_history_match",
        }
    }
}

/// One prior-allocation row from the history snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub mentor_id: MentorId,
    pub center_code: Option<i64>,
    pub last_allocation_date: Option<NaiveDate>,
}

/// Read-only map of prior allocations keyed by normalized national code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    records: BTreeMap<String, HistoryRecord>,
}

impl HistorySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from raw `(national_code, record)` pairs. Codes are normalized
    /// on the way in; unparseable codes are dropped and the first record
    /// wins on duplicates.
    pub fn from_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = (S, HistoryRecord)>,
        S: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        for (code, record) in records {
            if let Some(normalized) = normalize_national_code(code.as_ref()) {
                map.entry(normalized).or_insert(record);
            }
        }
        Self { records: map }
    }

    pub fn get(&self, national_code_normalized: &str) -> Option<&HistoryRecord> {
        self.records.get(national_code_normalized)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
