//! File-format plumbing for the CLI: CSV readers for the three input
//! tables, CSV/JSON writers for the four output tables. All normalization
//! beyond raw cell access is delegated to the core crate so the engine sees
//! the same values no matter which front end loaded them.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use mentor_match::allocation::normalize::{coerce_join_int, split_school_tokens};
use mentor_match::allocation::{
    BatchReport, HistoryRecord, HistorySnapshot, LogRow, Mentor, MentorId, MentorStatus,
    PolicyConfig, Student, TraceRecord,
};
use serde::Serialize;

const STUDENT_ID_COLUMN: &str = "student_id";
const NATIONAL_CODE_COLUMN: &str = "national_code";
const CENTER_MANAGER_COLUMN: &str = "center_manager";
const MENTOR_ID_COLUMN: &str = "mentor_id";
const CAPACITY_COLUMN: &str = "capacity";
const ALLOCATIONS_NEW_COLUMN: &str = "allocations_new";
const MENTOR_STATUS_COLUMN: &str = "mentor_status";
const BOUND_SCHOOLS_COLUMN: &str = "bound_schools";
const CENTER_CODE_COLUMN: &str = "center_code";
const LAST_ALLOCATION_DATE_COLUMN: &str = "last_allocation_date";

/// Problems with the input tables; exit code 3 territory.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{path} row {row}: invalid {field} value '{value}'")]
    InvalidField {
        path: PathBuf,
        row: usize,
        field: &'static str,
        value: String,
    },
}

/// Problems writing the output tables.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

struct Sheet {
    path: PathBuf,
    headers: HashMap<String, usize>,
    rows: Vec<csv::StringRecord>,
}

impl Sheet {
    fn open(path: &Path) -> Result<Self, InputError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| InputError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        let headers = reader
            .headers()
            .map_err(|source| InputError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .enumerate()
            .map(|(index, name)| (name.trim().to_string(), index))
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record.map_err(|source| InputError::Csv {
                path: path.to_path_buf(),
                source,
            })?);
        }
        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    fn require(&self, column: &str) -> Result<usize, InputError> {
        self.headers
            .get(column)
            .copied()
            .ok_or_else(|| InputError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            })
    }

    fn cell<'a>(&self, row: &'a csv::StringRecord, column: &str) -> Option<&'a str> {
        self.headers
            .get(column)
            .and_then(|&index| row.get(index))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Load the students table. Join-key cells that do not coerce to integers
/// are left absent so the engine can flag them per student instead of
/// aborting the whole load.
pub fn load_students(
    path: &Path,
    policy: &PolicyConfig,
    center_overrides: &BTreeMap<String, i64>,
) -> Result<Vec<Student>, InputError> {
    let sheet = Sheet::open(path)?;
    sheet.require(STUDENT_ID_COLUMN)?;
    for key in &policy.join_keys {
        sheet.require(key)?;
    }

    let school_column = policy.school_column().to_string();
    let center_column = policy
        .stage_column(mentor_match::allocation::StageName::Center)
        .to_string();

    let mut students = Vec::with_capacity(sheet.rows.len());
    for (row_number, row) in sheet.rows.iter().enumerate() {
        let id = sheet
            .cell(row, STUDENT_ID_COLUMN)
            .map(str::to_string)
            .unwrap_or_else(|| format!("student_{row_number}"));
        let mut student = Student::new(id);
        student.national_code = sheet.cell(row, NATIONAL_CODE_COLUMN).map(str::to_string);
        student.school_code = sheet.cell(row, &school_column).map(str::to_string);

        for key in &policy.join_keys {
            let raw = sheet.cell(row, key);
            let coerced = if *key == school_column {
                // Multi-valued school cells are handled by the school stage;
                // the join map only records the first resolvable code, with
                // an empty cell folded to zero.
                Some(raw.and_then(first_school_code).unwrap_or(0))
            } else {
                raw.and_then(coerce_join_int)
            };
            if let Some(value) = coerced {
                student.join_values.insert(key.clone(), value);
            }
        }

        // Resolve a missing center value through the manager override map.
        if !student.join_values.contains_key(&center_column) {
            if let Some(manager) = sheet.cell(row, CENTER_MANAGER_COLUMN) {
                if let Some(&center) = center_overrides.get(manager) {
                    student.join_values.insert(center_column.clone(), center);
                }
            }
        }

        students.push(student);
    }
    Ok(students)
}

fn first_school_code(raw: &str) -> Option<i64> {
    let tokens = split_school_tokens(raw);
    if tokens.is_empty() {
        return Some(0);
    }
    tokens
        .iter()
        .find_map(|token| coerce_join_int(token))
        .or(Some(0))
}

/// Load the mentor pool table.
pub fn load_mentors(path: &Path, policy: &PolicyConfig) -> Result<Vec<Mentor>, InputError> {
    let sheet = Sheet::open(path)?;
    sheet.require(MENTOR_ID_COLUMN)?;
    sheet.require(CAPACITY_COLUMN)?;

    let school_column = policy.school_column();
    let eligibility_columns: Vec<&String> = policy
        .join_keys
        .iter()
        .filter(|key| key.as_str() != school_column)
        .collect();
    for column in &eligibility_columns {
        sheet.require(column)?;
    }

    let mut mentors = Vec::with_capacity(sheet.rows.len());
    for (row_number, row) in sheet.rows.iter().enumerate() {
        let id = sheet.cell(row, MENTOR_ID_COLUMN).ok_or_else(|| {
            InputError::InvalidField {
                path: sheet.path.clone(),
                row: row_number,
                field: "mentor_id",
                value: String::new(),
            }
        })?;
        let capacity_raw = sheet.cell(row, CAPACITY_COLUMN).unwrap_or("0");
        let capacity = coerce_join_int(capacity_raw)
            .filter(|value| *value >= 0)
            .ok_or_else(|| InputError::InvalidField {
                path: sheet.path.clone(),
                row: row_number,
                field: "capacity",
                value: capacity_raw.to_string(),
            })?;

        let mut mentor = Mentor::new(id, capacity as u32);
        if let Some(raw) = sheet.cell(row, ALLOCATIONS_NEW_COLUMN) {
            mentor.allocations_new = coerce_join_int(raw)
                .filter(|value| *value >= 0)
                .ok_or_else(|| InputError::InvalidField {
                    path: sheet.path.clone(),
                    row: row_number,
                    field: "allocations_new",
                    value: raw.to_string(),
                })? as u32;
        }
        mentor.status = parse_mentor_status(sheet.cell(row, MENTOR_STATUS_COLUMN));

        for column in &eligibility_columns {
            if let Some(value) = sheet.cell(row, column).and_then(coerce_join_int) {
                mentor.eligibility.insert((*column).clone(), value);
            }
        }

        if let Some(raw) = sheet.cell(row, BOUND_SCHOOLS_COLUMN) {
            for token in split_school_tokens(raw) {
                if let Some(code) = coerce_join_int(&token) {
                    if code != 0 {
                        mentor.bound_schools.insert(code);
                    }
                }
            }
        }
        mentor.has_school_constraint = !mentor.bound_schools.is_empty();

        mentors.push(mentor);
    }
    Ok(mentors)
}

fn parse_mentor_status(raw: Option<&str>) -> MentorStatus {
    match raw {
        None => MentorStatus::Active,
        Some(value) => {
            let upper = value.to_ascii_uppercase();
            if upper == "FROZEN" {
                MentorStatus::Frozen
            } else if upper.starts_with("RESTRICTED") {
                MentorStatus::Restricted {
                    allowed: BTreeMap::new(),
                }
            } else {
                MentorStatus::Active
            }
        }
    }
}

/// Load the history snapshot table.
pub fn load_history(path: &Path) -> Result<HistorySnapshot, InputError> {
    let sheet = Sheet::open(path)?;
    sheet.require(NATIONAL_CODE_COLUMN)?;
    sheet.require(MENTOR_ID_COLUMN)?;

    let mut records = Vec::with_capacity(sheet.rows.len());
    for row in &sheet.rows {
        let Some(code) = sheet.cell(row, NATIONAL_CODE_COLUMN) else {
            continue;
        };
        let Some(mentor_id) = sheet.cell(row, MENTOR_ID_COLUMN) else {
            continue;
        };
        let center_code = sheet
            .cell(row, CENTER_CODE_COLUMN)
            .and_then(coerce_join_int);
        let last_allocation_date = sheet
            .cell(row, LAST_ALLOCATION_DATE_COLUMN)
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());
        records.push((
            code.to_string(),
            HistoryRecord {
                mentor_id: MentorId(mentor_id.to_string()),
                center_code,
                last_allocation_date,
            },
        ));
    }
    Ok(HistorySnapshot::from_records(records))
}

#[derive(Debug, Serialize)]
struct TraceCsvRow<'a> {
    row_index: usize,
    student_id: &'a str,
    stage: &'static str,
    before_count: usize,
    after_count: usize,
    drop_reason: &'a str,
    note: &'a str,
    history_status: &'static str,
    dedupe_reason: &'static str,
    allocation_channel: &'static str,
}

#[derive(Debug, Serialize)]
struct LogCsvRow<'a> {
    row_index: usize,
    student_id: &'a str,
    status: &'static str,
    error_kind: &'a str,
    detailed_reason: &'a str,
    suggested_actions: String,
    candidate_count: usize,
    allocation_channel: &'static str,
}

/// Write the four output tables under `dir`.
pub fn write_outputs(report: &BatchReport, dir: &Path) -> Result<(), OutputError> {
    fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    write_csv(&dir.join("assignments.csv"), &report.assignments)?;
    write_trace_csv(&dir.join("trace.csv"), &report.traces)?;
    write_log_csv(&dir.join("log.csv"), &report.log)?;

    let summary_path = dir.join("summary.json");
    let rendered =
        serde_json::to_string_pretty(&report.summary).map_err(|source| OutputError::Json {
            path: summary_path.clone(),
            source,
        })?;
    fs::write(&summary_path, rendered).map_err(|source| OutputError::Io {
        path: summary_path,
        source,
    })?;
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), OutputError> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| OutputError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    for row in rows {
        writer.serialize(row).map_err(|source| OutputError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_trace_csv(path: &Path, traces: &[TraceRecord]) -> Result<(), OutputError> {
    let mut rows = Vec::new();
    for trace in traces {
        for stage in &trace.stages {
            rows.push(TraceCsvRow {
                row_index: trace.row_index,
                student_id: &trace.student_id.0,
                stage: stage.stage.label(),
                before_count: stage.before_count,
                after_count: stage.after_count,
                drop_reason: stage.drop_reason.as_deref().unwrap_or(""),
                note: stage.note.as_deref().unwrap_or(""),
                history_status: trace.history_status.label(),
                dedupe_reason: trace.dedupe_reason.label(),
                allocation_channel: trace.allocation_channel.label(),
            });
        }
    }
    write_csv(path, &rows)
}

fn write_log_csv(path: &Path, log: &[LogRow]) -> Result<(), OutputError> {
    let rows: Vec<LogCsvRow<'_>> = log
        .iter()
        .map(|row| LogCsvRow {
            row_index: row.row_index,
            student_id: &row.student_id.0,
            status: row.status.label(),
            error_kind: row.error_kind.map(|kind| kind.label()).unwrap_or(""),
            detailed_reason: &row.detailed_reason,
            suggested_actions: row.suggested_actions.join("; "),
            candidate_count: row.candidate_count,
            allocation_channel: row.allocation_channel.label(),
        })
        .collect();
    write_csv(path, &rows)
}

/// Parse one `--center-manager NAME=ID` override.
pub fn parse_center_override(raw: &str) -> Result<(String, i64), String> {
    let (name, id) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=ID, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty manager name in '{raw}'"));
    }
    let id = coerce_join_int(id.trim()).ok_or_else(|| format!("'{id}' is not a center id"))?;
    Ok((name.to_string(), id))
}
