//! Record classifier. Applies the status gate, picks the responsible
//! technician, enriches from the roster and attributes repeats.
//!
//! Order of evaluation:
//!   1. Status gate: anything outside the success/failure pair is dropped
//!      and never reaches any aggregate, totals included.
//!   2. Current and previous codes extracted from the two name fields.
//!   3. Responsible code = current, else previous, else empty.
//!   4. Roster lookup on the responsible code.
//!   5. Field repeat = repeat flag AND a previous code exists.
//!
//! Timestamps are parsed here but gate nothing: a row without a usable
//! timestamp still counts toward technician/supervisor totals.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    config::KpiConfig,
    error::KpiResult,
    identifier::{short_label, CodeExtractor},
    roster::RosterIndex,
    timestamp::{parse_timestamp, TimestampParse},
    types::{Period, TechCode},
};

/// One raw operations row, keyed by column meaning rather than position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationRow {
    pub technician_name: Option<String>,
    pub previous_technician_name: Option<String>,
    pub executed_at: Option<String>,
    pub order_number: String,
    pub status: String,
    pub repeat_flag: Option<String>,
    /// Explicit `YYYY-MM` period column, when the export carries one.
    pub period: Option<String>,
    pub closure_code: Option<String>,
    pub previous_closure_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub order_number: String,
    pub outcome: Outcome,
    pub technician_name: String,
    pub current_code: TechCode,
    pub previous_code: TechCode,
    pub responsible_code: TechCode,
    pub display_name: String,
    pub supervisor: String,
    pub coordinator: String,
    pub city: String,
    pub employment_status: String,
    pub on_roster: bool,
    pub executed_at: Option<NaiveDateTime>,
    pub period: Option<Period>,
    pub is_repeat_overall: bool,
    pub is_repeat_attributable: bool,
    /// How this visit was closed; empty when the export has no code.
    pub closure_code: String,
    /// How the visit being repeated was closed.
    pub previous_closure_code: String,
}

impl ClassifiedRecord {
    pub fn is_attributable(&self) -> bool {
        !self.responsible_code.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn execution_date(&self) -> Option<NaiveDate> {
        self.executed_at.map(|ts| ts.date())
    }
}

/// Soft failures accumulated over one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub rows_seen: usize,
    pub dropped_by_status: usize,
    pub unattributable: usize,
    pub unrostered: usize,
    pub missing_timestamps: usize,
    pub unparseable_timestamps: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub records: Vec<ClassifiedRecord>,
    pub report: ClassificationReport,
}

pub struct Classifier<'a> {
    roster: &'a RosterIndex,
    config: &'a KpiConfig,
    extractor: CodeExtractor,
}

impl<'a> Classifier<'a> {
    pub fn new(roster: &'a RosterIndex, config: &'a KpiConfig) -> KpiResult<Self> {
        Ok(Self {
            roster,
            config,
            extractor: CodeExtractor::new(&config.identifiers)?,
        })
    }

    pub fn outcome_of(&self, status: &str) -> Option<Outcome> {
        let status = status.trim();
        if status == self.config.outcomes.success {
            Some(Outcome::Success)
        } else if status == self.config.outcomes.failure {
            Some(Outcome::Failure)
        } else {
            None
        }
    }

    /// `None` when the status gate drops the row.
    pub fn classify(&self, row: &OperationRow) -> Option<ClassifiedRecord> {
        self.classify_with_timestamp(row).map(|(record, _)| record)
    }

    fn classify_with_timestamp(
        &self,
        row: &OperationRow,
    ) -> Option<(ClassifiedRecord, TimestampParse)> {
        let outcome = self.outcome_of(&row.status)?;

        let current_code = self.extractor.extract(row.technician_name.as_deref());
        let previous_code = self
            .extractor
            .extract(row.previous_technician_name.as_deref());
        let responsible_code = if current_code.is_empty() {
            previous_code.clone()
        } else {
            current_code.clone()
        };

        let entry = self.roster.lookup(&responsible_code);
        let technician_name = row.technician_name.clone().unwrap_or_default();
        let display_name = if entry.display_name.is_empty() {
            let source = if current_code.is_empty() {
                row.previous_technician_name.as_deref().unwrap_or_default()
            } else {
                technician_name.as_str()
            };
            short_label(source, &responsible_code)
        } else {
            entry.display_name.clone()
        };

        let is_repeat_overall = row.repeat_flag.as_deref().is_some_and(|flag| {
            flag.trim().to_uppercase() == self.config.repeat_flag_affirmative.trim().to_uppercase()
        });
        let is_repeat_attributable = is_repeat_overall && !previous_code.is_empty();

        let parsed = parse_timestamp(row.executed_at.as_deref(), &self.config.timestamps.formats);
        let executed_at = parsed.value();
        let period = row
            .period
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .or_else(|| executed_at.map(|ts| ts.format("%Y-%m").to_string()));

        let record = ClassifiedRecord {
            order_number: row.order_number.trim().to_string(),
            outcome,
            technician_name,
            current_code,
            previous_code,
            responsible_code,
            display_name,
            supervisor: entry.supervisor.clone(),
            coordinator: entry.coordinator.clone(),
            city: entry.city.clone(),
            employment_status: entry.employment_status.clone(),
            on_roster: !entry.is_unallocated(),
            executed_at,
            period,
            is_repeat_overall,
            is_repeat_attributable,
            closure_code: trimmed(row.closure_code.as_deref()),
            previous_closure_code: trimmed(row.previous_closure_code.as_deref()),
        };
        Some((record, parsed))
    }

    pub fn classify_all(&self, rows: &[OperationRow]) -> Classification {
        let mut out = Classification::default();
        out.report.rows_seen = rows.len();

        for row in rows {
            let Some((record, parsed)) = self.classify_with_timestamp(row) else {
                out.report.dropped_by_status += 1;
                continue;
            };
            match parsed {
                TimestampParse::Parsed(_) => {}
                TimestampParse::Missing => out.report.missing_timestamps += 1,
                TimestampParse::Unparseable => out.report.unparseable_timestamps += 1,
            }
            if !record.is_attributable() {
                out.report.unattributable += 1;
            } else if !record.on_roster {
                out.report.unrostered += 1;
            }
            out.records.push(record);
        }

        if out.report.unparseable_timestamps > 0 {
            log::warn!(
                "classify: {} row(s) with unparseable execution timestamps",
                out.report.unparseable_timestamps
            );
        }
        log::info!(
            "classify: {} of {} row(s) kept ({} dropped by status, {} unattributable)",
            out.records.len(),
            out.report.rows_seen,
            out.report.dropped_by_status,
            out.report.unattributable
        );
        out
    }
}

fn trimmed(raw: Option<&str>) -> String {
    raw.map(str::trim).unwrap_or_default().to_string()
}
