//! Incremental sync: decide which export rows are new relative to the
//! persisted watermark and hand them to the store.
//!
//! The watermark is the latest `executed_at` already persisted. It is an
//! exclusive lower bound, so replaying the same export inserts nothing.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{
    classify::OperationRow,
    config::KpiConfig,
    error::KpiResult,
    store::OrderStore,
    timestamp::{parse_timestamp, TimestampParse},
    types::RunId,
};

/// A row selected for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_number: String,
    pub technician_name: String,
    pub status: String,
    /// `None` only when the destination was empty and the row's timestamp
    /// could not be read.
    pub executed_at: Option<NaiveDateTime>,
}

impl PendingOrder {
    fn from_row(row: &OperationRow, executed_at: Option<NaiveDateTime>) -> Self {
        Self {
            order_number: row.order_number.trim().to_string(),
            technician_name: row.technician_name.clone().unwrap_or_default(),
            status: row.status.trim().to_string(),
            executed_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSelection {
    pub rows: Vec<PendingOrder>,
    pub unparseable: usize,
    pub missing: usize,
    /// Parsed rows at or before the watermark.
    pub not_newer: usize,
}

/// Select the rows that are new relative to `watermark`.
///
/// With no watermark every row is new. Otherwise only rows whose timestamp
/// parses and is strictly greater than the watermark are kept; rows that
/// fail to parse are dropped and counted.
pub fn select_new_rows(
    rows: &[OperationRow],
    watermark: Option<NaiveDateTime>,
    formats: &[String],
) -> SyncSelection {
    let mut selection = SyncSelection::default();

    for row in rows {
        let parsed = parse_timestamp(row.executed_at.as_deref(), formats);
        match parsed {
            TimestampParse::Missing => selection.missing += 1,
            TimestampParse::Unparseable => selection.unparseable += 1,
            TimestampParse::Parsed(_) => {}
        }

        let keep = match (watermark, parsed) {
            (None, _) => true,
            (Some(mark), TimestampParse::Parsed(ts)) => {
                if ts > mark {
                    true
                } else {
                    selection.not_newer += 1;
                    false
                }
            }
            (Some(_), _) => false,
        };
        if keep {
            selection.rows.push(PendingOrder::from_row(row, parsed.value()));
        }
    }
    selection
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Outcome of one sync run. Persisted to `sync_run` as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: RunId,
    pub started_at: NaiveDateTime,
    pub watermark: Option<NaiveDateTime>,
    pub rows_seen: usize,
    pub dropped_by_status: usize,
    pub inserted: usize,
    pub unparseable: usize,
    pub missing: usize,
    pub not_newer: usize,
}

pub struct SyncDriver<'a> {
    config: &'a KpiConfig,
}

impl<'a> SyncDriver<'a> {
    pub fn new(config: &'a KpiConfig) -> Self {
        Self { config }
    }

    /// Status gate, watermark read, selection, batched insert, run log.
    pub fn run(&self, store: &OrderStore, rows: &[OperationRow]) -> KpiResult<SyncReport> {
        let run_id: RunId = uuid::Uuid::new_v4().to_string();
        let now = chrono::Local::now().naive_local();
        let started_at = now.with_nanosecond(0).unwrap_or(now);

        let accepted: Vec<OperationRow> = rows
            .iter()
            .filter(|row| self.config.outcomes.accepts(&row.status))
            .cloned()
            .collect();
        let dropped_by_status = rows.len() - accepted.len();

        let watermark = store.latest_execution()?;
        match watermark {
            Some(mark) => log::info!("sync {run_id}: watermark {mark}"),
            None => log::info!("sync {run_id}: destination empty, every row is new"),
        }

        let selection = select_new_rows(&accepted, watermark, &self.config.timestamps.formats);
        if selection.unparseable > 0 {
            log::warn!(
                "sync {run_id}: {} row(s) with unparseable execution timestamps",
                selection.unparseable
            );
        }

        let inserted = if selection.rows.is_empty() {
            0
        } else {
            store.insert_orders(&run_id, &selection.rows, self.config.sync.batch_size)?
        };

        let report = SyncReport {
            run_id,
            started_at,
            watermark,
            rows_seen: rows.len(),
            dropped_by_status,
            inserted,
            unparseable: selection.unparseable,
            missing: selection.missing,
            not_newer: selection.not_newer,
        };
        store.insert_sync_run(&report)?;

        log::info!(
            "sync {}: inserted {} of {} row(s) ({} dropped by status, {} not newer)",
            report.run_id,
            report.inserted,
            report.rows_seen,
            report.dropped_by_status,
            report.not_newer
        );
        Ok(report)
    }
}
