use rusqlite::params;

use super::OrderStore;
use crate::{
    error::{KpiError, KpiResult},
    sync::SyncReport,
    timestamp::{format_canonical, parse_canonical},
};

impl OrderStore {
    // ── Sync runs ──────────────────────────────────────────────

    pub fn insert_sync_run(&self, report: &SyncReport) -> KpiResult<()> {
        self.conn.execute(
            "INSERT INTO sync_run
             (run_id, started_at, watermark, rows_seen, dropped_by_status,
              inserted, unparseable, missing, not_newer)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                report.run_id,
                format_canonical(&report.started_at),
                report.watermark.as_ref().map(format_canonical),
                report.rows_seen as i64,
                report.dropped_by_status as i64,
                report.inserted as i64,
                report.unparseable as i64,
                report.missing as i64,
                report.not_newer as i64,
            ],
        )?;
        Ok(())
    }

    /// Every recorded run, oldest first.
    pub fn sync_runs(&self) -> KpiResult<Vec<SyncReport>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, started_at, watermark, rows_seen, dropped_by_status,
                    inserted, unparseable, missing, not_newer
             FROM sync_run ORDER BY started_at ASC, rowid ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    [
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                    ],
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(run_id, started_at, watermark, counts)| -> KpiResult<SyncReport> {
                let started_at = parse_canonical(&started_at).ok_or_else(|| {
                    KpiError::Other(anyhow::anyhow!(
                        "sync run {run_id} has malformed started_at '{started_at}'"
                    ))
                })?;
                let watermark = watermark.as_deref().and_then(parse_canonical);
                let [rows_seen, dropped_by_status, inserted, unparseable, missing, not_newer] =
                    counts.map(|c| c.max(0) as usize);
                Ok(SyncReport {
                    run_id,
                    started_at,
                    watermark,
                    rows_seen,
                    dropped_by_status,
                    inserted,
                    unparseable,
                    missing,
                    not_newer,
                })
            })
            .collect()
    }
}
