use chrono::NaiveDateTime;
use rusqlite::params;

use super::{OrderStore, StoredOrder};
use crate::{
    error::{KpiError, KpiResult},
    sync::PendingOrder,
    timestamp::{format_canonical, parse_canonical},
};

const TECHNICIAN_NAME_LIMIT: usize = 255;
const SHORT_TEXT_LIMIT: usize = 100;

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn read_timestamp(raw: Option<String>) -> KpiResult<Option<NaiveDateTime>> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_canonical(&raw).map(Some).ok_or_else(|| {
            KpiError::Other(anyhow::anyhow!("stored timestamp '{raw}' is not canonical"))
        }),
    }
}

impl OrderStore {
    // ── Service orders ─────────────────────────────────────────

    /// Latest persisted execution timestamp: the sync watermark.
    pub fn latest_execution(&self) -> KpiResult<Option<NaiveDateTime>> {
        let raw: Option<String> = self.conn.query_row(
            "SELECT MAX(executed_at) FROM service_order",
            [],
            |row| row.get(0),
        )?;
        read_timestamp(raw)
    }

    /// Insert `orders` in transactions of at most `batch_size` rows.
    /// Returns the number of rows written.
    pub fn insert_orders(
        &self,
        run_id: &str,
        orders: &[PendingOrder],
        batch_size: usize,
    ) -> KpiResult<usize> {
        let mut written = 0;
        for (batch_no, batch) in orders.chunks(batch_size.max(1)).enumerate() {
            let tx = self.conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO service_order
                     (order_number, technician_name, status, executed_at, sync_run_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for order in batch {
                    stmt.execute(params![
                        truncate(&order.order_number, SHORT_TEXT_LIMIT),
                        truncate(&order.technician_name, TECHNICIAN_NAME_LIMIT),
                        truncate(&order.status, SHORT_TEXT_LIMIT),
                        order.executed_at.as_ref().map(format_canonical),
                        run_id,
                    ])?;
                }
            }
            tx.commit()?;
            written += batch.len();
            log::debug!(
                "store: batch {} committed ({} row(s), {written} total)",
                batch_no + 1,
                batch.len()
            );
        }
        Ok(written)
    }

    pub fn order_count(&self) -> KpiResult<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM service_order", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn orders_for_run(&self, run_id: &str) -> KpiResult<Vec<StoredOrder>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, order_number, technician_name, status, executed_at, sync_run_id
             FROM service_order WHERE sync_run_id = ?1
             ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(
                |(id, order_number, technician_name, status, executed_at, sync_run_id)|
                 -> KpiResult<StoredOrder> {
                    Ok(StoredOrder {
                        id,
                        order_number,
                        technician_name,
                        status,
                        executed_at: read_timestamp(executed_at)?,
                        sync_run_id,
                    })
                },
            )
            .collect()
    }
}
