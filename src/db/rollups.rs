//! Materialized per-booking rollups for the dashboard fast path.
//!
//! Each row pre-bakes the derived display status (plus the fields the
//! summary aggregates over) so the dashboard can reduce with plain SQL
//! instead of re-deriving per booking. Rows are refreshed through
//! [`crate::status::derive_display_status`], the same function the
//! row-by-row fallback uses, so the two paths cannot diverge semantically,
//! only go stale, and staleness is detected by the summary reducer.

use chrono::Utc;
use rusqlite::params;

use super::*;
use crate::deadline;
use crate::status::{derive_display_status, DisplayStatus};

impl BookingDb {
    /// Days from creation to completion, for delivered bookings only.
    fn completion_days(booking: &DbBooking) -> Option<f64> {
        if booking.status != "completed" {
            return None;
        }
        let created = deadline::parse_timestamp(&booking.created_at)?;
        let updated = deadline::parse_timestamp(&booking.updated_at)?;
        let days = (updated - created).num_seconds() as f64 / 86_400.0;
        (days >= 0.0).then_some(days)
    }

    /// Refresh (or create) the rollup row for one booking.
    ///
    /// A missing booking drops the rollup row instead, so deletes flow through
    /// the same entry point as updates.
    pub fn refresh_rollup(&self, booking_id: &str) -> Result<Option<DisplayStatus>, DbError> {
        let Some(booking) = self.get_booking(booking_id)? else {
            self.delete_rollup(booking_id)?;
            return Ok(None);
        };

        let invoices = self.get_invoices_for_booking(booking_id)?;
        let display = derive_display_status(&booking, &invoices);

        self.conn.execute(
            "INSERT INTO booking_rollups (
                booking_id, display_status, approval_status, amount,
                completion_days, created_at, refreshed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(booking_id) DO UPDATE SET
                display_status = excluded.display_status,
                approval_status = excluded.approval_status,
                amount = excluded.amount,
                completion_days = excluded.completion_days,
                created_at = excluded.created_at,
                refreshed_at = excluded.refreshed_at",
            params![
                booking.id,
                display.as_str(),
                booking.approval_status,
                booking.amount,
                Self::completion_days(&booking),
                booking.created_at,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(Some(display))
    }

    /// Rebuild the whole rollup table from current bookings and invoices.
    /// Returns the number of live rows.
    pub fn refresh_all_rollups(&self) -> Result<usize, DbError> {
        let ids = self.get_booking_ids()?;
        self.with_transaction(|db| {
            db.conn.execute("DELETE FROM booking_rollups", [])?;
            for id in &ids {
                db.refresh_rollup(id)?;
            }
            Ok(())
        })?;
        Ok(ids.len())
    }

    /// Drop the rollup row for a deleted booking.
    pub fn delete_rollup(&self, booking_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM booking_rollups WHERE booking_id = ?1",
            params![booking_id],
        )?;
        Ok(())
    }

    /// Rollup rows covering the window, newest first, row-capped with the same
    /// bound the fallback applies to raw bookings.
    pub fn get_rollups_since(&self, window_start: &str, cap: usize) -> Result<Vec<DbRollup>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT booking_id, display_status, approval_status, amount,
                    completion_days, created_at, refreshed_at
             FROM booking_rollups
             WHERE created_at >= ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![window_start, cap as i64], |row| {
            Ok(DbRollup {
                booking_id: row.get(0)?,
                display_status: row.get(1)?,
                approval_status: row.get(2)?,
                amount: row.get(3)?,
                completion_days: row.get(4)?,
                created_at: row.get(5)?,
                refreshed_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// How many bookings in the window lack a rollup row. Non-zero means the
    /// materialized view is stale and the reducer must fall back.
    pub fn count_unrolled_bookings(&self, window_start: &str) -> Result<usize, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM bookings b
             WHERE b.created_at >= ?1
               AND NOT EXISTS (SELECT 1 FROM booking_rollups r WHERE r.booking_id = b.id)",
            params![window_start],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
