use chrono::Utc;
use rusqlite::params;

use super::*;

impl BookingDb {
    // =========================================================================
    // Bookings
    // =========================================================================

    /// Helper: map a row to `DbBooking`.
    pub(crate) fn map_booking_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbBooking> {
        Ok(DbBooking {
            id: row.get(0)?,
            client_id: row.get(1)?,
            provider_id: row.get(2)?,
            service_id: row.get(3)?,
            status: row.get(4)?,
            approval_status: row.get(5)?,
            amount: row.get(6)?,
            currency: row.get(7)?,
            project_progress: row.get::<_, i64>(8)?.clamp(0, 100) as u8,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    const BOOKING_COLUMNS: &'static str = "id, client_id, provider_id, service_id, status,
             approval_status, amount, currency, project_progress, created_at, updated_at";

    /// Insert or update a booking mirrored from the platform store.
    pub fn upsert_booking(&self, booking: &DbBooking) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO bookings (
                id, client_id, provider_id, service_id, status, approval_status,
                amount, currency, project_progress, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                provider_id = excluded.provider_id,
                service_id = excluded.service_id,
                status = excluded.status,
                approval_status = excluded.approval_status,
                amount = excluded.amount,
                currency = excluded.currency,
                updated_at = excluded.updated_at",
            params![
                booking.id,
                booking.client_id,
                booking.provider_id,
                booking.service_id,
                booking.status,
                booking.approval_status,
                booking.amount,
                booking.currency,
                booking.project_progress as i64,
                booking.created_at,
                booking.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a booking by ID.
    pub fn get_booking(&self, id: &str) -> Result<Option<DbBooking>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM bookings WHERE id = ?1",
            Self::BOOKING_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_booking_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All booking ids, for batch sweeps.
    pub fn get_booking_ids(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare("SELECT id FROM bookings ORDER BY created_at")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Bookings created within the trailing window, newest first, row-capped.
    /// This is the bounded batch the dashboard reducer consumes.
    pub fn get_bookings_since(
        &self,
        window_start: &str,
        cap: usize,
    ) -> Result<Vec<DbBooking>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM bookings
             WHERE created_at >= ?1
             ORDER BY created_at DESC
             LIMIT ?2",
            Self::BOOKING_COLUMNS
        ))?;
        let rows = stmt.query_map(params![window_start, cap as i64], Self::map_booking_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Write back a recomputed progress percentage, bumping `updated_at`.
    pub fn update_booking_progress(&self, id: &str, progress: u8) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE bookings SET project_progress = ?1, updated_at = ?2 WHERE id = ?3",
            params![progress as i64, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Delete a booking. Milestones and tasks cascade via foreign keys.
    pub fn delete_booking(&self, id: &str) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
        Ok(())
    }
}
