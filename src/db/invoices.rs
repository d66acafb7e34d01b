use rusqlite::params;

use super::*;

impl BookingDb {
    // =========================================================================
    // Invoices
    // =========================================================================

    /// Helper: map a row to `DbInvoice`.
    pub(crate) fn map_invoice_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbInvoice> {
        Ok(DbInvoice {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            status: row.get(2)?,
            amount: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    /// Insert or update an invoice mirrored from the platform store.
    pub fn upsert_invoice(&self, invoice: &DbInvoice) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO invoices (id, booking_id, status, amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                booking_id = excluded.booking_id,
                status = excluded.status,
                amount = excluded.amount",
            params![
                invoice.id,
                invoice.booking_id,
                invoice.status,
                invoice.amount,
                invoice.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get an invoice by ID.
    pub fn get_invoice(&self, id: &str) -> Result<Option<DbInvoice>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, booking_id, status, amount, created_at FROM invoices WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_invoice_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Invoices referencing a booking.
    pub fn get_invoices_for_booking(&self, booking_id: &str) -> Result<Vec<DbInvoice>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, booking_id, status, amount, created_at
             FROM invoices WHERE booking_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![booking_id], Self::map_invoice_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All invoices, oldest first. The dashboard fallback builds its
    /// per-booking index from this.
    pub fn get_all_invoices(&self) -> Result<Vec<DbInvoice>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, booking_id, status, amount, created_at FROM invoices ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], Self::map_invoice_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Collected revenue in the trailing window: sum of issued/paid invoice
    /// amounts. Shared by the fast and fallback summary paths.
    pub fn invoiced_revenue_since(&self, window_start: &str) -> Result<f64, DbError> {
        let total: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0)
             FROM invoices
             WHERE status IN ('issued', 'paid') AND created_at >= ?1",
            params![window_start],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Delete an invoice.
    pub fn delete_invoice(&self, id: &str) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM invoices WHERE id = ?1", params![id])?;
        Ok(())
    }
}
