//! Aggregate statistics the detectors consume.
//!
//! Collected once per request from the working store; detectors never touch
//! the store themselves.

use chrono::{DateTime, Datelike, Duration, Utc};
use rusqlite::params;

use crate::db::{BookingDb, DbError};
use crate::deadline;

/// Bookings per service category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCount {
    pub category: String,
    pub count: u32,
}

/// Snapshot of the aggregate signals the detectors evaluate.
#[derive(Debug, Clone, Default)]
pub struct AggregateStats {
    /// Per-category booking counts, largest first.
    pub bookings_by_category: Vec<CategoryCount>,
    /// Days since the most recent booking was created, `None` for an empty
    /// store.
    pub days_since_last_booking: Option<i64>,
    /// Sum of issued/overdue invoice amounts awaiting payment.
    pub pending_revenue: f64,
    /// Sum of paid invoice amounts.
    pub paid_revenue: f64,
    /// Bookings created since the first of the current month.
    pub bookings_this_month: u32,
    /// Bookings created in the previous calendar month.
    pub bookings_last_month: u32,
}

impl AggregateStats {
    pub fn total_bookings(&self) -> u32 {
        self.bookings_by_category.iter().map(|c| c.count).sum()
    }
}

/// First day of the month containing `date`, midnight UTC, RFC 3339.
fn month_start(date: chrono::NaiveDate) -> String {
    let first = date.with_day(1).unwrap_or(date);
    format!("{}T00:00:00+00:00", first)
}

/// Assemble the detector input from the working store.
pub fn collect_stats(db: &BookingDb, now: DateTime<Utc>) -> Result<AggregateStats, DbError> {
    let conn = db.conn_ref();

    let mut by_category = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT service_id, COUNT(*) FROM bookings
             GROUP BY service_id ORDER BY COUNT(*) DESC, service_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CategoryCount {
                category: row.get(0)?,
                count: row.get::<_, i64>(1)? as u32,
            })
        })?;
        for row in rows {
            by_category.push(row?);
        }
    }

    let last_created: Option<String> =
        conn.query_row("SELECT MAX(created_at) FROM bookings", [], |row| row.get(0))?;
    let days_since_last_booking = last_created
        .as_deref()
        .and_then(deadline::parse_timestamp)
        .map(|last| (now - last).num_days());

    let pending_revenue: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM invoices WHERE status IN ('issued', 'overdue')",
        [],
        |row| row.get(0),
    )?;
    let paid_revenue: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM invoices WHERE status = 'paid'",
        [],
        |row| row.get(0),
    )?;

    let this_month_start = month_start(now.date_naive());
    let last_month_start = month_start(
        now.date_naive()
            .with_day(1)
            .map(|d| d - Duration::days(1))
            .unwrap_or_else(|| now.date_naive()),
    );

    let bookings_this_month: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE created_at >= ?1",
        params![this_month_start],
        |row| row.get(0),
    )?;
    let bookings_last_month: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE created_at >= ?1 AND created_at < ?2",
        params![last_month_start, this_month_start],
        |row| row.get(0),
    )?;

    Ok(AggregateStats {
        bookings_by_category: by_category,
        days_since_last_booking,
        pending_revenue,
        paid_revenue,
        bookings_this_month: bookings_this_month as u32,
        bookings_last_month: bookings_last_month as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    fn insert_booking(db: &BookingDb, id: &str, service_id: &str, created_at: &str) {
        db.conn_ref()
            .execute(
                "INSERT INTO bookings (id, client_id, provider_id, service_id, status,
                     approval_status, amount, currency, project_progress, created_at, updated_at)
                 VALUES (?1, 'cl', 'pr', ?2, 'pending', 'pending', 100, 'usd', 0, ?3, ?3)",
                params![id, service_id, created_at],
            )
            .unwrap();
    }

    #[test]
    fn empty_store_yields_default_stats() {
        let db = test_db();
        let stats = collect_stats(&db, Utc::now()).expect("stats");
        assert!(stats.bookings_by_category.is_empty());
        assert!(stats.days_since_last_booking.is_none());
        assert_eq!(stats.total_bookings(), 0);
    }

    #[test]
    fn categories_sorted_largest_first() {
        let db = test_db();
        insert_booking(&db, "bk-1", "svc-design", "2026-03-01T00:00:00Z");
        insert_booking(&db, "bk-2", "svc-design", "2026-03-02T00:00:00Z");
        insert_booking(&db, "bk-3", "svc-video", "2026-03-03T00:00:00Z");

        let now = DateTime::parse_from_rfc3339("2026-03-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let stats = collect_stats(&db, now).expect("stats");
        assert_eq!(stats.bookings_by_category[0].category, "svc-design");
        assert_eq!(stats.bookings_by_category[0].count, 2);
        assert_eq!(stats.days_since_last_booking, Some(7));
    }

    #[test]
    fn month_over_month_counts_split_on_calendar_months() {
        let db = test_db();
        insert_booking(&db, "bk-1", "svc", "2026-02-10T00:00:00Z");
        insert_booking(&db, "bk-2", "svc", "2026-02-20T00:00:00Z");
        insert_booking(&db, "bk-3", "svc", "2026-03-05T00:00:00Z");

        let now = DateTime::parse_from_rfc3339("2026-03-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let stats = collect_stats(&db, now).expect("stats");
        assert_eq!(stats.bookings_this_month, 1);
        assert_eq!(stats.bookings_last_month, 2);
    }

    #[test]
    fn revenue_splits_pending_and_paid() {
        let db = test_db();
        for (id, status, amount) in [
            ("inv-1", "issued", 300.0),
            ("inv-2", "overdue", 200.0),
            ("inv-3", "paid", 400.0),
            ("inv-4", "draft", 999.0),
        ] {
            db.conn_ref()
                .execute(
                    "INSERT INTO invoices (id, booking_id, status, amount, created_at)
                     VALUES (?1, 'bk-1', ?2, ?3, '2026-03-01T00:00:00Z')",
                    params![id, status, amount],
                )
                .unwrap();
        }

        let stats = collect_stats(&db, Utc::now()).expect("stats");
        assert_eq!(stats.pending_revenue, 500.0);
        assert_eq!(stats.paid_revenue, 400.0);
    }
}
