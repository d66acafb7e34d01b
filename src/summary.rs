//! Dashboard KPI reduction over a bounded batch of bookings and invoices.
//!
//! Two strategies coexist:
//! - `summarize_rows` recomputes every metric from raw records through the
//!   status deriver. It is the correctness reference.
//! - `summarize_rollups` aggregates the materialized `booking_rollups` table
//!   with plain SQL. The reducer uses it only when the rollups cover every
//!   booking in the window; otherwise it falls back to the reference path.
//!
//! The async entry point wraps the whole fetch in a hard wall-clock budget.
//! On expiry, or any store error, the caller gets the zero-filled summary
//! with success semantics, never an error or a different shape. Retry policy
//! belongs to the caller's next refresh cycle, not here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{BookingDb, DbError};
use crate::deadline;
use crate::status::{derive_display_status, DisplayStatus};

/// Trailing window the dashboard reduces over.
pub const SUMMARY_WINDOW_DAYS: i64 = 180;

/// Row cap applied to the windowed booking batch on both paths.
pub const SUMMARY_ROW_CAP: usize = 500;

/// Hard wall-clock budget for the whole summary fetch.
pub const SUMMARY_TIMEOUT: Duration = Duration::from_secs(10);

/// Dashboard KPI summary. Field names are what the UI binds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total: u32,
    pub completed: u32,
    pub in_progress: u32,
    pub approved: u32,
    pub pending: u32,
    pub ready_to_launch: u32,
    pub total_revenue: f64,
    pub projected_billings: f64,
    pub pending_approval: u32,
    /// Mean days from creation to delivery, 0 when nothing delivered yet.
    pub avg_completion_time: f64,
}

impl DashboardSummary {
    /// The canonical empty-but-valid response used when the real aggregate
    /// cannot be computed in time.
    pub fn zeroed() -> Self {
        Self {
            total: 0,
            completed: 0,
            in_progress: 0,
            approved: 0,
            pending: 0,
            ready_to_launch: 0,
            total_revenue: 0.0,
            projected_billings: 0.0,
            pending_approval: 0,
            avg_completion_time: 0.0,
        }
    }

    fn tally(&mut self, display: DisplayStatus, amount: f64) {
        self.total += 1;
        match display {
            DisplayStatus::Delivered => self.completed += 1,
            DisplayStatus::InProduction => self.in_progress += 1,
            DisplayStatus::Approved => self.approved += 1,
            DisplayStatus::PendingReview => self.pending += 1,
            DisplayStatus::ReadyToLaunch => self.ready_to_launch += 1,
            DisplayStatus::Cancelled => {}
        }
        if matches!(
            display,
            DisplayStatus::ReadyToLaunch | DisplayStatus::InProduction
        ) {
            self.projected_billings += amount;
        }
    }
}

fn window_start(now: chrono::DateTime<Utc>) -> String {
    (now - chrono::Duration::days(SUMMARY_WINDOW_DAYS)).to_rfc3339()
}

/// Row-by-row reference path: derive every booking's status from raw records
/// and aggregate. A malformed row is skipped and logged, never aborts the
/// batch.
pub fn summarize_rows(db: &BookingDb) -> Result<DashboardSummary, DbError> {
    let start = window_start(Utc::now());
    let bookings = db.get_bookings_since(&start, SUMMARY_ROW_CAP)?;

    let mut by_booking: HashMap<String, Vec<crate::db::DbInvoice>> = HashMap::new();
    for invoice in db.get_all_invoices()? {
        by_booking
            .entry(invoice.booking_id.clone())
            .or_default()
            .push(invoice);
    }

    let mut summary = DashboardSummary::zeroed();
    let mut completion_days: Vec<f64> = Vec::new();

    for booking in &bookings {
        let invoices = by_booking.get(&booking.id).map(Vec::as_slice).unwrap_or(&[]);
        let display = derive_display_status(booking, invoices);
        summary.tally(display, booking.amount);
        if booking.approval_status == "pending" {
            summary.pending_approval += 1;
        }

        if display == DisplayStatus::Delivered {
            match booking_completion_days(booking) {
                Some(days) => completion_days.push(days),
                None => log::warn!(
                    "Skipping unparseable timestamps on booking {} for avg completion time",
                    booking.id
                ),
            }
        }
    }

    if !completion_days.is_empty() {
        summary.avg_completion_time =
            completion_days.iter().sum::<f64>() / completion_days.len() as f64;
    }
    summary.total_revenue = db.invoiced_revenue_since(&start)?;

    Ok(summary)
}

fn booking_completion_days(booking: &crate::db::DbBooking) -> Option<f64> {
    let created = deadline::parse_timestamp(&booking.created_at)?;
    let updated = deadline::parse_timestamp(&booking.updated_at)?;
    let days = (updated - created).num_seconds() as f64 / 86_400.0;
    (days >= 0.0).then_some(days)
}

/// Fast path: aggregate the materialized rollup rows.
pub fn summarize_rollups(db: &BookingDb) -> Result<DashboardSummary, DbError> {
    let start = window_start(Utc::now());
    let rollups = db.get_rollups_since(&start, SUMMARY_ROW_CAP)?;

    let mut summary = DashboardSummary::zeroed();
    let mut completion_days: Vec<f64> = Vec::new();

    for rollup in &rollups {
        let Some(display) = DisplayStatus::from_str(&rollup.display_status) else {
            log::warn!(
                "Rollup row {} carries unknown display status {:?}; skipping",
                rollup.booking_id,
                rollup.display_status
            );
            continue;
        };
        summary.tally(display, rollup.amount);
        if let Some(days) = rollup.completion_days {
            completion_days.push(days);
        }
        if rollup.approval_status == "pending" {
            summary.pending_approval += 1;
        }
    }

    if !completion_days.is_empty() {
        summary.avg_completion_time =
            completion_days.iter().sum::<f64>() / completion_days.len() as f64;
    }
    summary.total_revenue = db.invoiced_revenue_since(&start)?;

    Ok(summary)
}

/// Reduce the dashboard window, preferring the materialized fast path when it
/// covers every booking in the window.
pub fn summarize(db: &BookingDb) -> Result<DashboardSummary, DbError> {
    let start = window_start(Utc::now());
    if db.count_unrolled_bookings(&start)? == 0 {
        summarize_rollups(db)
    } else {
        log::debug!("Rollups stale for current window; using row-by-row fallback");
        summarize_rows(db)
    }
}

/// Async entry point: run `fetch` on the blocking pool under a wall-clock
/// budget. Expiry, panic, and store errors all collapse to the zero-filled
/// summary, so callers always get the same shape back.
pub async fn load_summary_with<F>(budget: Duration, fetch: F) -> DashboardSummary
where
    F: FnOnce() -> Result<DashboardSummary, DbError> + Send + 'static,
{
    match tokio::time::timeout(budget, tokio::task::spawn_blocking(fetch)).await {
        Ok(Ok(Ok(summary))) => summary,
        Ok(Ok(Err(e))) => {
            log::warn!("Dashboard summary fetch failed: {}; serving zero-filled summary", e);
            DashboardSummary::zeroed()
        }
        Ok(Err(e)) => {
            log::warn!("Dashboard summary task aborted: {}; serving zero-filled summary", e);
            DashboardSummary::zeroed()
        }
        Err(_) => {
            log::warn!(
                "Dashboard summary exceeded {:?} budget; serving zero-filled summary",
                budget
            );
            DashboardSummary::zeroed()
        }
    }
}

/// Load the dashboard summary from the store at `db_path`, under the default
/// budget. Opens its own read handle on the blocking pool; connections are
/// never held across await points.
pub async fn load_dashboard_summary(db_path: PathBuf) -> DashboardSummary {
    load_summary_with(SUMMARY_TIMEOUT, move || {
        let db = BookingDb::open_at(db_path)?;
        summarize(&db)
    })
    .await
}
