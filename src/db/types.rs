//! Shared type definitions for the working-store layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to working-store operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// A row from the `bookings` table.
///
/// `status` and `approval_status` hold the raw lowercase strings the platform
/// writes (`pending`, `approved`, `declined`, `in_progress`, `completed`,
/// `cancelled`, `on_hold`, `rescheduled`). The single human-facing status is
/// derived on read, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbBooking {
    pub id: String,
    pub client_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub status: String,
    pub approval_status: String,
    /// Canonical amount in currency units (normalized at ingestion).
    pub amount: f64,
    pub currency: String,
    /// Weighted milestone rollup, 0-100. Overwritten by the aggregator.
    pub project_progress: u8,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `milestones` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMilestone {
    pub id: String,
    pub booking_id: String,
    pub title: String,
    pub status: String,
    /// Relative weight within the booking. Positive; defaults to 1.
    pub weight: f64,
    /// Task rollup, 0-100. Overwritten by the aggregator.
    pub progress_percentage: u8,
    pub due_date: Option<String>,
    pub order_index: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `tasks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTask {
    pub id: String,
    pub milestone_id: String,
    pub title: String,
    pub status: String,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `invoices` table. Invoices reference a booking but are not
/// owned by it; billing lifecycle is managed upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbInvoice {
    pub id: String,
    pub booking_id: String,
    pub status: String,
    pub amount: f64,
    pub created_at: String,
}

/// A row from the `booking_rollups` materialized table (dashboard fast path).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRollup {
    pub booking_id: String,
    pub display_status: String,
    pub approval_status: String,
    pub amount: f64,
    /// Days from creation to completion; only set for delivered bookings.
    pub completion_days: Option<f64>,
    pub created_at: String,
    pub refreshed_at: String,
}
