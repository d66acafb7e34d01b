//! Ingestion-time normalization of upstream payloads.
//!
//! The platform store has accumulated several historical field shapes; the
//! booking amount alone has lived in `amount`, `amount_cents`, and
//! `total_amount`. Coalescing happens exactly once, here, into one canonical
//! record shape; compute modules never reach for alternate field names.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{DbBooking, DbInvoice, DbMilestone, DbTask};

/// A booking payload as the store sends it, historical shapes included.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBooking {
    pub id: Option<String>,
    pub client_id: Option<String>,
    pub provider_id: Option<String>,
    pub service_id: Option<String>,
    pub status: Option<String>,
    pub approval_status: Option<String>,
    pub amount: Option<f64>,
    pub amount_cents: Option<i64>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMilestone {
    pub id: Option<String>,
    pub booking_id: String,
    pub title: Option<String>,
    pub status: Option<String>,
    pub weight: Option<f64>,
    pub progress_percentage: Option<f64>,
    pub due_date: Option<String>,
    pub order_index: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTask {
    pub id: Option<String>,
    pub milestone_id: String,
    pub title: Option<String>,
    pub status: Option<String>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub due_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInvoice {
    pub id: Option<String>,
    pub booking_id: String,
    pub status: Option<String>,
    pub amount: Option<f64>,
    pub amount_cents: Option<i64>,
    pub created_at: Option<String>,
}

/// Coalesce the historical amount shapes into currency units. Non-finite
/// and negative values collapse to zero, logged.
fn canonical_amount(
    amount: Option<f64>,
    amount_cents: Option<i64>,
    total_amount: Option<f64>,
    record_id: &str,
) -> f64 {
    let raw = amount
        .or_else(|| amount_cents.map(|cents| cents as f64 / 100.0))
        .or(total_amount)
        .unwrap_or(0.0);
    if raw.is_finite() && raw >= 0.0 {
        raw
    } else {
        log::warn!("Record {} has malformed amount {}; defaulting to 0", record_id, raw);
        0.0
    }
}

fn fresh_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

fn or_now(value: Option<String>, now: DateTime<Utc>) -> String {
    value.unwrap_or_else(|| now.to_rfc3339())
}

/// Normalize a booking payload into the canonical row shape.
pub fn normalize_booking(raw: RawBooking, now: DateTime<Utc>) -> DbBooking {
    let id = raw.id.unwrap_or_else(|| fresh_id("bk"));
    let amount = canonical_amount(raw.amount, raw.amount_cents, raw.total_amount, &id);
    DbBooking {
        client_id: raw.client_id.unwrap_or_default(),
        provider_id: raw.provider_id.unwrap_or_default(),
        service_id: raw.service_id.unwrap_or_default(),
        status: raw.status.unwrap_or_else(|| "pending".to_string()),
        approval_status: raw.approval_status.unwrap_or_else(|| "pending".to_string()),
        amount,
        currency: raw.currency.unwrap_or_else(|| "usd".to_string()),
        project_progress: 0,
        created_at: or_now(raw.created_at, now),
        updated_at: or_now(raw.updated_at, now),
        id,
    }
}

/// Normalize a milestone payload. Malformed weights are clamped to the
/// default of 1; percentages are clamped into 0-100.
pub fn normalize_milestone(raw: RawMilestone, now: DateTime<Utc>) -> DbMilestone {
    let id = raw.id.unwrap_or_else(|| fresh_id("ms"));
    let weight = match raw.weight {
        Some(w) if w.is_finite() && w > 0.0 => w,
        Some(w) => {
            log::warn!("Milestone {} has malformed weight {}; defaulting to 1", id, w);
            1.0
        }
        None => 1.0,
    };
    let progress = raw
        .progress_percentage
        .filter(|p| p.is_finite())
        .map(|p| p.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0);
    DbMilestone {
        booking_id: raw.booking_id,
        title: raw.title.unwrap_or_default(),
        status: raw.status.unwrap_or_else(|| "pending".to_string()),
        weight,
        progress_percentage: progress,
        due_date: raw.due_date,
        order_index: raw.order_index.unwrap_or(0),
        created_at: or_now(raw.created_at, now),
        updated_at: or_now(raw.updated_at, now),
        id,
    }
}

/// Normalize a task payload.
pub fn normalize_task(raw: RawTask, now: DateTime<Utc>) -> DbTask {
    DbTask {
        id: raw.id.unwrap_or_else(|| fresh_id("tk")),
        milestone_id: raw.milestone_id,
        title: raw.title.unwrap_or_default(),
        status: raw.status.unwrap_or_else(|| "pending".to_string()),
        estimated_hours: raw.estimated_hours.filter(|h| h.is_finite() && *h >= 0.0),
        actual_hours: raw.actual_hours.filter(|h| h.is_finite() && *h >= 0.0),
        due_date: raw.due_date,
        created_at: or_now(raw.created_at, now),
        updated_at: or_now(raw.updated_at, now),
    }
}

/// Normalize an invoice payload.
pub fn normalize_invoice(raw: RawInvoice, now: DateTime<Utc>) -> DbInvoice {
    let id = raw.id.unwrap_or_else(|| fresh_id("inv"));
    let amount = canonical_amount(raw.amount, raw.amount_cents, None, &id);
    DbInvoice {
        booking_id: raw.booking_id,
        status: raw.status.unwrap_or_else(|| "draft".to_string()),
        amount,
        created_at: or_now(raw.created_at, now),
        id,
    }
}
