//! Display-status derivation.
//!
//! A booking carries several independent raw signals: its own lifecycle
//! status, the approval decision, and the billing state of any invoices that
//! reference it. The UI shows exactly one status, derived here through an
//! ordered precedence list. First match wins; the order encodes product
//! decisions (billing readiness outranks approval, but never a terminal
//! status) and must not be rearranged.

use serde::{Deserialize, Serialize};

use crate::db::{DbBooking, DbInvoice};

/// The single human-facing booking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    PendingReview,
    Approved,
    InProduction,
    ReadyToLaunch,
    Delivered,
    Cancelled,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::InProduction => "in_production",
            Self::ReadyToLaunch => "ready_to_launch",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a stored status string. Used for raw statuses that already name
    /// a display status (the verbatim fallback rule) and for rollup rows.
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending_review" => Some(Self::PendingReview),
            "approved" => Some(Self::Approved),
            "in_production" => Some(Self::InProduction),
            "ready_to_launch" => Some(Self::ReadyToLaunch),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when any invoice referencing the booking has reached billing
/// readiness (issued or paid).
fn has_billable_invoice(booking_id: &str, invoices: &[DbInvoice]) -> bool {
    invoices
        .iter()
        .any(|inv| inv.booking_id == booking_id && matches!(inv.status.as_str(), "issued" | "paid"))
}

/// Derive the display status from the booking's raw signals plus its
/// invoices.
///
/// Evaluated in strict precedence order, first match wins. Rule 3 (billing
/// readiness) deliberately sits above rule 4 (approval) and below the
/// terminal statuses: an invoiced booking that is also completed resolves to
/// `delivered`, not `ready_to_launch`.
pub fn derive_display_status(booking: &DbBooking, invoices: &[DbInvoice]) -> DisplayStatus {
    if booking.status == "completed" {
        return DisplayStatus::Delivered;
    }
    if booking.status == "in_progress" {
        return DisplayStatus::InProduction;
    }
    if has_billable_invoice(&booking.id, invoices) {
        return DisplayStatus::ReadyToLaunch;
    }
    if booking.approval_status == "approved" || booking.status == "approved" {
        return DisplayStatus::Approved;
    }
    if booking.status == "declined" || booking.approval_status == "declined" {
        return DisplayStatus::Cancelled;
    }
    if matches!(booking.status.as_str(), "rescheduled" | "pending") {
        return DisplayStatus::PendingReview;
    }

    // Unmatched input: take the raw status verbatim when it names a display
    // status (covers `cancelled`), otherwise surface for review.
    DisplayStatus::from_str(&booking.status).unwrap_or(DisplayStatus::PendingReview)
}
