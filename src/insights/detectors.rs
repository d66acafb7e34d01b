//! Detector predicates for the suggestion engine.
//!
//! Each detector is a pure function over [`AggregateStats`]: no store
//! access, no clock reads beyond the context date, zero or more suggestions
//! out. Thresholds live here as consts so the registry stays data-free.

use chrono::Datelike;

use super::engine::{DetectorContext, Priority, Suggestion};
use super::stats::AggregateStats;

/// Days without a new booking before the retention nudge fires.
const INACTIVITY_THRESHOLD_DAYS: i64 = 30;

/// Pending revenue must exceed paid revenue by this factor to flag
/// collections lag.
const COLLECTION_LAG_RATIO: f64 = 1.5;

/// One category holding more than this share of bookings flags
/// concentration risk.
const CONCENTRATION_SHARE: f64 = 0.6;

/// Minimum bookings before category concentration is meaningful.
const CONCENTRATION_MIN_BOOKINGS: u32 = 5;

/// Day of month before which month-over-month comparisons stay quiet;
/// too little of the month has elapsed to call a trend.
const MOM_MIN_DAY_OF_MONTH: u32 = 7;

// ---------------------------------------------------------------------------
// Detector 1: Inactivity
// ---------------------------------------------------------------------------

/// No new booking in 30+ days → retention suggestion. Confidence tiers with
/// how long the silence has lasted.
pub fn detect_inactivity(stats: &AggregateStats, _ctx: &DetectorContext) -> Vec<Suggestion> {
    let Some(days) = stats.days_since_last_booking else {
        return Vec::new();
    };
    if days <= INACTIVITY_THRESHOLD_DAYS {
        return Vec::new();
    }

    let confidence = if days > 90 {
        0.9
    } else if days > 60 {
        0.8
    } else {
        0.7
    };

    vec![Suggestion {
        kind: "retention".to_string(),
        title: "Re-engage inactive clients".to_string(),
        description: format!(
            "No new booking in {} days. Consider a follow-up campaign or promotional offer to past clients.",
            days
        ),
        priority: Priority::High,
        confidence,
    }]
}

// ---------------------------------------------------------------------------
// Detector 2: Collection lag
// ---------------------------------------------------------------------------

/// Outstanding invoice value well above collected value → collections push.
pub fn detect_collection_lag(stats: &AggregateStats, _ctx: &DetectorContext) -> Vec<Suggestion> {
    if stats.pending_revenue <= 0.0 {
        return Vec::new();
    }
    if stats.paid_revenue > 0.0 && stats.pending_revenue <= stats.paid_revenue * COLLECTION_LAG_RATIO
    {
        return Vec::new();
    }

    vec![Suggestion {
        kind: "collections".to_string(),
        title: "Follow up on outstanding invoices".to_string(),
        description: format!(
            "{:.0} in invoices awaiting payment against {:.0} collected. Chasing the oldest first usually clears the backlog fastest.",
            stats.pending_revenue, stats.paid_revenue
        ),
        priority: Priority::High,
        confidence: 0.8,
    }]
}

// ---------------------------------------------------------------------------
// Detector 3: Category concentration
// ---------------------------------------------------------------------------

/// One service category dominating bookings → diversification suggestion.
pub fn detect_category_concentration(
    stats: &AggregateStats,
    _ctx: &DetectorContext,
) -> Vec<Suggestion> {
    let total = stats.total_bookings();
    if total < CONCENTRATION_MIN_BOOKINGS {
        return Vec::new();
    }
    let Some(top) = stats.bookings_by_category.first() else {
        return Vec::new();
    };

    let share = top.count as f64 / total as f64;
    if share <= CONCENTRATION_SHARE {
        return Vec::new();
    }

    vec![Suggestion {
        kind: "diversification".to_string(),
        title: "Bookings concentrated in one category".to_string(),
        description: format!(
            "{:.0}% of bookings are in {}. Broadening the service mix reduces exposure to a single demand stream.",
            share * 100.0,
            top.category
        ),
        priority: Priority::Medium,
        confidence: 0.7,
    }]
}

// ---------------------------------------------------------------------------
// Detector 4: Demand drop
// ---------------------------------------------------------------------------

/// This month trending under half of last month → demand suggestion. Quiet
/// during the first week of a month, when the comparison is mostly noise.
pub fn detect_demand_drop(stats: &AggregateStats, ctx: &DetectorContext) -> Vec<Suggestion> {
    if ctx.today.day() < MOM_MIN_DAY_OF_MONTH {
        return Vec::new();
    }
    if stats.bookings_last_month < 4 {
        return Vec::new();
    }
    if stats.bookings_this_month * 2 >= stats.bookings_last_month {
        return Vec::new();
    }

    vec![Suggestion {
        kind: "demand".to_string(),
        title: "Booking volume is dropping".to_string(),
        description: format!(
            "{} bookings so far this month against {} last month. Reviewing pricing or visibility may be worthwhile.",
            stats.bookings_this_month, stats.bookings_last_month
        ),
        priority: Priority::Medium,
        confidence: 0.75,
    }]
}

// ---------------------------------------------------------------------------
// Detector 5: Demand surge
// ---------------------------------------------------------------------------

/// This month at double last month with real volume → capacity heads-up.
pub fn detect_demand_surge(stats: &AggregateStats, _ctx: &DetectorContext) -> Vec<Suggestion> {
    if stats.bookings_this_month <= 5 {
        return Vec::new();
    }
    if stats.bookings_last_month > 0
        && stats.bookings_this_month < stats.bookings_last_month * 2
    {
        return Vec::new();
    }

    vec![Suggestion {
        kind: "capacity".to_string(),
        title: "Booking volume is surging".to_string(),
        description: format!(
            "{} bookings this month against {} last month. Check milestone capacity before accepting more work.",
            stats.bookings_this_month, stats.bookings_last_month
        ),
        priority: Priority::Low,
        confidence: 0.6,
    }]
}
