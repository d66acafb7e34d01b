//! Insight heuristics: pure predicates over aggregate statistics that emit
//! ranked, prioritized suggestions for the dashboard.
//!
//! The engine holds no mutable state. Statistics are collected once per
//! request, the detector context is built per call and discarded afterwards
//! (the reset boundary is a single `run` invocation), and ranking is stable
//! so identical inputs always produce identical output order.

pub mod detectors;
pub mod engine;
pub mod stats;

pub use engine::{
    default_engine, DetectorContext, Priority, Suggestion, SuggestionEngine,
};
pub use stats::{collect_stats, AggregateStats, CategoryCount};

use chrono::{DateTime, Utc};

use crate::db::{BookingDb, DbError};

/// Collect statistics from the working store and run the default detector
/// registry over them.
pub fn generate_suggestions(
    db: &BookingDb,
    now: DateTime<Utc>,
) -> Result<Vec<Suggestion>, DbError> {
    let stats = collect_stats(db, now)?;
    let ctx = DetectorContext::new(now.date_naive());
    Ok(default_engine().run(&stats, &ctx))
}
