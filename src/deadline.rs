//! Overdue detection and completion-date estimation.
//!
//! Due dates arrive either as full RFC 3339 timestamps or as bare
//! `YYYY-MM-DD` dates; a bare date counts as due at the end of that day.
//! The completion estimate is a point estimate recomputed fresh on every
//! call, with no persisted state and no confidence interval.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::db::{BookingDb, DbError, DbMilestone, DbTask};

/// Assumed milestone duration when no completed milestone exists yet.
pub const DEFAULT_MILESTONE_DURATION_DAYS: i64 = 7;

/// Parse a stored timestamp: RFC 3339 first, then the space-separated form
/// some upstream exports use, then a bare date (interpreted as midnight UTC).
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// A bare due date means "due by end of that day"; a timestamp is exact.
fn parse_due_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(23, 59, 59)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }
    parse_timestamp(value)
}

/// True iff a due date is set, parses, lies strictly before `now`, and the
/// item is not completed. Identical logic for milestones and tasks.
pub fn is_overdue(due_date: Option<&str>, status: &str, now: DateTime<Utc>) -> bool {
    if status == "completed" {
        return false;
    }
    match due_date.and_then(parse_due_date) {
        Some(due) => due < now,
        None => false,
    }
}

pub fn milestone_is_overdue(milestone: &DbMilestone, now: DateTime<Utc>) -> bool {
    is_overdue(milestone.due_date.as_deref(), &milestone.status, now)
}

pub fn task_is_overdue(task: &DbTask, now: DateTime<Utc>) -> bool {
    is_overdue(task.due_date.as_deref(), &task.status, now)
}

/// Estimate when the remaining milestones will be done.
///
/// `None` when every milestone is already completed (or there are none).
/// Otherwise: mean historical duration (`updated_at - created_at` over
/// completed milestones, discarding non-positive samples, defaulting to
/// [`DEFAULT_MILESTONE_DURATION_DAYS`] when none exist) multiplied by the
/// count of incomplete milestones, added to `now`.
pub fn estimate_completion(
    milestones: &[DbMilestone],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let incomplete = milestones
        .iter()
        .filter(|m| m.status != "completed")
        .count() as i64;
    if incomplete == 0 {
        return None;
    }

    let durations: Vec<i64> = milestones
        .iter()
        .filter(|m| m.status == "completed")
        .filter_map(|m| {
            let created = parse_timestamp(&m.created_at)?;
            let updated = parse_timestamp(&m.updated_at)?;
            let secs = (updated - created).num_seconds();
            (secs > 0).then_some(secs)
        })
        .collect();

    let avg_secs = if durations.is_empty() {
        Duration::days(DEFAULT_MILESTONE_DURATION_DAYS).num_seconds()
    } else {
        durations.iter().sum::<i64>() / durations.len() as i64
    };

    Some(now + Duration::seconds(avg_secs * incomplete))
}

/// The overdue milestones of a booking, for notification callers.
pub fn overdue_milestones(
    db: &BookingDb,
    booking_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<DbMilestone>, DbError> {
    let milestones = db.get_milestones_for_booking(booking_id)?;
    Ok(milestones
        .into_iter()
        .filter(|m| milestone_is_overdue(m, now))
        .collect())
}
