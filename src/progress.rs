//! Progress aggregation: task completion → milestone percentage → weighted
//! booking percentage.
//!
//! The compute functions are pure and always work from the current child
//! state passed in; stale cached percentages are never trusted. The
//! `recompute_*` entry points read fresh rows from the working store and
//! persist every changed percentage with `updated_at` bumped, so stored
//! values match what an on-demand recomputation would produce.

use crate::db::{BookingDb, DbError, DbMilestone, DbTask};

/// Floor applied to malformed (zero, negative, non-finite) milestone weights.
/// Keeps the weighted mean defined without letting a bad row dominate it.
pub const MIN_WEIGHT: f64 = 0.01;

/// Percentage of completed tasks, rounded half-up. 0 for an empty list.
pub fn compute_milestone_progress(tasks: &[DbTask]) -> u8 {
    if tasks.is_empty() {
        return 0;
    }
    let completed = tasks.iter().filter(|t| t.status == "completed").count();
    let pct = (completed as f64 * 100.0 / tasks.len() as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

fn effective_weight(milestone: &DbMilestone) -> f64 {
    if milestone.weight.is_finite() && milestone.weight > 0.0 {
        milestone.weight
    } else {
        log::warn!(
            "Milestone {} has malformed weight {}; clamping to {}",
            milestone.id,
            milestone.weight,
            MIN_WEIGHT
        );
        MIN_WEIGHT
    }
}

/// Weighted average of milestone percentages, rounded. 0 for an empty list.
///
/// Weights are clamped through [`MIN_WEIGHT`], so the total weight is
/// strictly positive whenever the list is non-empty and the division can
/// never produce NaN.
pub fn compute_booking_progress(milestones: &[DbMilestone]) -> u8 {
    if milestones.is_empty() {
        return 0;
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for milestone in milestones {
        let weight = effective_weight(milestone);
        weighted_sum += milestone.progress_percentage as f64 * weight;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return 0;
    }
    (weighted_sum / total_weight).round().clamp(0.0, 100.0) as u8
}

/// What a per-booking recomputation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeOutcome {
    pub booking_progress: u8,
    pub milestones_updated: usize,
    pub booking_updated: bool,
}

/// Recompute one booking's milestone and booking percentages from fresh child
/// state and write back whatever changed.
///
/// Returns `None` when the booking does not exist (the change feed can
/// outrun deletes). Idempotent: a second run over unchanged children writes
/// nothing.
pub fn recompute_booking(
    db: &BookingDb,
    booking_id: &str,
) -> Result<Option<RecomputeOutcome>, DbError> {
    let Some(booking) = db.get_booking(booking_id)? else {
        return Ok(None);
    };

    let mut milestones = db.get_milestones_for_booking(booking_id)?;
    let mut milestones_updated = 0usize;

    for milestone in &mut milestones {
        let tasks = db.get_tasks_for_milestone(&milestone.id)?;
        let pct = compute_milestone_progress(&tasks);
        if pct != milestone.progress_percentage {
            db.update_milestone_progress(&milestone.id, pct)?;
            milestones_updated += 1;
        }
        milestone.progress_percentage = pct;
    }

    let booking_progress = compute_booking_progress(&milestones);
    let booking_updated = booking_progress != booking.project_progress;
    if booking_updated {
        db.update_booking_progress(booking_id, booking_progress)?;
    }

    Ok(Some(RecomputeOutcome {
        booking_progress,
        milestones_updated,
        booking_updated,
    }))
}

/// What a full-store sweep touched and what it had to step around.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub bookings_seen: usize,
    pub bookings_updated: usize,
    pub failures: usize,
    /// Milestones pointing at a booking that no longer exists. Skipped and
    /// counted so batch totals are not silently undercounted.
    pub orphans_skipped: usize,
}

/// Recompute every booking in the store. One bad record never aborts the
/// sweep; failures are logged and counted.
pub fn recompute_all(db: &BookingDb) -> Result<SweepOutcome, DbError> {
    let mut outcome = SweepOutcome {
        orphans_skipped: db.count_orphan_milestones()?,
        ..SweepOutcome::default()
    };
    if outcome.orphans_skipped > 0 {
        log::warn!(
            "Progress sweep skipping {} orphaned milestone(s)",
            outcome.orphans_skipped
        );
    }

    for booking_id in db.get_booking_ids()? {
        outcome.bookings_seen += 1;
        match recompute_booking(db, &booking_id) {
            Ok(Some(r)) if r.booking_updated || r.milestones_updated > 0 => {
                outcome.bookings_updated += 1;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Progress recompute failed for booking {}: {}", booking_id, e);
                outcome.failures += 1;
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use chrono::Utc;

    fn task(id: &str, milestone_id: &str, status: &str) -> DbTask {
        let now = Utc::now().to_rfc3339();
        DbTask {
            id: id.to_string(),
            milestone_id: milestone_id.to_string(),
            title: "Task".to_string(),
            status: status.to_string(),
            estimated_hours: None,
            actual_hours: None,
            due_date: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn milestone(id: &str, pct: u8, weight: f64) -> DbMilestone {
        let now = Utc::now().to_rfc3339();
        DbMilestone {
            id: id.to_string(),
            booking_id: "bk-1".to_string(),
            title: "Phase".to_string(),
            status: "in_progress".to_string(),
            weight,
            progress_percentage: pct,
            due_date: None,
            order_index: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn empty_task_list_is_zero() {
        assert_eq!(compute_milestone_progress(&[]), 0);
    }

    #[test]
    fn milestone_progress_rounds_half_up() {
        // 1 of 3 completed = 33.33 → 33; 2 of 3 = 66.67 → 67.
        let tasks = vec![
            task("t1", "m1", "completed"),
            task("t2", "m1", "pending"),
            task("t3", "m1", "in_progress"),
        ];
        assert_eq!(compute_milestone_progress(&tasks), 33);

        let tasks = vec![
            task("t1", "m1", "completed"),
            task("t2", "m1", "completed"),
            task("t3", "m1", "pending"),
        ];
        assert_eq!(compute_milestone_progress(&tasks), 67);

        // 1 of 8 = 12.5 rounds half-up to 13.
        let mut tasks = vec![task("t1", "m1", "completed")];
        for i in 2..=8 {
            tasks.push(task(&format!("t{}", i), "m1", "pending"));
        }
        assert_eq!(compute_milestone_progress(&tasks), 13);
    }

    #[test]
    fn all_completed_is_hundred() {
        let tasks = vec![task("t1", "m1", "completed"), task("t2", "m1", "completed")];
        assert_eq!(compute_milestone_progress(&tasks), 100);
    }

    #[test]
    fn booking_progress_weights_milestones() {
        // 100% at weight 3, 0% at weight 1 → 75%.
        let milestones = vec![milestone("m1", 100, 3.0), milestone("m2", 0, 1.0)];
        assert_eq!(compute_booking_progress(&milestones), 75);
    }

    #[test]
    fn empty_milestone_list_is_zero() {
        assert_eq!(compute_booking_progress(&[]), 0);
    }

    #[test]
    fn zero_and_negative_weights_never_divide_by_zero() {
        let milestones = vec![milestone("m1", 80, 0.0), milestone("m2", 40, -2.0)];
        // Both clamp to the same floor, so this is a plain average.
        assert_eq!(compute_booking_progress(&milestones), 60);
    }

    #[test]
    fn nan_weight_is_clamped() {
        let milestones = vec![milestone("m1", 50, f64::NAN)];
        assert_eq!(compute_booking_progress(&milestones), 50);
    }

    #[test]
    fn progress_stays_in_range_for_weight_extremes() {
        let milestones = vec![
            milestone("m1", 100, f64::MAX / 4.0),
            milestone("m2", 100, f64::MAX / 4.0),
        ];
        let pct = compute_booking_progress(&milestones);
        assert!(pct <= 100);
    }

    #[test]
    fn recompute_persists_and_is_idempotent() {
        let db = test_db();
        let now = Utc::now().to_rfc3339();
        db.conn_ref()
            .execute(
                "INSERT INTO bookings (id, client_id, provider_id, service_id, status,
                     approval_status, amount, currency, project_progress, created_at, updated_at)
                 VALUES ('bk-1', 'cl', 'pr', 'svc', 'in_progress', 'approved', 100, 'usd', 0, ?1, ?1)",
                [&now],
            )
            .unwrap();
        let mut m1 = milestone("m1", 0, 1.0);
        m1.booking_id = "bk-1".to_string();
        let mut m2 = milestone("m2", 0, 3.0);
        m2.booking_id = "bk-1".to_string();
        db.upsert_milestone(&m1).unwrap();
        db.upsert_milestone(&m2).unwrap();
        db.upsert_task(&task("t1", "m1", "completed")).unwrap();
        db.upsert_task(&task("t2", "m1", "completed")).unwrap();
        db.upsert_task(&task("t3", "m2", "completed")).unwrap();
        db.upsert_task(&task("t4", "m2", "pending")).unwrap();

        let outcome = recompute_booking(&db, "bk-1").expect("recompute").expect("exists");
        // m1 = 100%, m2 = 50%; weighted: (100*1 + 50*3)/4 = 62.5 → 63.
        assert_eq!(outcome.booking_progress, 63);
        assert_eq!(outcome.milestones_updated, 2);
        assert!(outcome.booking_updated);

        let stored = db.get_booking("bk-1").unwrap().unwrap();
        assert_eq!(stored.project_progress, 63);
        let stored_m2 = db.get_milestone("m2").unwrap().unwrap();
        assert_eq!(stored_m2.progress_percentage, 50);

        // Second run over unchanged children writes nothing.
        let again = recompute_booking(&db, "bk-1").expect("recompute").expect("exists");
        assert_eq!(again.booking_progress, 63);
        assert_eq!(again.milestones_updated, 0);
        assert!(!again.booking_updated);
    }

    #[test]
    fn recompute_missing_booking_is_none() {
        let db = test_db();
        assert!(recompute_booking(&db, "bk-nope").expect("recompute").is_none());
    }

    #[test]
    fn sweep_counts_orphans_and_keeps_going() {
        let db = test_db();
        let now = Utc::now().to_rfc3339();
        db.conn_ref()
            .execute(
                "INSERT INTO bookings (id, client_id, provider_id, service_id, status,
                     approval_status, amount, currency, project_progress, created_at, updated_at)
                 VALUES ('bk-1', 'cl', 'pr', 'svc', 'pending', 'pending', 100, 'usd', 0, ?1, ?1)",
                [&now],
            )
            .unwrap();
        // Orphan: points at a booking that was deleted upstream.
        db.upsert_milestone(&milestone("m-orphan", 0, 1.0)).unwrap();
        db.conn_ref()
            .execute(
                "UPDATE milestones SET booking_id = 'bk-gone' WHERE id = 'm-orphan'",
                [],
            )
            .unwrap();

        let outcome = recompute_all(&db).expect("sweep");
        assert_eq!(outcome.bookings_seen, 1);
        assert_eq!(outcome.orphans_skipped, 1);
        assert_eq!(outcome.failures, 0);
    }
}
