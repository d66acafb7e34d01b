//! Change-event consumer: the realtime half of the per-booking pipeline.
//!
//! The platform store pushes `{entity, entity_id, change}` notifications
//! whenever a mirrored record changes. The consumer drains them from a tokio
//! channel and re-runs exactly the functions the on-demand path uses
//! (`progress::recompute_booking` plus a rollup refresh), so on-change and
//! on-demand results never diverge. Every recomputation reads fresh current
//! state; events may arrive out of order, and applying them as deltas would
//! drift.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::db::{BookingDb, DbError};
use crate::progress;

/// Channel buffer size for change notifications.
pub const CHANGE_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Booking,
    Milestone,
    Task,
    Invoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One change notification from the platform store's realtime feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub entity_id: String,
    pub change: ChangeKind,
}

/// Parse a realtime payload into a typed event.
pub fn parse_change_event(payload: &str) -> Result<ChangeEvent, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Resolve which booking an event touches.
///
/// Child deletes cannot be resolved: the row is already gone and the
/// payload carries no parent id. The store cascades child deletes from
/// booking deletes, and a milestone removed on its own is followed by a
/// booking-level update, so skipping here loses nothing.
fn resolve_booking_id(db: &BookingDb, event: &ChangeEvent) -> Result<Option<String>, DbError> {
    match event.entity {
        EntityKind::Booking => Ok(Some(event.entity_id.clone())),
        EntityKind::Milestone => Ok(db
            .get_milestone(&event.entity_id)?
            .map(|m| m.booking_id)),
        EntityKind::Task => {
            let Some(task) = db.get_task(&event.entity_id)? else {
                return Ok(None);
            };
            Ok(db.get_milestone(&task.milestone_id)?.map(|m| m.booking_id))
        }
        EntityKind::Invoice => Ok(db
            .get_invoice(&event.entity_id)?
            .map(|inv| inv.booking_id)),
    }
}

/// Apply one change event: recompute the affected booking's progress and
/// refresh its rollup row. Idempotent, so replaying stale events is safe.
pub fn apply_change(db: &BookingDb, event: &ChangeEvent) -> Result<(), DbError> {
    if event.entity == EntityKind::Booking && event.change == ChangeKind::Deleted {
        db.delete_rollup(&event.entity_id)?;
        return Ok(());
    }

    let Some(booking_id) = resolve_booking_id(db, event)? else {
        log::debug!(
            "Change event for {:?} {} resolves to no booking; skipping",
            event.entity,
            event.entity_id
        );
        return Ok(());
    };

    // Invoice changes only affect the derived status, not progress.
    if event.entity != EntityKind::Invoice {
        progress::recompute_booking(db, &booking_id)?;
    }
    db.refresh_rollup(&booking_id)?;
    Ok(())
}

/// Drain change notifications until the sender side closes.
///
/// Each event opens its own store handle on the blocking pool so no
/// connection is ever held across an await point. A failed recompute is
/// logged and the loop keeps draining; one bad record must not stall the
/// feed.
pub async fn run_change_consumer(db_path: PathBuf, mut rx: mpsc::Receiver<ChangeEvent>) {
    while let Some(event) = rx.recv().await {
        let path = db_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let db = BookingDb::open_at(path)?;
            apply_change(&db, &event)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Change event processing failed: {}", e),
            Err(e) => log::warn!("Change event task aborted: {}", e),
        }
    }
    log::info!("Change feed closed; consumer exiting");
}
