use chrono::Utc;
use rusqlite::params;

use super::*;

impl BookingDb {
    // =========================================================================
    // Milestones
    // =========================================================================

    /// Helper: map a row to `DbMilestone`.
    pub(crate) fn map_milestone_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbMilestone> {
        Ok(DbMilestone {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            title: row.get(2)?,
            status: row.get(3)?,
            weight: row.get(4)?,
            progress_percentage: row.get::<_, i64>(5)?.clamp(0, 100) as u8,
            due_date: row.get(6)?,
            order_index: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    const MILESTONE_COLUMNS: &'static str = "id, booking_id, title, status, weight,
             progress_percentage, due_date, order_index, created_at, updated_at";

    /// Insert or update a milestone mirrored from the platform store.
    pub fn upsert_milestone(&self, milestone: &DbMilestone) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO milestones (
                id, booking_id, title, status, weight, progress_percentage,
                due_date, order_index, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                booking_id = excluded.booking_id,
                title = excluded.title,
                status = excluded.status,
                weight = excluded.weight,
                due_date = excluded.due_date,
                order_index = excluded.order_index,
                updated_at = excluded.updated_at",
            params![
                milestone.id,
                milestone.booking_id,
                milestone.title,
                milestone.status,
                milestone.weight,
                milestone.progress_percentage as i64,
                milestone.due_date,
                milestone.order_index,
                milestone.created_at,
                milestone.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a milestone by ID.
    pub fn get_milestone(&self, id: &str) -> Result<Option<DbMilestone>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM milestones WHERE id = ?1",
            Self::MILESTONE_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_milestone_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Milestones of a booking in display order.
    pub fn get_milestones_for_booking(
        &self,
        booking_id: &str,
    ) -> Result<Vec<DbMilestone>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM milestones WHERE booking_id = ?1 ORDER BY order_index, created_at",
            Self::MILESTONE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![booking_id], Self::map_milestone_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Write back a recomputed task rollup, bumping `updated_at`.
    pub fn update_milestone_progress(&self, id: &str, progress: u8) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE milestones SET progress_percentage = ?1, updated_at = ?2 WHERE id = ?3",
            params![progress as i64, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Count milestones whose booking no longer exists. With FK enforcement on
    /// this is always zero, but upstream mirrors can arrive out of order.
    pub fn count_orphan_milestones(&self) -> Result<usize, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM milestones m
             WHERE NOT EXISTS (SELECT 1 FROM bookings b WHERE b.id = m.booking_id)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Helper: map a row to `DbTask`.
    pub(crate) fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbTask> {
        Ok(DbTask {
            id: row.get(0)?,
            milestone_id: row.get(1)?,
            title: row.get(2)?,
            status: row.get(3)?,
            estimated_hours: row.get(4)?,
            actual_hours: row.get(5)?,
            due_date: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    const TASK_COLUMNS: &'static str = "id, milestone_id, title, status, estimated_hours,
             actual_hours, due_date, created_at, updated_at";

    /// Insert or update a task mirrored from the platform store.
    pub fn upsert_task(&self, task: &DbTask) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO tasks (
                id, milestone_id, title, status, estimated_hours, actual_hours,
                due_date, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                milestone_id = excluded.milestone_id,
                title = excluded.title,
                status = excluded.status,
                estimated_hours = excluded.estimated_hours,
                actual_hours = excluded.actual_hours,
                due_date = excluded.due_date,
                updated_at = excluded.updated_at",
            params![
                task.id,
                task.milestone_id,
                task.title,
                task.status,
                task.estimated_hours,
                task.actual_hours,
                task.due_date,
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a task by ID.
    pub fn get_task(&self, id: &str) -> Result<Option<DbTask>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE id = ?1",
            Self::TASK_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_task_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Tasks of a milestone, stable order.
    pub fn get_tasks_for_milestone(&self, milestone_id: &str) -> Result<Vec<DbTask>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE milestone_id = ?1 ORDER BY created_at, id",
            Self::TASK_COLUMNS
        ))?;
        let rows = stmt.query_map(params![milestone_id], Self::map_task_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
