//! Event logger: append-only stage transition history.
//!
//! [`record`] runs inside the caller's transaction so the event row and the
//! pipeline's `auto_logged_events_count` either both land or neither does,
//! together with the mutation that produced the event.

use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::pipelines::parse_stage;
use super::{fmt_ts, parse_ts, parse_uuid, Database};
use crate::error::{CoreError, Result};
use crate::models::{Actor, StageTransitionEvent, TriggerReason};

pub fn record(conn: &Connection, event: &StageTransitionEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO stage_transition_events
            (id, pipeline_id, from_stage, to_stage, trigger_reason, actor_kind, actor_name, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.id.to_string(),
            event.pipeline_id.to_string(),
            event.from_stage.as_str(),
            event.to_stage.as_str(),
            event.trigger_reason.as_str(),
            event.actor.kind(),
            event.actor.name(),
            fmt_ts(event.occurred_at),
        ],
    )?;

    let updated = conn.execute(
        "UPDATE pipelines SET auto_logged_events_count = auto_logged_events_count + 1 WHERE id = ?1",
        params![event.pipeline_id.to_string()],
    )?;
    if updated == 0 {
        return Err(CoreError::NotFound(event.pipeline_id));
    }

    tracing::debug!(
        pipeline_id = %event.pipeline_id,
        from = event.from_stage.as_str(),
        to = event.to_stage.as_str(),
        reason = event.trigger_reason.as_str(),
        "Recorded stage transition event"
    );
    Ok(())
}

struct EventRow {
    id: String,
    pipeline_id: String,
    from_stage: String,
    to_stage: String,
    trigger_reason: String,
    actor_kind: String,
    actor_name: Option<String>,
    occurred_at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pipeline_id: row.get(1)?,
            from_stage: row.get(2)?,
            to_stage: row.get(3)?,
            trigger_reason: row.get(4)?,
            actor_kind: row.get(5)?,
            actor_name: row.get(6)?,
            occurred_at: row.get(7)?,
        })
    }

    fn into_event(self) -> Result<StageTransitionEvent> {
        let trigger_reason = TriggerReason::from_str(&self.trigger_reason).ok_or_else(|| {
            CoreError::DataIntegrity(format!("unknown trigger reason '{}'", self.trigger_reason))
        })?;
        let actor = Actor::from_parts(&self.actor_kind, self.actor_name).ok_or_else(|| {
            CoreError::DataIntegrity(format!("invalid actor '{}'", self.actor_kind))
        })?;

        Ok(StageTransitionEvent {
            id: parse_uuid("event", &self.id)?,
            pipeline_id: parse_uuid("pipeline", &self.pipeline_id)?,
            from_stage: parse_stage(&self.from_stage)?,
            to_stage: parse_stage(&self.to_stage)?,
            trigger_reason,
            actor,
            occurred_at: parse_ts("occurred_at", &self.occurred_at)?,
        })
    }
}

impl Database {
    /// Events for one pipeline, oldest first.
    pub fn list_events(&self, pipeline_id: Uuid) -> Result<Vec<StageTransitionEvent>> {
        self.with_connection(|conn| -> Result<Vec<StageTransitionEvent>> {
            let mut stmt = conn.prepare(
                "SELECT id, pipeline_id, from_stage, to_stage, trigger_reason, actor_kind, actor_name, occurred_at
                 FROM stage_transition_events
                 WHERE pipeline_id = ?1
                 ORDER BY occurred_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![pipeline_id.to_string()], EventRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(EventRow::into_event).collect()
        })
    }

    pub fn count_events(&self) -> Result<u64> {
        let count: i64 = self.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM stage_transition_events", [], |row| row.get(0))
        })?;
        Ok(count as u64)
    }
}
