use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use super::pipelines::bump_counter;
use super::{fmt_ts, parse_ts, parse_uuid, Database};
use crate::error::{CoreError, Result};
use crate::models::{CreateNoteInput, PipelineNote};

impl Database {
    pub fn add_note(
        &self,
        pipeline_id: Uuid,
        input: CreateNoteInput,
        now: DateTime<Utc>,
    ) -> Result<PipelineNote> {
        if input.content.trim().is_empty() {
            return Err(CoreError::InvalidInput("note content must not be empty".into()));
        }

        let note = PipelineNote {
            id: Uuid::new_v4(),
            pipeline_id,
            author: input.author,
            content: input.content,
            created_at: now,
        };

        self.with_connection(|conn| -> Result<()> {
            let tx = conn.transaction()?;
            bump_counter(&tx, pipeline_id, "manual_notes_count", now)?;
            tx.execute(
                "INSERT INTO pipeline_notes (id, pipeline_id, author, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    note.id.to_string(),
                    pipeline_id.to_string(),
                    note.author,
                    note.content,
                    fmt_ts(now),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })?;

        Ok(note)
    }

    pub fn list_notes(&self, pipeline_id: Uuid) -> Result<Vec<PipelineNote>> {
        self.with_connection(|conn| -> Result<Vec<PipelineNote>> {
            let mut stmt = conn.prepare(
                "SELECT id, author, content, created_at FROM pipeline_notes
                 WHERE pipeline_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![pipeline_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(id, author, content, created_at)| -> Result<PipelineNote> {
                    Ok(PipelineNote {
                        id: parse_uuid("note", &id)?,
                        pipeline_id,
                        author,
                        content,
                        created_at: parse_ts("created_at", &created_at)?,
                    })
                })
                .collect()
        })
    }
}
