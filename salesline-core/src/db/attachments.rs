use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use super::pipelines::bump_counter;
use super::{fmt_ts, parse_ts, parse_uuid, Database};
use crate::error::{CoreError, Result};
use crate::models::{CreateAttachmentInput, PipelineAttachment};

impl Database {
    /// Registers attachment metadata; the file itself lives wherever `url` points.
    pub fn add_attachment(
        &self,
        pipeline_id: Uuid,
        input: CreateAttachmentInput,
        now: DateTime<Utc>,
    ) -> Result<PipelineAttachment> {
        if input.file_name.trim().is_empty() || input.url.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "attachment needs a file name and a url".into(),
            ));
        }

        let attachment = PipelineAttachment {
            id: Uuid::new_v4(),
            pipeline_id,
            file_name: input.file_name,
            content_type: input.content_type,
            url: input.url,
            created_at: now,
        };

        self.with_connection(|conn| -> Result<()> {
            let tx = conn.transaction()?;
            bump_counter(&tx, pipeline_id, "attachments_count", now)?;
            tx.execute(
                "INSERT INTO pipeline_attachments (id, pipeline_id, file_name, content_type, url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    attachment.id.to_string(),
                    pipeline_id.to_string(),
                    attachment.file_name,
                    attachment.content_type,
                    attachment.url,
                    fmt_ts(now),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })?;

        Ok(attachment)
    }

    pub fn list_attachments(&self, pipeline_id: Uuid) -> Result<Vec<PipelineAttachment>> {
        self.with_connection(|conn| -> Result<Vec<PipelineAttachment>> {
            let mut stmt = conn.prepare(
                "SELECT id, file_name, content_type, url, created_at FROM pipeline_attachments
                 WHERE pipeline_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![pipeline_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(id, file_name, content_type, url, created_at)| -> Result<PipelineAttachment> {
                    Ok(PipelineAttachment {
                        id: parse_uuid("attachment", &id)?,
                        pipeline_id,
                        file_name,
                        content_type,
                        url,
                        created_at: parse_ts("created_at", &created_at)?,
                    })
                })
                .collect()
        })
    }
}
