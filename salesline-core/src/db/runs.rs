use rusqlite::params;

use super::{fmt_ts, parse_ts, parse_uuid, to_u32, Database};
use crate::error::{CoreError, Result};
use crate::models::{AutoLossRun, RunTrigger};

impl Database {
    pub fn record_auto_loss_run(&self, run: &AutoLossRun) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO auto_loss_runs
                    (id, trigger, as_of, started_at, finished_at, scanned, marked, skipped, failed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.id.to_string(),
                    run.trigger.as_str(),
                    fmt_ts(run.as_of),
                    fmt_ts(run.started_at),
                    fmt_ts(run.finished_at),
                    run.scanned,
                    run.marked,
                    run.skipped,
                    run.failed,
                ],
            )
        })?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn list_auto_loss_runs(&self, limit: u32) -> Result<Vec<AutoLossRun>> {
        self.with_connection(|conn| -> Result<Vec<AutoLossRun>> {
            let mut stmt = conn.prepare(
                "SELECT id, trigger, as_of, started_at, finished_at, scanned, marked, skipped, failed
                 FROM auto_loss_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        [
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, i64>(7)?,
                            row.get::<_, i64>(8)?,
                        ],
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(id, trigger, as_of, started_at, finished_at, counts)| -> Result<AutoLossRun> {
                    Ok(AutoLossRun {
                        id: parse_uuid("run", &id)?,
                        trigger: RunTrigger::from_str(&trigger).ok_or_else(|| {
                            CoreError::DataIntegrity(format!("unknown run trigger '{trigger}'"))
                        })?,
                        as_of: parse_ts("as_of", &as_of)?,
                        started_at: parse_ts("started_at", &started_at)?,
                        finished_at: parse_ts("finished_at", &finished_at)?,
                        scanned: to_u32("scanned", counts[0])?,
                        marked: to_u32("marked", counts[1])?,
                        skipped: to_u32("skipped", counts[2])?,
                        failed: to_u32("failed", counts[3])?,
                    })
                })
                .collect()
        })
    }
}
