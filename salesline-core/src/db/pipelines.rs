use chrono::{DateTime, Datelike, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{events, fmt_ts, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid, to_u32, Database};
use crate::error::{CoreError, Result};
use crate::models::*;

const PIPELINE_COLUMNS: &str = "id, pipeline_number, customer_name, customer_phone, customer_email, \
    current_stage, previous_stage, stage_entered_at, sales_rep_id, vehicle_interest, quote_amount, \
    probability, priority, next_action, next_action_due, auto_logged_events_count, \
    manual_notes_count, attachments_count, branch_id, lead_id, last_activity_at, revision, \
    created_at, updated_at";

/// Raw column values, decoded into a [`Pipeline`] outside the rusqlite row callback
/// so that bad data surfaces as [`CoreError::DataIntegrity`].
struct PipelineRow {
    id: String,
    pipeline_number: String,
    customer_name: String,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    current_stage: String,
    previous_stage: Option<String>,
    stage_entered_at: String,
    sales_rep_id: Option<String>,
    vehicle_interest: String,
    quote_amount: Option<String>,
    probability: i64,
    priority: String,
    next_action: Option<String>,
    next_action_due: Option<String>,
    auto_logged_events_count: i64,
    manual_notes_count: i64,
    attachments_count: i64,
    branch_id: String,
    lead_id: Option<String>,
    last_activity_at: String,
    revision: i64,
    created_at: String,
    updated_at: String,
}

impl PipelineRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pipeline_number: row.get(1)?,
            customer_name: row.get(2)?,
            customer_phone: row.get(3)?,
            customer_email: row.get(4)?,
            current_stage: row.get(5)?,
            previous_stage: row.get(6)?,
            stage_entered_at: row.get(7)?,
            sales_rep_id: row.get(8)?,
            vehicle_interest: row.get(9)?,
            quote_amount: row.get(10)?,
            probability: row.get(11)?,
            priority: row.get(12)?,
            next_action: row.get(13)?,
            next_action_due: row.get(14)?,
            auto_logged_events_count: row.get(15)?,
            manual_notes_count: row.get(16)?,
            attachments_count: row.get(17)?,
            branch_id: row.get(18)?,
            lead_id: row.get(19)?,
            last_activity_at: row.get(20)?,
            revision: row.get(21)?,
            created_at: row.get(22)?,
            updated_at: row.get(23)?,
        })
    }

    fn into_pipeline(self) -> Result<Pipeline> {
        let probability = u8::try_from(self.probability)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| {
                CoreError::DataIntegrity(format!("probability {} out of range", self.probability))
            })?;

        let quote_amount = self
            .quote_amount
            .map(|raw| {
                raw.parse::<Decimal>().map_err(|e| {
                    CoreError::DataIntegrity(format!("invalid quote_amount '{raw}': {e}"))
                })
            })
            .transpose()?;

        Ok(Pipeline {
            id: parse_uuid("pipeline", &self.id)?,
            pipeline_number: self.pipeline_number,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            customer_email: self.customer_email,
            current_stage: parse_stage(&self.current_stage)?,
            previous_stage: self.previous_stage.as_deref().map(parse_stage).transpose()?,
            stage_entered_at: parse_ts("stage_entered_at", &self.stage_entered_at)?,
            sales_rep_id: parse_opt_uuid("sales_rep", self.sales_rep_id)?,
            vehicle_interest: self.vehicle_interest,
            quote_amount,
            probability,
            priority: Priority::from_str(&self.priority).ok_or_else(|| {
                CoreError::DataIntegrity(format!("unknown priority '{}'", self.priority))
            })?,
            next_action: self.next_action,
            next_action_due: parse_opt_ts("next_action_due", self.next_action_due)?,
            auto_logged_events_count: to_u32(
                "auto_logged_events_count",
                self.auto_logged_events_count,
            )?,
            manual_notes_count: to_u32("manual_notes_count", self.manual_notes_count)?,
            attachments_count: to_u32("attachments_count", self.attachments_count)?,
            branch_id: parse_uuid("branch", &self.branch_id)?,
            lead_id: parse_opt_uuid("lead", self.lead_id)?,
            last_activity_at: parse_ts("last_activity_at", &self.last_activity_at)?,
            revision: self.revision,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
        })
    }
}

pub(crate) fn parse_stage(value: &str) -> Result<Stage> {
    Stage::from_str(value)
        .ok_or_else(|| CoreError::DataIntegrity(format!("unknown pipeline stage '{value}'")))
}

pub(crate) fn load_pipeline(conn: &Connection, id: Uuid) -> Result<Option<Pipeline>> {
    let sql = format!("SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], PipelineRow::from_row)
        .optional()?;
    row.map(PipelineRow::into_pipeline).transpose()
}

pub(crate) fn require_pipeline(conn: &Connection, id: Uuid) -> Result<Pipeline> {
    load_pipeline(conn, id)?.ok_or(CoreError::NotFound(id))
}

/// Bumps the revision and activity clock of a pipeline after a child record
/// (note, attachment) was added.
pub(crate) fn bump_counter(
    conn: &Connection,
    id: Uuid,
    column: &'static str,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = format!(
        "UPDATE pipelines SET {column} = {column} + 1, last_activity_at = ?1, updated_at = ?1, \
         revision = revision + 1 WHERE id = ?2"
    );
    let updated = conn.execute(&sql, params![fmt_ts(now), id.to_string()])?;
    if updated == 0 {
        return Err(CoreError::NotFound(id));
    }
    Ok(())
}

/// Writes the mutable columns of `pipeline` if the stored revision still equals
/// `expected_revision`. Counters are left alone; they only move through
/// [`bump_counter`] and the event log.
pub(crate) fn write_pipeline(
    conn: &Connection,
    pipeline: &Pipeline,
    expected_revision: i64,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE pipelines SET
            customer_name = ?1, customer_phone = ?2, customer_email = ?3,
            current_stage = ?4, previous_stage = ?5, stage_entered_at = ?6,
            sales_rep_id = ?7, vehicle_interest = ?8, quote_amount = ?9,
            probability = ?10, priority = ?11, next_action = ?12, next_action_due = ?13,
            last_activity_at = ?14, updated_at = ?15, revision = revision + 1
         WHERE id = ?16 AND revision = ?17",
        params![
            pipeline.customer_name,
            pipeline.customer_phone,
            pipeline.customer_email,
            pipeline.current_stage.as_str(),
            pipeline.previous_stage.map(|s| s.as_str()),
            fmt_ts(pipeline.stage_entered_at),
            pipeline.sales_rep_id.map(|id| id.to_string()),
            pipeline.vehicle_interest,
            pipeline.quote_amount.map(|a| a.to_string()),
            pipeline.probability,
            pipeline.priority.as_str(),
            pipeline.next_action,
            pipeline.next_action_due.map(fmt_ts),
            fmt_ts(pipeline.last_activity_at),
            fmt_ts(pipeline.updated_at),
            pipeline.id.to_string(),
            expected_revision,
        ],
    )?;

    if updated == 0 {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pipelines WHERE id = ?1)",
            params![pipeline.id.to_string()],
            |row| row.get(0),
        )?;
        return Err(if exists {
            CoreError::Conflict {
                id: pipeline.id,
                expected: expected_revision,
            }
        } else {
            CoreError::NotFound(pipeline.id)
        });
    }
    Ok(())
}

fn next_pipeline_number(conn: &Connection, now: DateTime<Utc>) -> Result<String> {
    let year = now.year();
    let seq: i64 = conn.query_row(
        "INSERT INTO pipeline_sequences (year, last_value) VALUES (?1, 1)
         ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
         RETURNING last_value",
        params![year],
        |row| row.get(0),
    )?;
    Ok(format!("PL-{year}-{seq:06}"))
}

fn validate_probability(stage: Stage, probability: u8) -> Result<()> {
    if probability > 100 {
        return Err(CoreError::InvalidInput(format!(
            "probability must be between 0 and 100, got {probability}"
        )));
    }
    if stage == Stage::Lost && probability != 0 {
        return Err(CoreError::InvalidInput(
            "a lost pipeline must have probability 0".into(),
        ));
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

impl Database {
    pub fn create_pipeline(&self, input: CreatePipelineInput, now: DateTime<Utc>) -> Result<Pipeline> {
        require_text("customer_name", &input.customer_name)?;
        require_text("vehicle_interest", &input.vehicle_interest)?;

        let stage = input.stage.unwrap_or(Stage::Lead);
        let probability = input.probability.unwrap_or_else(|| stage.default_probability());
        validate_probability(stage, probability)?;

        self.with_connection(|conn| -> Result<Pipeline> {
            let tx = conn.transaction()?;
            let id = Uuid::new_v4();
            let number = next_pipeline_number(&tx, now)?;
            let ts = fmt_ts(now);

            tx.execute(
                &format!(
                    "INSERT INTO pipelines ({PIPELINE_COLUMNS}) VALUES
                     (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      0, 0, 0, ?15, ?16, ?7, 0, ?7, ?7)"
                ),
                params![
                    id.to_string(),
                    number,
                    input.customer_name,
                    input.customer_phone,
                    input.customer_email,
                    stage.as_str(),
                    ts,
                    input.sales_rep_id.map(|id| id.to_string()),
                    input.vehicle_interest,
                    input.quote_amount.map(|a| a.to_string()),
                    probability,
                    input.priority.unwrap_or_default().as_str(),
                    input.next_action,
                    input.next_action_due.map(fmt_ts),
                    input.branch_id.to_string(),
                    input.lead_id.map(|id| id.to_string()),
                ],
            )?;

            let pipeline = require_pipeline(&tx, id)?;
            tx.commit()?;
            tracing::info!(
                pipeline = %pipeline.pipeline_number,
                stage = stage.as_str(),
                "Created pipeline"
            );
            Ok(pipeline)
        })
    }

    pub fn get_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>> {
        self.with_connection(|conn| load_pipeline(conn, id))
    }

    pub fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>> {
        let mut sql = format!("SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE 1 = 1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            // instr() matches literally, so `%` and `_` typed by users are not wildcards.
            let needle = search.to_lowercase();
            sql.push_str(
                " AND (instr(unicode_lower(pipeline_number), ?) > 0
                   OR instr(unicode_lower(customer_name), ?) > 0
                   OR instr(unicode_lower(customer_phone), ?) > 0
                   OR instr(unicode_lower(customer_email), ?) > 0
                   OR instr(unicode_lower(vehicle_interest), ?) > 0)",
            );
            args.extend(std::iter::repeat(Value::Text(needle)).take(5));
        }
        if let Some(stage) = filter.current_stage {
            sql.push_str(" AND current_stage = ?");
            args.push(Value::Text(stage.as_str().into()));
        }
        if let Some(priority) = filter.priority {
            sql.push_str(" AND priority = ?");
            args.push(Value::Text(priority.as_str().into()));
        }
        if let Some(rep) = filter.sales_rep_id {
            sql.push_str(" AND sales_rep_id = ?");
            args.push(Value::Text(rep.to_string()));
        }
        if let Some(branch) = filter.branch_id {
            sql.push_str(" AND branch_id = ?");
            args.push(Value::Text(branch.to_string()));
        }
        if let Some(band) = filter.probability {
            let (low, high) = band.range();
            sql.push_str(" AND probability BETWEEN ? AND ?");
            args.push(Value::Integer(low.into()));
            args.push(Value::Integer(high.into()));
        }
        sql.push_str(" ORDER BY created_at DESC, pipeline_number DESC");

        self.with_connection(|conn| -> Result<Vec<Pipeline>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args), PipelineRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(PipelineRow::into_pipeline).collect()
        })
    }

    /// Applies a manual edit. Passing `expected_revision` turns a concurrent
    /// change into a [`CoreError::Conflict`] instead of a last-writer-wins update.
    pub fn update_pipeline(
        &self,
        id: Uuid,
        input: UpdatePipelineInput,
        now: DateTime<Utc>,
    ) -> Result<Pipeline> {
        self.with_connection(|conn| -> Result<Pipeline> {
            let tx = conn.transaction()?;
            let current = require_pipeline(&tx, id)?;
            let expected = input.expected_revision.unwrap_or(current.revision);

            let mut updated = current.clone();
            if let Some(name) = input.customer_name {
                require_text("customer_name", &name)?;
                updated.customer_name = name;
            }
            if let Some(phone) = input.customer_phone {
                updated.customer_phone = Some(phone);
            }
            if let Some(email) = input.customer_email {
                updated.customer_email = Some(email);
            }
            if let Some(rep) = input.sales_rep_id {
                updated.sales_rep_id = Some(rep);
            }
            if let Some(vehicle) = input.vehicle_interest {
                require_text("vehicle_interest", &vehicle)?;
                updated.vehicle_interest = vehicle;
            }
            if let Some(amount) = input.quote_amount {
                updated.quote_amount = Some(amount);
            }
            if let Some(probability) = input.probability {
                validate_probability(updated.current_stage, probability)?;
                updated.probability = probability;
            }
            if let Some(priority) = input.priority {
                updated.priority = priority;
            }
            if let Some(action) = input.next_action {
                updated.next_action = Some(action);
            }
            if let Some(due) = input.next_action_due {
                updated.next_action_due = Some(due);
            }
            updated.touch(now);

            write_pipeline(&tx, &updated, expected)?;
            let stored = require_pipeline(&tx, id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Persists an engine transition together with its event.
    pub fn commit_transition(&self, transition: &Transition, expected_revision: i64) -> Result<Pipeline> {
        self.with_connection(|conn| -> Result<Pipeline> {
            let tx = conn.transaction()?;
            write_pipeline(&tx, &transition.pipeline, expected_revision)?;
            events::record(&tx, &transition.event)?;
            let stored = require_pipeline(&tx, transition.pipeline.id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Persists a pipeline change that involves no stage transition.
    pub fn commit_activity(&self, pipeline: &Pipeline, expected_revision: i64) -> Result<Pipeline> {
        self.with_connection(|conn| -> Result<Pipeline> {
            let tx = conn.transaction()?;
            write_pipeline(&tx, pipeline, expected_revision)?;
            let stored = require_pipeline(&tx, pipeline.id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Hard delete. Events, notes and attachments go with it.
    pub fn delete_pipeline(&self, id: Uuid) -> Result<bool> {
        let deleted = self.with_connection(|conn| {
            conn.execute("DELETE FROM pipelines WHERE id = ?1", params![id.to_string()])
        })?;
        if deleted > 0 {
            tracing::info!(pipeline_id = %id, "Deleted pipeline");
        }
        Ok(deleted > 0)
    }

    /// Non-terminal pipelines whose last activity is at or before `cutoff`.
    pub fn stale_pipelines(&self, cutoff: DateTime<Utc>) -> Result<Vec<Pipeline>> {
        let sql = format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines
             WHERE current_stage NOT IN ('lost', 'reservation_made') AND last_activity_at <= ?1
             ORDER BY last_activity_at ASC"
        );
        self.with_connection(|conn| -> Result<Vec<Pipeline>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![fmt_ts(cutoff)], PipelineRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(PipelineRow::into_pipeline).collect()
        })
    }

    pub fn pipeline_stats(
        &self,
        filter: &PipelineFilter,
        now: DateTime<Utc>,
        inactivity_window: Duration,
    ) -> Result<PipelineStats> {
        let pipelines = self.list_pipelines(filter)?;
        let cutoff = now - inactivity_window;

        let by_stage = Stage::ALL
            .iter()
            .map(|stage| StageCount {
                stage: *stage,
                count: pipelines.iter().filter(|p| p.current_stage == *stage).count() as u32,
            })
            .collect();

        Ok(PipelineStats {
            total: pipelines.len() as u32,
            by_stage,
            auto_logged_events: pipelines
                .iter()
                .map(|p| u64::from(p.auto_logged_events_count))
                .sum(),
            manual_notes: pipelines.iter().map(|p| u64::from(p.manual_notes_count)).sum(),
            due_for_auto_loss: pipelines
                .iter()
                .filter(|p| !p.is_terminal() && p.last_activity_at <= cutoff)
                .count() as u32,
        })
    }
}
