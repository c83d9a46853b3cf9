//! CSV export of the filtered pipeline list.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use salesline_core::models::{Pipeline, PipelineFilter};
use serde::Serialize;

use super::{ApiError, ApiResult, AppState};

const HEADERS: [&str; 19] = [
    "pipeline_number",
    "customer_name",
    "customer_phone",
    "customer_email",
    "current_stage",
    "previous_stage",
    "stage_duration_hours",
    "vehicle_interest",
    "quote_amount",
    "probability",
    "priority",
    "next_action",
    "next_action_due",
    "auto_logged_events",
    "manual_notes",
    "attachments",
    "sales_rep_id",
    "branch_id",
    "created_at",
];

// Field order must match HEADERS.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    pipeline_number: &'a str,
    customer_name: &'a str,
    customer_phone: Option<&'a str>,
    customer_email: Option<&'a str>,
    current_stage: &'static str,
    previous_stage: Option<&'static str>,
    stage_duration_hours: i64,
    vehicle_interest: &'a str,
    quote_amount: Option<String>,
    probability: u8,
    priority: &'static str,
    next_action: Option<&'a str>,
    next_action_due: Option<String>,
    auto_logged_events: u32,
    manual_notes: u32,
    attachments: u32,
    sales_rep_id: Option<String>,
    branch_id: String,
    created_at: String,
}

impl<'a> ExportRow<'a> {
    fn new(p: &'a Pipeline, now: DateTime<Utc>) -> Self {
        Self {
            pipeline_number: &p.pipeline_number,
            customer_name: &p.customer_name,
            customer_phone: p.customer_phone.as_deref(),
            customer_email: p.customer_email.as_deref(),
            current_stage: p.current_stage.as_str(),
            previous_stage: p.previous_stage.map(|s| s.as_str()),
            stage_duration_hours: p.stage_duration_hours(now),
            vehicle_interest: &p.vehicle_interest,
            quote_amount: p.quote_amount.map(|a| a.to_string()),
            probability: p.probability,
            priority: p.priority.as_str(),
            next_action: p.next_action.as_deref(),
            next_action_due: p.next_action_due.map(|d| d.to_rfc3339()),
            auto_logged_events: p.auto_logged_events_count,
            manual_notes: p.manual_notes_count,
            attachments: p.attachments_count,
            sales_rep_id: p.sales_rep_id.map(|id| id.to_string()),
            branch_id: p.branch_id.to_string(),
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

pub fn render_csv(pipelines: &[Pipeline], now: DateTime<Utc>) -> ApiResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(HEADERS)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    for pipeline in pipelines {
        writer
            .serialize(ExportRow::new(pipeline, now))
            .map_err(|e| ApiError::Internal(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub async fn export_pipelines(
    State(state): State<AppState>,
    Query(filter): Query<PipelineFilter>,
) -> ApiResult<impl IntoResponse> {
    let now = Utc::now();
    let pipelines = state.db.list_pipelines(&filter)?;
    let body = render_csv(&pipelines, now)?;
    tracing::debug!(rows = pipelines.len(), "Exported pipelines");

    let filename = format!("pipelines-{}.csv", now.format("%Y%m%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}
