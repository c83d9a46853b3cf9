use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use salesline_core::models::*;
use salesline_core::CoreError;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiError, ApiResult, AppState};

const DEFAULT_RUN_HISTORY: u32 = 20;
const MAX_RUN_HISTORY: u32 = 500;

fn ensure_exists(state: &AppState, id: Uuid) -> ApiResult<()> {
    match state.db.get_pipeline(id)? {
        Some(_) => Ok(()),
        None => Err(CoreError::NotFound(id).into()),
    }
}

pub async fn list_pipelines(
    State(state): State<AppState>,
    Query(filter): Query<PipelineFilter>,
) -> ApiResult<Json<Vec<PipelineView>>> {
    let now = Utc::now();
    let pipelines = state
        .db
        .list_pipelines(&filter)?
        .into_iter()
        .map(|p| PipelineView::new(p, now))
        .collect();
    Ok(Json(pipelines))
}

pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(input): Json<CreatePipelineInput>,
) -> ApiResult<(StatusCode, Json<PipelineView>)> {
    let now = Utc::now();
    let pipeline = state.db.create_pipeline(input, now)?;
    Ok((StatusCode::CREATED, Json(PipelineView::new(pipeline, now))))
}

pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineWithEvents>> {
    let pipeline = state.db.get_pipeline(id)?.ok_or(CoreError::NotFound(id))?;
    let events = state.db.list_events(id)?;
    Ok(Json(PipelineWithEvents {
        pipeline: PipelineView::new(pipeline, Utc::now()),
        events,
    }))
}

pub async fn update_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePipelineInput>,
) -> ApiResult<Json<PipelineView>> {
    let now = Utc::now();
    let pipeline = state.db.update_pipeline(id, input, now)?;
    Ok(Json(PipelineView::new(pipeline, now)))
}

pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.db.delete_pipeline(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CoreError::NotFound(id).into())
    }
}

pub async fn send_signal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(signal): Json<Signal>,
) -> ApiResult<Json<SignalOutcome>> {
    let outcome = state.engine.apply_signal(id, &signal, Utc::now())?;
    Ok(Json(outcome))
}

pub async fn move_stage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<MoveStageInput>,
) -> ApiResult<Json<SignalOutcome>> {
    let outcome = state.engine.move_stage(id, input, Utc::now())?;
    Ok(Json(outcome))
}

pub async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<StageTransitionEvent>>> {
    ensure_exists(&state, id)?;
    Ok(Json(state.db.list_events(id)?))
}

pub async fn list_notes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<PipelineNote>>> {
    ensure_exists(&state, id)?;
    Ok(Json(state.db.list_notes(id)?))
}

pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateNoteInput>,
) -> ApiResult<(StatusCode, Json<PipelineNote>)> {
    let note = state.db.add_note(id, input, Utc::now())?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<PipelineAttachment>>> {
    ensure_exists(&state, id)?;
    Ok(Json(state.db.list_attachments(id)?))
}

pub async fn add_attachment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateAttachmentInput>,
) -> ApiResult<(StatusCode, Json<PipelineAttachment>)> {
    let attachment = state.db.add_attachment(id, input, Utc::now())?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

/// "Run Now" for the auto-loss detector.
pub async fn run_auto_loss_detection(
    State(state): State<AppState>,
) -> ApiResult<Json<AutoLossReport>> {
    let detector = state.detector.clone();
    let report = tokio::task::spawn_blocking(move || detector.run(RunTrigger::Manual, Utc::now()))
        .await
        .map_err(|e| ApiError::Internal(format!("auto-loss scan task failed: {e}")))??;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct RunHistoryQuery {
    pub limit: Option<u32>,
}

pub async fn list_auto_loss_runs(
    State(state): State<AppState>,
    Query(query): Query<RunHistoryQuery>,
) -> ApiResult<Json<Vec<AutoLossRun>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RUN_HISTORY);
    if limit == 0 || limit > MAX_RUN_HISTORY {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_RUN_HISTORY}"
        )));
    }
    Ok(Json(state.db.list_auto_loss_runs(limit)?))
}

pub async fn pipeline_stats(
    State(state): State<AppState>,
    Query(filter): Query<PipelineFilter>,
) -> ApiResult<Json<PipelineStats>> {
    let window = state.settings().inactivity_window();
    Ok(Json(state.db.pipeline_stats(&filter, Utc::now(), window)?))
}
