//! HTTP API consumed by the sales UI.

mod error;
mod export;
mod pipelines;

use axum::{
    routing::{get, post},
    Json, Router,
};
use salesline_core::{AutoLossDetector, Database, EngineSettings, StageEngine};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: StageEngine,
    pub detector: AutoLossDetector,
}

impl AppState {
    pub fn new(db: Database, settings: EngineSettings) -> Self {
        Self {
            engine: StageEngine::new(db.clone(), settings),
            detector: AutoLossDetector::new(db.clone(), settings),
            db,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        self.engine.settings()
    }
}

pub fn create_router(db: Database, settings: EngineSettings) -> Router {
    router(AppState::new(db, settings))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/sales/pipeline",
            get(pipelines::list_pipelines).post(pipelines::create_pipeline),
        )
        .route(
            "/sales/pipeline/{id}",
            get(pipelines::get_pipeline)
                .put(pipelines::update_pipeline)
                .delete(pipelines::delete_pipeline),
        )
        .route("/sales/pipeline/{id}/signals", post(pipelines::send_signal))
        .route("/sales/pipeline/{id}/stage", post(pipelines::move_stage))
        .route("/sales/pipeline/{id}/events", get(pipelines::list_events))
        .route(
            "/sales/pipeline/{id}/notes",
            get(pipelines::list_notes).post(pipelines::add_note),
        )
        .route(
            "/sales/pipeline/{id}/attachments",
            get(pipelines::list_attachments).post(pipelines::add_attachment),
        )
        .route(
            "/sales/pipeline-auto-loss-detection",
            post(pipelines::run_auto_loss_detection),
        )
        .route(
            "/sales/pipeline-auto-loss-detection/runs",
            get(pipelines::list_auto_loss_runs),
        )
        .route("/sales/pipeline-export", get(export::export_pipelines))
        .route("/sales/pipeline-stats", get(pipelines::pipeline_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
