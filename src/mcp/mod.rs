use std::str::FromStr;

use chrono::Utc;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use salesline_core::models::*;
use salesline_core::{AutoLossDetector, CoreError, Database, EngineSettings, StageEngine};

#[derive(Clone)]
pub struct McpServer {
    db: Database,
    engine: StageEngine,
    detector: AutoLossDetector,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPipelineRequest {
    #[schemars(description = "The pipeline ID")]
    pub pipeline_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendSignalRequest {
    #[schemars(description = "The pipeline ID the signal applies to")]
    pub pipeline_id: String,
    #[schemars(description = "One of: score_updated, quote_generated, reservation_created")]
    pub signal_type: String,
    #[schemars(description = "Lead score 0-100, required for score_updated")]
    pub score: Option<u8>,
    #[schemars(description = "Quote amount as a decimal string, optional for quote_generated")]
    pub amount: Option<String>,
}

#[derive(Debug, Serialize)]
struct PipelineContext {
    #[serde(flatten)]
    pipeline: PipelineView,
    events: Vec<StageTransitionEvent>,
    notes: Vec<PipelineNote>,
}

fn core_error(e: CoreError) -> McpError {
    match e {
        CoreError::NotFound(_) | CoreError::InvalidInput(_) | CoreError::Conflict { .. } => {
            McpError::invalid_params(e.to_string(), None)
        }
        other => McpError::internal_error(other.to_string(), None),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

impl McpServer {
    pub fn new(db: Database, settings: EngineSettings) -> Self {
        Self {
            engine: StageEngine::new(db.clone(), settings),
            detector: AutoLossDetector::new(db.clone(), settings),
            db,
            tool_router: Self::tool_router(),
        }
    }

    fn parse_uuid(s: &str) -> Result<Uuid, McpError> {
        Uuid::parse_str(s)
            .map_err(|e| McpError::invalid_params(format!("Invalid UUID: {}", e), None))
    }

    fn parse_signal(req: &SendSignalRequest) -> Result<Signal, McpError> {
        match req.signal_type.as_str() {
            "score_updated" => {
                let score = req.score.ok_or_else(|| {
                    McpError::invalid_params("score is required for score_updated", None)
                })?;
                Ok(Signal::ScoreUpdated { score })
            }
            "quote_generated" => {
                let amount = req
                    .amount
                    .as_deref()
                    .map(Decimal::from_str)
                    .transpose()
                    .map_err(|e| McpError::invalid_params(format!("Invalid amount: {}", e), None))?;
                Ok(Signal::QuoteGenerated { amount })
            }
            "reservation_created" => Ok(Signal::ReservationCreated),
            other => Err(McpError::invalid_params(
                format!("Unknown signal type: {}", other),
                None,
            )),
        }
    }
}

#[tool_router]
impl McpServer {
    #[tool(description = "Get a sales pipeline with its stage history and notes")]
    async fn get_pipeline(
        &self,
        params: Parameters<GetPipelineRequest>,
    ) -> Result<CallToolResult, McpError> {
        let id = Self::parse_uuid(&params.0.pipeline_id)?;

        let pipeline = self
            .db
            .get_pipeline(id)
            .map_err(core_error)?
            .ok_or_else(|| McpError::invalid_params("Pipeline not found", None))?;
        let events = self.db.list_events(id).map_err(core_error)?;
        let notes = self.db.list_notes(id).map_err(core_error)?;

        to_json(&PipelineContext {
            pipeline: PipelineView::new(pipeline, Utc::now()),
            events,
            notes,
        })
    }

    #[tool(description = "Send a business signal to a pipeline; the stage advances if a rule matches")]
    async fn send_signal(
        &self,
        params: Parameters<SendSignalRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let id = Self::parse_uuid(&req.pipeline_id)?;
        let signal = Self::parse_signal(&req)?;

        let outcome = self
            .engine
            .apply_signal(id, &signal, Utc::now())
            .map_err(core_error)?;
        to_json(&outcome)
    }

    #[tool(description = "Mark every stale open pipeline as lost and report what changed")]
    async fn run_auto_loss_detection(&self) -> Result<CallToolResult, McpError> {
        let report = self
            .detector
            .run(RunTrigger::Manual, Utc::now())
            .map_err(core_error)?;
        to_json(&report)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Salesline MCP server for dealership sales pipelines".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(db: Database, settings: EngineSettings) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(db, settings);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(signal_type: &str, score: Option<u8>, amount: Option<&str>) -> SendSignalRequest {
        SendSignalRequest {
            pipeline_id: Uuid::new_v4().to_string(),
            signal_type: signal_type.into(),
            score,
            amount: amount.map(Into::into),
        }
    }

    #[test]
    fn parses_signal_requests() {
        assert_eq!(
            McpServer::parse_signal(&request("score_updated", Some(82), None)).unwrap(),
            Signal::ScoreUpdated { score: 82 }
        );
        assert_eq!(
            McpServer::parse_signal(&request("quote_generated", None, Some("31500.00"))).unwrap(),
            Signal::QuoteGenerated { amount: Some(Decimal::new(3150000, 2)) }
        );
        assert_eq!(
            McpServer::parse_signal(&request("reservation_created", None, None)).unwrap(),
            Signal::ReservationCreated
        );
    }

    #[test]
    fn rejects_malformed_signal_requests() {
        assert!(McpServer::parse_signal(&request("score_updated", None, None)).is_err());
        assert!(McpServer::parse_signal(&request("quote_generated", None, Some("lots"))).is_err());
        assert!(McpServer::parse_signal(&request("test_drive", None, None)).is_err());
    }
}
