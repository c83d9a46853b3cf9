//! Core library for Salesline.
//!
//! This crate provides the pipeline models, SQLite storage, the stage
//! transition engine and the auto-loss detector, independent of any transport
//! layer (HTTP, MCP, etc.).
//!
//! # Usage
//!
//! ```no_run
//! use chrono::Utc;
//! use salesline_core::db::Database;
//! use salesline_core::engine::{EngineSettings, StageEngine};
//! use salesline_core::models::*;
//!
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! let engine = StageEngine::new(db.clone(), EngineSettings::default());
//! for pipeline in db.list_pipelines(&PipelineFilter::default())? {
//!     engine.apply_signal(pipeline.id, &Signal::ScoreUpdated { score: 80 }, Utc::now())?;
//! }
//! # Ok::<(), salesline_core::CoreError>(())
//! ```

pub mod db;
pub mod engine;
pub mod error;
pub mod models;

// Re-export commonly used types at crate root
pub use db::Database;
pub use engine::{AutoLossDetector, EngineSettings, StageEngine};
pub use error::{CoreError, Result};
