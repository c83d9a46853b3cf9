//! Salesline server: HTTP API, MCP tools and scheduling on top of `salesline-core`.

pub mod api;
pub mod config;
pub mod mcp;
pub mod scheduler;

pub use salesline_core::{db, engine, models};
