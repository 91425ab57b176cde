//! Batch services: ingestion, the daily selection pipeline and settlement.
//!
//! Every entry point is idempotent and safe to trigger repeatedly from a
//! scheduler or the CLI.

pub mod ingest;
pub mod pipeline;
pub mod settlement;

pub use ingest::Ingestor;
pub use pipeline::{PipelineOptions, PipelineResult, SelectionPipeline};
pub use settlement::{SettlementEngine, SettlementResult};
