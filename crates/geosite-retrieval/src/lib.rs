//! GeoSite Retrieval - Selection pipeline and ranking
//!
//! This crate implements the selection use case: semantic retrieval over the
//! site table, structural filtering, composite scoring, spatial declustering,
//! route ordering and narration.

pub mod blend;
pub mod constraints;
pub mod embedding;
pub mod intent;
pub mod models;
pub mod narration;
pub mod optimizer;
pub mod pipeline;
pub mod scoring;

#[cfg(test)]
mod testing;

pub use constraints::{ConstraintEngine, RuleEvaluation};
pub use embedding::{EmbeddingIndex, LoadSource};
pub use models::{
    Diagnostic, MapCenter, Narration, RankedSite, SelectionOutcome, SelectionReport, SelectionResult,
    SelectionStage, StageResult,
};
pub use pipeline::SelectionPipeline;
pub use scoring::{DistrictTable, ScoringEngine};
