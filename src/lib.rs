//! Filtering, diversity and overlap statistics for compound abundance tables.
//!
//! The pipeline runs five stages in a fixed order over one dataset:
//! `load → blank → cumulative → diversity → overlap`. Each stage checks that
//! its predecessors completed, transforms the [`PipelineState`] and records a
//! [`StageResult`]. Only [`data::loader`] touches the filesystem.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod stage;
pub mod state;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineFailure};
pub use pipeline::Pipeline;
pub use stage::{Stage, StageResult};
pub use state::PipelineState;
