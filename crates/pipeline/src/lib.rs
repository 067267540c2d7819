//! Job pipeline: session tracking, stores, stage-tasks and the
//! orchestrator that chains them.

pub mod config;
pub mod error;
pub mod links;
pub mod memory;
pub mod orchestrator;
pub mod scoring;
pub mod stages;
pub mod store;
pub mod tracker;

pub use config::PipelineConfig;
pub use error::{StageError, StorageError, TrackerError};
pub use orchestrator::{CreatedJob, Orchestrator, StageTask, CHAIN};
pub use stages::StageContext;
pub use tracker::{PgSessionTracker, SessionTracker};
