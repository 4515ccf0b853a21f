//! The daily run: gates, rotation, file arrival, reconciliation, per-entity
//! processing and the output-log scan.

#![allow(clippy::missing_errors_doc)]

pub mod context;
pub mod orchestrator;
pub mod processor;
pub mod rotate;
pub mod runlog;
pub mod scanner;
pub mod watcher;

pub use context::{resolve_host, RunContext, RunPaths};
pub use orchestrator::{Pipeline, PipelineSettings};
pub use processor::{EntityProcessor, ProcessReport, ProcessorRegistry, ProcessorState};
pub use processor::TableEntityProcessor;
pub use rotate::{rotate_artifacts, RotationReport};
pub use runlog::NarrativeLog;
pub use scanner::{scan_output_log, OffendingLine, ScanPass};
pub use watcher::{ArrivedFile, CancelToken, FileArrivalWatcher, WatchError, WatcherSettings};
