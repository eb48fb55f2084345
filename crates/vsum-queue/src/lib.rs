//! Single-concurrency batch-import job queue.
//!
//! This crate provides:
//! - An in-memory FIFO queue of import jobs keyed by video ID
//! - A scheduler driving one externally supplied async processor call at a time
//! - Stage reporting and heartbeats from the processor back into the store
//! - Retry/remove/clear mutations and a stage watchdog

pub mod config;
pub mod error;
pub mod processor;
pub mod queue;
pub mod request;
pub mod store;

pub use config::QueueConfig;
pub use error::ProcessorError;
pub use processor::{Completion, ImportProcessor, ProcessorResult, StageHandle};
pub use queue::ImportQueue;
pub use request::{EnqueueOutcome, ImportRequest, SkipReason, SkippedImport};
pub use store::QueueStats;
