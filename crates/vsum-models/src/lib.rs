//! Shared data models for the VidSum batch-import queue.
//!
//! This crate provides Serde-serializable types for:
//! - Import jobs and their lifecycle timestamps
//! - Job status and stage labels

pub mod job;

pub use job::{ImportJob, JobStage, JobStatus};
