//! Job orchestration for the vpress server.
//!
//! Drives a submitted job from intake through the external-tool pipelines
//! (upload-compress, or fetch-then-conditionally-compress) to a terminal
//! state, owning the job registry, the process table, and the retention
//! scheduler.

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod service;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use pipeline::PipelineContext;
pub use service::{Health, JobService, ToolCheck};
