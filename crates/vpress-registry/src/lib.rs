//! In-memory job tracking and artifact retention for the vpress server.
//!
//! The job registry and the retention timer table are the only
//! cross-request shared mutable state in the system.
//! Both are owned values injected into the orchestrator at construction, not
//! ambient globals, so they can be exercised against temp directories in
//! tests.

pub mod registry;
pub mod retention;

pub use registry::JobRegistry;
pub use retention::RetentionScheduler;
