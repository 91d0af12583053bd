//! ecs-imager-builder - Alibaba Cloud ECS image builder
//!
//! Provisions a VPC, vswitch, security group and instance, snapshots the
//! instance into an image, optionally copies it to other regions, and tears
//! down every transient resource it created, whatever the outcome.
//!
//! ## Modules
//!
//! - [`config`]: Build template parsing and validation
//! - [`ecs`]: Provider API boundary, HTTP client and error classification
//! - [`error`]: API, polling and build error types
//! - [`orchestrator`]: Step assembly and the top-level build entry point
//! - [`pipeline`]: Step runner, shared state, zone selection and fallback
//! - [`wait`]: Polling with backoff until an expected outcome

pub mod config;
pub mod ecs;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod wait;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::BuildConfig;
pub use error::{ApiError, BuildError, PollError};
pub use orchestrator::{BuildOutcome, build_image};
