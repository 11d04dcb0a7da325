//! Container session orchestration.
//!
//! Combines a validated repository reference, discovered host configuration
//! and the session image into a [`launch::LaunchSpec`], spawns the container
//! attached to the operator's terminal, and owns its lifecycle through exit
//! or interruption. The container engine is only ever driven through typed,
//! timeout-bounded calls; no untrusted string reaches an engine invocation
//! without having passed validation first.

pub mod engine;
pub mod image;
pub mod launch;
pub mod lifecycle;

pub use engine::{Engine, EngineError};
pub use image::{ensure_image, BuildError, IMAGE_NAME};
pub use launch::{HostCredentials, LaunchSpec, Mount};
pub use lifecycle::{CleanupReport, LaunchError, Session, SessionOutcome, SessionState};
