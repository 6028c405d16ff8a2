//! Engine kernel: clock, dual-rate scheduler, camera and the world coordinator.
//!
//! # Invariants
//! - At most one simulation run and one presentation run are in flight; the
//!   two roles may overlap each other.
//! - The control thread never blocks on a worker. A role that is still busy
//!   when its next run falls due is skipped, not queued.
//! - Shutdown joins both workers before the render device is waited on.
//! - Camera state crosses threads only as a published [`CameraPose`] snapshot.
//!
//! [`CameraPose`]: meander_common::CameraPose

pub mod camera;
pub mod clock;
pub mod config;
pub mod engine;
pub mod scheduler;
pub mod world;

pub use camera::{FlyCamera, PoseBuffer};
pub use clock::{Clock, FrameTimer, RenderTimings};
pub use config::{ConfigError, ConfigOverrides, EngineConfig};
pub use engine::{Engine, EngineStats, Pump};
pub use scheduler::{Dispatch, Handoff, Job, Role, RoleStats, Scheduler};
pub use world::World;

use meander_render::RenderError;
use meander_stream::StreamError;

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("failed to spawn the {role} worker")]
    Spawn {
        role: Role,
        #[source]
        source: std::io::Error,
    },
    #[error("{role} worker failed: {message}")]
    WorkerFault { role: Role, message: String },
    #[error("{0} worker panicked")]
    WorkerPanicked(Role),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
