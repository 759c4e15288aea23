//! Shared types for the simrig workspace.
//!
//! # Invariants
//! - Every native resource is held by exactly one [`ResourceHandle`].
//! - Application toggles live in [`AppState`], owned by the shell, never in a global.

pub mod config;
pub mod fatal;
pub mod handle;
pub mod state;

pub use config::{ConfigError, SimConfig, ViewerConfig, ViewerKind};
pub use handle::{ReleaseError, ReleaseLog, ReleaseObserver, ResourceHandle};
pub use state::{AppState, MouseState};

/// Default fixed step used when `step` is called with a non-positive duration.
pub const DEFAULT_FIXED_TIMESTEP: f64 = 0.002;

/// Upper bound on the number of drawable geoms in a visual scene.
pub const MAX_VISUAL_GEOMS: usize = 2000;

/// Target frame rate for interactive shells.
pub const SIMULATION_FPS: f64 = 60.0;

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1024;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;
