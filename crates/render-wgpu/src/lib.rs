//! wgpu backends for the viewer: an interactive window with an egui overlay
//! and offscreen rendering with frame readback.
//!
//! # Invariants
//! - Backends draw only what `prepare` copied into their visual scene.
//! - GPU objects are dropped before the window or device that owns them.
//! - Camera motion is presentation state and never reaches the simulation.

mod gpu;
mod mesh;
mod offscreen;
mod shaders;
mod windowed;

pub use offscreen::OffscreenBackend;
pub use windowed::WindowedBackend;
