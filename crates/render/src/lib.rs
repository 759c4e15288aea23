//! Rendering adapter: everything between a simulation state and pixels that
//! does not need a GPU.
//!
//! # Invariants
//! - Rendering never mutates the simulation. Backends copy what they draw
//!   during `prepare` and only read that copy in `render`.
//! - Presentation resources are released before the model they were built from.

mod backend;
mod camera;
mod context;
mod disabled;
pub mod remote;
mod resources;
mod scene;

pub use backend::{BackendError, FrameBuffer, InputSnapshot, SceneView, UiLayer, ViewerBackend};
pub use camera::{FixedCamera, MouseAction, OrbitCamera};
pub use context::{ContextDevice, FontScale, RenderContext};
pub use disabled::DisabledBackend;
pub use remote::{RemoteBackend, SceneMessage};
pub use resources::{RenderParts, ResourceRequest, SceneResources};
pub use scene::{CameraPose, DEFAULT_VISIBLE_GROUPS, SceneError, VisualGeom, VisualScene};
