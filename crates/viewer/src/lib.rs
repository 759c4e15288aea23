//! Viewer dispatch and the application shell that ties a simulation to it.
//!
//! # Invariants
//! - A viewer holds exactly one backend, fixed at construction. A backend
//!   that cannot be built leaves the viewer degraded, never failed.
//! - The viewer borrows the model and state only inside `prepare`.
//! - In threaded runs one lock serializes `step` against `prepare`;
//!   `render` runs outside it.

mod shell;
mod threaded;
mod viewer;

pub use shell::{ApplicationShell, RunOutcome};
pub use threaded::ThreadedRun;
pub use viewer::{Viewer, ViewerStats, ViewerStatus};
