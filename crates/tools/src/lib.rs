//! Developer tooling: read-only inspection of a loaded model and its state.
//!
//! # Invariants
//! - Tools never mutate the model or the state they inspect.

mod inspector;

pub use inspector::{EntityInfo, JointReadout, ModelInspector, ModelSummary};
