//! Terminal error paths.
//!
//! Precondition violations are programmer errors and unwind after logging.
//! Release failures leave the native resource graph corrupt, so they abort.

use crate::handle::ReleaseError;

#[track_caller]
pub fn precondition_violation(what: &str) -> ! {
    tracing::error!("precondition violated: {what}");
    panic!("precondition violated: {what}");
}

pub fn release_failure(err: &ReleaseError) -> ! {
    tracing::error!("{err}; aborting");
    std::process::abort();
}
