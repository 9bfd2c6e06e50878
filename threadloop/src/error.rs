//! Error types returned by message loops and loop threads.

use crate::backend::LoopState;

use std::io;

/// Errors produced while creating, running or hosting a message loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The wake primitive backing the loop could not be created or armed.
    ///
    /// The loop is never installed when this happens.
    #[error("failed to create the loop wake primitive")]
    WakeCreation(#[source] io::Error),

    /// Blocking on the wake primitive failed while the loop was running.
    #[error("waiting on the loop wake primitive failed")]
    Wait(#[source] io::Error),

    /// An operation was attempted in a state that does not allow it.
    #[error("message loop is {found:?}, expected {expected:?}")]
    InvalidState {
        expected: LoopState,
        found: LoopState,
    },

    /// The OS refused to spawn a loop thread.
    #[error("failed to spawn loop thread `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A loop thread exited before handing back its task runner.
    #[error("loop thread `{0}` exited during startup")]
    ThreadStartup(String),
}
