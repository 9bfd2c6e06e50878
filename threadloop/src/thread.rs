//! Named OS threads that run a message loop for their whole lifetime.

use crate::error::LoopError;
use crate::message_loop::MessageLoop;
use crate::runner::TaskRunner;

use std::any::Any;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// A thread dedicated to running one message loop.
///
/// Spawning a `LoopThread`:
/// - starts a named OS thread,
/// - installs a message loop on it,
/// - hands the loop's [`TaskRunner`] back to the spawner,
/// - runs the loop until it is terminated.
///
/// Joining (or dropping) the `LoopThread` terminates the loop and waits for
/// the thread to exit. Tasks still pending at that point are dropped with
/// the loop.
#[derive(Debug)]
pub struct LoopThread {
    name: String,
    runner: TaskRunner,
    handle: Option<JoinHandle<Result<(), LoopError>>>,
}

impl LoopThread {
    /// Spawns a loop thread with the platform's default stack size.
    ///
    /// # Errors
    ///
    /// - [`LoopError::Spawn`] if the OS cannot create the thread,
    /// - [`LoopError::WakeCreation`] if the loop cannot be created on it,
    /// - [`LoopError::ThreadStartup`] if the thread dies before reporting.
    pub fn spawn(name: impl Into<String>) -> Result<Self, LoopError> {
        Self::spawn_with_stack_size(name, None)
    }

    pub(crate) fn spawn_with_stack_size(
        name: impl Into<String>,
        stack_size: Option<usize>,
    ) -> Result<Self, LoopError> {
        let name = name.into();
        let (transmitter, receiver) = mpsc::sync_channel(1);

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }

        let span_name = name.clone();
        let handle = builder
            .spawn(move || {
                let span = tracing::debug_span!("loop_thread", name = %span_name);
                let _entered = span.enter();

                if let Err(err) = MessageLoop::ensure_initialized_for_current_thread() {
                    let _ = transmitter.send(Err(err));
                    return Ok(());
                }

                let message_loop = MessageLoop::current();
                let _ = transmitter.send(Ok(message_loop.task_runner()));
                drop(transmitter);

                message_loop.run()
            })
            .map_err(|source| LoopError::Spawn {
                name: name.clone(),
                source,
            })?;

        match receiver.recv() {
            Ok(Ok(runner)) => Ok(Self {
                name,
                runner,
                handle: Some(handle),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(LoopError::ThreadStartup(name))
            }
        }
    }

    /// The thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A task runner posting to this thread's loop.
    pub fn task_runner(&self) -> TaskRunner {
        self.runner.clone()
    }

    /// Terminates the loop and waits for the thread to exit.
    ///
    /// # Errors
    ///
    /// Returns the error the loop's `run` ended with, if any.
    ///
    /// # Panics
    ///
    /// Re-raises the panic of a task that unwound through the loop.
    pub fn join(mut self) -> Result<(), LoopError> {
        match self.shutdown() {
            Some(Ok(result)) => result,
            Some(Err(payload)) => std::panic::resume_unwind(payload),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) -> Option<thread::Result<Result<(), LoopError>>> {
        let handle = self.handle.take()?;

        self.runner.terminate();
        let joined = handle.join();

        tracing::debug!(name = %self.name, "loop thread joined");
        Some(joined)
    }
}

impl Drop for LoopThread {
    /// Terminates the loop and joins the thread.
    fn drop(&mut self) {
        match self.shutdown() {
            Some(Ok(Err(err))) => {
                tracing::warn!(name = %self.name, error = %err, "loop thread ended with an error");
            }
            Some(Err(payload)) => {
                tracing::error!(
                    name = %self.name,
                    panic = panic_message(payload.as_ref()),
                    "loop thread panicked"
                );
            }
            Some(Ok(Ok(()))) | None => {}
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
