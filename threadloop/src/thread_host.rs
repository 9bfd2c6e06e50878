//! The set of loop threads an engine instance runs on.
//!
//! An engine instance works with four task runners: platform, UI, GPU
//! (raster) and I/O. A [`ThreadHost`] owns the loop threads backing some or
//! all of them; runners for threads the host does not own (typically the
//! platform thread, which belongs to the embedder) are supplied by the
//! caller when assembling [`TaskRunners`].

use crate::error::LoopError;
use crate::runner::TaskRunner;
use crate::thread::LoopThread;

use std::fmt;
use std::ops::BitOr;

/// A set of engine thread kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ThreadTypes(u8);

impl ThreadTypes {
    pub const NONE: ThreadTypes = ThreadTypes(0);
    pub const PLATFORM: ThreadTypes = ThreadTypes(1 << 0);
    pub const UI: ThreadTypes = ThreadTypes(1 << 1);
    pub const GPU: ThreadTypes = ThreadTypes(1 << 2);
    pub const IO: ThreadTypes = ThreadTypes(1 << 3);
    pub const ALL: ThreadTypes = ThreadTypes(0b1111);

    /// Returns `true` if every kind in `other` is in `self`.
    pub const fn contains(self, other: ThreadTypes) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ThreadTypes {
    type Output = ThreadTypes;

    fn bitor(self, rhs: ThreadTypes) -> ThreadTypes {
        ThreadTypes(self.0 | rhs.0)
    }
}

/// Builder for a [`ThreadHost`].
///
/// # Examples
///
/// ```rust
/// use threadloop::{ThreadHost, ThreadTypes};
///
/// let host = ThreadHost::builder("shell")
///     .types(ThreadTypes::UI | ThreadTypes::IO)
///     .build()
///     .unwrap();
///
/// assert_eq!(host.ui.as_ref().unwrap().name(), "shell.ui");
/// assert!(host.gpu.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ThreadHostBuilder {
    prefix: String,
    types: ThreadTypes,
    stack_size: Option<usize>,
}

impl ThreadHostBuilder {
    /// Creates a builder for all four threads, named after `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            types: ThreadTypes::ALL,
            stack_size: None,
        }
    }

    /// Selects which threads the host creates.
    pub fn types(mut self, types: ThreadTypes) -> Self {
        self.types = types;
        self
    }

    /// Sets the stack size of every created thread.
    ///
    /// # Panics
    ///
    /// Panics if `size == 0`.
    pub fn stack_size(mut self, size: usize) -> Self {
        assert!(size > 0, "stack_size must be > 0");

        self.stack_size = Some(size);
        self
    }

    /// Spawns the selected threads.
    ///
    /// Threads are named `<prefix>.platform`, `<prefix>.ui`, `<prefix>.gpu`
    /// and `<prefix>.io`. If any thread fails to start, the ones already
    /// started are terminated and joined.
    pub fn build(self) -> Result<ThreadHost, LoopError> {
        let mut host = ThreadHost::default();

        host.platform = self.spawn_if(ThreadTypes::PLATFORM, "platform")?;
        host.ui = self.spawn_if(ThreadTypes::UI, "ui")?;
        host.gpu = self.spawn_if(ThreadTypes::GPU, "gpu")?;
        host.io = self.spawn_if(ThreadTypes::IO, "io")?;

        tracing::debug!(prefix = %self.prefix, types = ?self.types, "thread host started");
        Ok(host)
    }

    fn spawn_if(&self, kind: ThreadTypes, suffix: &str) -> Result<Option<LoopThread>, LoopError> {
        if !self.types.contains(kind) {
            return Ok(None);
        }

        let name = format!("{}.{}", self.prefix, suffix);
        LoopThread::spawn_with_stack_size(name, self.stack_size).map(Some)
    }
}

/// Owner of an engine instance's loop threads.
#[derive(Debug, Default)]
pub struct ThreadHost {
    pub platform: Option<LoopThread>,
    pub ui: Option<LoopThread>,
    pub gpu: Option<LoopThread>,
    pub io: Option<LoopThread>,
}

impl ThreadHost {
    /// Returns a builder for threads named after `prefix`.
    pub fn builder(prefix: impl Into<String>) -> ThreadHostBuilder {
        ThreadHostBuilder::new(prefix)
    }

    /// Spawns the threads selected by `types`, named after `prefix`.
    pub fn new(prefix: impl Into<String>, types: ThreadTypes) -> Result<Self, LoopError> {
        ThreadHostBuilder::new(prefix).types(types).build()
    }

    /// Assembles the engine's task runners.
    ///
    /// Each kind uses the runner of the host's thread when the host owns
    /// one, and `fallback` otherwise.
    pub fn task_runners(&self, label: impl Into<String>, fallback: &TaskRunner) -> TaskRunners {
        let pick = |thread: &Option<LoopThread>| {
            thread
                .as_ref()
                .map_or_else(|| fallback.clone(), LoopThread::task_runner)
        };

        TaskRunners::new(
            label,
            pick(&self.platform),
            pick(&self.ui),
            pick(&self.gpu),
            pick(&self.io),
        )
    }

    /// Terminates and joins every thread, I/O first and platform last.
    pub fn reset(&mut self) {
        drop(self.io.take());
        drop(self.gpu.take());
        drop(self.ui.take());
        drop(self.platform.take());
    }
}

impl Drop for ThreadHost {
    fn drop(&mut self) {
        self.reset();
    }
}

/// The task runners an engine component is constructed with.
#[derive(Clone)]
pub struct TaskRunners {
    label: String,
    platform: TaskRunner,
    ui: TaskRunner,
    gpu: TaskRunner,
    io: TaskRunner,
}

impl TaskRunners {
    pub fn new(
        label: impl Into<String>,
        platform: TaskRunner,
        ui: TaskRunner,
        gpu: TaskRunner,
        io: TaskRunner,
    ) -> Self {
        Self {
            label: label.into(),
            platform,
            ui,
            gpu,
            io,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn platform_task_runner(&self) -> &TaskRunner {
        &self.platform
    }

    pub fn ui_task_runner(&self) -> &TaskRunner {
        &self.ui
    }

    pub fn gpu_task_runner(&self) -> &TaskRunner {
        &self.gpu
    }

    pub fn io_task_runner(&self) -> &TaskRunner {
        &self.io
    }
}

impl fmt::Debug for TaskRunners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunners")
            .field("label", &self.label)
            .field("platform", &self.platform.loop_id())
            .field("ui", &self.ui.loop_id())
            .field("gpu", &self.gpu.loop_id())
            .field("io", &self.io.loop_id())
            .finish()
    }
}
