//! # Attach Controller
//!
//! [`ProcessHandle`] owns a [`Tracer`] and drives the tracing state machine
//! for one process:
//!
//! ```text
//! Detached --attach--> Attached --detach--> Detached
//! ```
//!
//! No other transitions are permitted: attaching an attached handle or
//! detaching a detached one fails with `InvalidState` and changes nothing.
//!
//! ## Waiting for the stop
//!
//! After the attach request the target is sent `SIGSTOP`; the handle polls the
//! tracer until the stop is reported. [`AttachOptions`] bounds that wait:
//!
//! - `timeout: None` waits forever, like a blocking `waitpid`
//! - `timeout: Some(d)` gives up after `d` with `AttachTimeout`
//! - `cancel` lets another thread (a Ctrl-C handler) abort with `AttachCancelled`
//!
//! On timeout, cancellation or target exit the handle issues a best-effort
//! detach and is left `Detached`.
//!
//! ## Example
//!
//! ```rust
//! use libpatch_core::platform::simulated::SimulatedTracer;
//! use libpatch_core::session::{AttachOptions, ProcessHandle};
//! use libpatch_core::types::{ProcessId, TracingState};
//!
//! let pid = ProcessId::from(42);
//! let mut handle = ProcessHandle::new(pid, SimulatedTracer::new(pid));
//! handle.attach(&AttachOptions::default())?;
//! assert_eq!(handle.state(), TracingState::Attached);
//! handle.detach()?;
//! assert!(handle.detach().is_err());
//! # Ok::<(), libpatch_core::error::PatchError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{PatchError, PatchResult};
use crate::tracer::{create_tracer, StopPoll, Tracer, Word};
use crate::types::{Address, ProcessId, TracingState};

/// Default delay between two stop polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long and how `attach` waits for the target to stop
#[derive(Debug, Clone)]
pub struct AttachOptions
{
    /// Give up after this long (`None` = wait forever)
    pub timeout: Option<Duration>,
    /// Delay between two non-blocking stop checks
    pub poll_interval: Duration,
    /// Raised by another thread to abandon the wait
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for AttachOptions
{
    fn default() -> Self
    {
        Self {
            timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
        }
    }
}

impl AttachOptions
{
    /// Wait at most `timeout` for the stop
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self
    {
        self.timeout = Some(timeout);
        self
    }

    /// Poll every `interval`
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self
    {
        self.poll_interval = interval;
        self
    }

    /// Abandon the wait once `flag` is set
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self
    {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool
    {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// A process and the tracer attached (or attachable) to it
///
/// Dropping an attached handle detaches on a best-effort basis; call
/// [`detach`](Self::detach) to observe errors.
pub struct ProcessHandle<T: Tracer = Box<dyn Tracer>>
{
    pid: ProcessId,
    state: TracingState,
    tracer: T,
}

impl ProcessHandle<Box<dyn Tracer>>
{
    /// Create a handle for `pid` using the platform tracer, then attach
    ///
    /// ## Errors
    ///
    /// Anything [`create_tracer`] or [`attach`](Self::attach) returns.
    pub fn attach_to(pid: ProcessId, options: &AttachOptions) -> PatchResult<Self>
    {
        let mut handle = Self::new(pid, create_tracer()?);
        handle.attach(options)?;
        Ok(handle)
    }
}

impl<T: Tracer> ProcessHandle<T>
{
    /// Create a detached handle
    pub fn new(pid: ProcessId, tracer: T) -> Self
    {
        Self {
            pid,
            state: TracingState::Detached,
            tracer,
        }
    }

    /// The process this handle refers to
    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// Current tracing state
    pub fn state(&self) -> TracingState
    {
        self.state
    }

    /// Whether peek/poke are currently allowed
    pub fn is_attached(&self) -> bool
    {
        self.state == TracingState::Attached
    }

    /// Borrow the tracer
    pub fn tracer(&self) -> &T
    {
        &self.tracer
    }

    /// Attach and wait for the target to stop
    ///
    /// ## Errors
    ///
    /// - `InvalidState`: the handle is already attached
    /// - `NotFound` / `PermissionDenied`: the tracer refused the attach
    ///   (a second tracer on the same process lands here)
    /// - `AttachTimeout` / `AttachCancelled`: the stop was not observed in time
    /// - `ProcessExited`: the target died before stopping
    pub fn attach(&mut self, options: &AttachOptions) -> PatchResult<()>
    {
        if self.state == TracingState::Attached {
            return Err(PatchError::InvalidState(format!("process {} is already attached", self.pid)));
        }

        self.tracer.attach(self.pid)?;
        info!(pid = %self.pid, "Attached to process, waiting for stop");

        match self.wait_for_stop(options) {
            Ok(signal) => {
                self.state = TracingState::Attached;
                debug!(pid = %self.pid, signal, "Process stopped");
                Ok(())
            }
            Err(err) => {
                if !matches!(err, PatchError::ProcessExited(_)) {
                    if let Err(detach_err) = self.tracer.detach(self.pid) {
                        warn!(pid = %self.pid, error = %detach_err, "Best-effort detach after failed attach failed");
                    }
                }
                self.state = TracingState::Detached;
                Err(err)
            }
        }
    }

    fn wait_for_stop(&mut self, options: &AttachOptions) -> PatchResult<i32>
    {
        let started = Instant::now();
        loop {
            match self.tracer.poll_stopped(self.pid)? {
                StopPoll::Stopped(signal) => return Ok(signal),
                StopPoll::Exited(_) => return Err(PatchError::ProcessExited(self.pid.raw())),
                StopPoll::Running => {}
            }

            if options.is_cancelled() {
                return Err(PatchError::AttachCancelled(self.pid.raw()));
            }
            if let Some(timeout) = options.timeout {
                if started.elapsed() >= timeout {
                    return Err(PatchError::AttachTimeout {
                        pid: self.pid.raw(),
                        timeout,
                    });
                }
            }
            thread::sleep(options.poll_interval);
        }
    }

    /// Detach; the process resumes
    ///
    /// The handle returns to `Detached` even if the tracer reports an error
    /// (the process most likely exited), and the error is returned.
    ///
    /// ## Errors
    ///
    /// - `InvalidState`: the handle is not attached
    pub fn detach(&mut self) -> PatchResult<()>
    {
        if self.state != TracingState::Attached {
            return Err(PatchError::InvalidState(format!("process {} is not attached", self.pid)));
        }
        self.state = TracingState::Detached;
        self.tracer.detach(self.pid)?;
        info!(pid = %self.pid, "Detached from process");
        Ok(())
    }

    /// Peek one word through the tracer
    ///
    /// ## Errors
    ///
    /// - `InvalidState`: the handle is not attached
    /// - `AccessViolation`: see [`Tracer::peek`]
    pub fn peek(&self, address: Address) -> PatchResult<Word>
    {
        self.ensure_attached()?;
        self.tracer.peek(self.pid, address)
    }

    /// Poke one word through the tracer
    ///
    /// ## Errors
    ///
    /// - `InvalidState`: the handle is not attached
    /// - `AccessViolation`: see [`Tracer::poke`]
    pub fn poke(&mut self, address: Address, word: Word) -> PatchResult<()>
    {
        self.ensure_attached()?;
        self.tracer.poke(self.pid, address, word)
    }

    fn ensure_attached(&self) -> PatchResult<()>
    {
        if self.state == TracingState::Attached {
            Ok(())
        } else {
            Err(PatchError::InvalidState(format!("process {} is not attached", self.pid)))
        }
    }
}

impl<T: Tracer> Drop for ProcessHandle<T>
{
    fn drop(&mut self)
    {
        if self.state == TracingState::Attached {
            self.state = TracingState::Detached;
            if let Err(err) = self.tracer.detach(self.pid) {
                warn!(pid = %self.pid, error = %err, "Best-effort detach on drop failed");
            }
        }
    }
}

impl<T: Tracer> std::fmt::Debug for ProcessHandle<T>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
