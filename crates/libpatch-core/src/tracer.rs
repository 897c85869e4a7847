//! # Tracer Trait
//!
//! The seam between the attach controller and the operating system's
//! process-tracing facility.
//!
//! A tracer knows how to start and stop tracing a process, how to tell
//! whether the target has reached a stop, and how to move single machine
//! words in and out of its memory (peek/poke). Everything above it (the
//! session state machine, the typed reader and writer) is platform-agnostic:
//!
//! - **Linux/Android**: [`PtraceTracer`](crate::platform::linux::PtraceTracer), `ptrace(2)` + `waitpid(2)`
//! - **Tests**: [`SimulatedTracer`](crate::platform::simulated::SimulatedTracer), an in-memory address space
//!
//! ## Word lanes
//!
//! A [`Word`] is the bytes of one machine word in target memory order, so
//! `word[0]` is the byte at the peeked address. Platform implementations
//! convert from the native `long` returned by the kernel.

use crate::error::PatchResult;
use crate::types::{Address, ProcessId};

/// Size in bytes of the word moved by one peek or poke.
pub const WORD_SIZE: usize = std::mem::size_of::<libc::c_long>();

/// One machine word, in target memory order.
pub type Word = [u8; WORD_SIZE];

/// Result of a non-blocking check for the target's stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPoll
{
    /// No state change reported yet
    Running,
    /// The target is in a traced stop (the signal that stopped it)
    Stopped(i32),
    /// The target exited or was killed (exit code or signal number)
    Exited(i32),
}

/// Process-tracing backend
///
/// ## Lifecycle
///
/// 1. `attach(pid)` requests tracing
/// 2. `poll_stopped(pid)` until it reports [`StopPoll::Stopped`]
/// 3. `peek`/`poke` while stopped
/// 4. `detach(pid)` resumes the process
///
/// The [`ProcessHandle`](crate::session::ProcessHandle) drives this sequence
/// and enforces the state machine; tracers only issue the requests.
///
/// ## Thread Safety
///
/// `ptrace(2)` binds the tracee to the tracing *thread*. A tracer must be
/// used from the thread that attached.
pub trait Tracer
{
    /// Request tracing of `pid`
    ///
    /// ## Errors
    ///
    /// - `NotFound`: no such process
    /// - `PermissionDenied`: not allowed to trace it (already traced, ptrace scope, ...)
    fn attach(&mut self, pid: ProcessId) -> PatchResult<()>;

    /// Check, without blocking, whether the target has stopped
    fn poll_stopped(&mut self, pid: ProcessId) -> PatchResult<StopPoll>;

    /// Stop tracing `pid`; the process resumes
    fn detach(&mut self, pid: ProcessId) -> PatchResult<()>;

    /// Read the word at `address`
    ///
    /// ## Errors
    ///
    /// - `AccessViolation`: the word is unmapped or unreadable
    fn peek(&self, pid: ProcessId, address: Address) -> PatchResult<Word>;

    /// Overwrite the word at `address`
    ///
    /// ## Errors
    ///
    /// - `AccessViolation`: the word is unmapped or not writable through the tracer
    fn poke(&mut self, pid: ProcessId, address: Address, word: Word) -> PatchResult<()>;
}

impl<T: Tracer + ?Sized> Tracer for Box<T>
{
    fn attach(&mut self, pid: ProcessId) -> PatchResult<()>
    {
        (**self).attach(pid)
    }

    fn poll_stopped(&mut self, pid: ProcessId) -> PatchResult<StopPoll>
    {
        (**self).poll_stopped(pid)
    }

    fn detach(&mut self, pid: ProcessId) -> PatchResult<()>
    {
        (**self).detach(pid)
    }

    fn peek(&self, pid: ProcessId, address: Address) -> PatchResult<Word>
    {
        (**self).peek(pid, address)
    }

    fn poke(&mut self, pid: ProcessId, address: Address, word: Word) -> PatchResult<()>
    {
        (**self).poke(pid, address, word)
    }
}

/// Factory function to create the platform's tracer
///
/// ## Example
///
/// ```rust,no_run
/// use libpatch_core::session::{AttachOptions, ProcessHandle};
/// use libpatch_core::tracer::create_tracer;
/// use libpatch_core::types::ProcessId;
///
/// let mut handle = ProcessHandle::new(ProcessId::from(12345), create_tracer()?);
/// handle.attach(&AttachOptions::default())?;
/// # Ok::<(), libpatch_core::error::PatchError>(())
/// ```
///
/// ## Platform Support
///
/// - ✅ Linux / Android: Returns `PtraceTracer`
/// - ❌ Anything else: `InvalidArgument`
pub fn create_tracer() -> PatchResult<Box<dyn Tracer>>
{
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        Ok(Box::new(crate::platform::linux::PtraceTracer::new()))
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        Err(crate::error::PatchError::InvalidArgument(format!(
            "Process tracing not implemented for platform: {}",
            std::env::consts::OS
        )))
    }
}
