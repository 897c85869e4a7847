//! # Error Types
//!
//! General error handling for locating, attaching to and patching processes.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::time::Duration;

use thiserror::Error;

use crate::types::Address;

/// Main error type for patch operations
///
/// This enum represents all the ways a lookup, attach, read or write can fail.
/// Nothing in this crate retries: every error is surfaced to the caller as-is.
///
/// ## Error Categories
///
/// 1. **Lookup errors**: NotFound
/// 2. **State errors**: InvalidState, AttachTimeout, AttachCancelled, ProcessExited
/// 3. **Memory errors**: AccessViolation, UnterminatedString
/// 4. **Permission errors**: PermissionDenied, InvalidProtectionMode
/// 5. **Argument errors**: InvalidArgument
/// 6. **I/O errors**: Io (file open/map/flush in file-patch mode, `/proc` reads)
#[derive(Error, Debug)]
pub enum PatchError
{
    /// A process or module lookup found nothing
    ///
    /// This happens when:
    /// - No process table entry has the requested command line
    /// - No line of the maps listing mentions the requested module
    /// - The maps listing cannot be opened (the process went away)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The attach/detach state machine was driven through a forbidden transition
    ///
    /// Attaching an already attached handle, detaching a detached one, or
    /// peeking/poking through a handle that is not attached.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A peek or poke hit unmapped or protected memory in the target
    #[error("Access violation at {address}: {source}")]
    AccessViolation
    {
        /// Address of the word that failed
        address: Address,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A string read scanned `limit` bytes without seeing a NUL terminator
    #[error("Unterminated string at {address}: no NUL within {limit} bytes")]
    UnterminatedString
    {
        /// Address the scan started at
        address: Address,
        /// Maximum number of bytes that were scanned
        limit: usize,
    },

    /// `protect()` was given a mode string it does not understand
    ///
    /// The protection change is not applied.
    #[error("Invalid protection mode '{0}': provide 'rwx' (777), 'rw' (766), 'rx' (755) or 'r' (444)")]
    InvalidProtectionMode(String),

    /// The target never reported a stop within the caller's timeout
    ///
    /// The handle is left detached.
    #[error("Timed out after {timeout:?} waiting for process {pid} to stop")]
    AttachTimeout
    {
        /// Process that was being attached
        pid: u32,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// The caller raised the cancel flag while waiting for the target to stop
    #[error("Attach to process {0} was cancelled")]
    AttachCancelled(u32),

    /// The target exited while we were waiting on it
    #[error("Process {0} exited")]
    ProcessExited(u32),

    /// Insufficient permissions to trace the target process
    ///
    /// On Linux this usually means the caller is neither root nor the parent
    /// of the target, or `kernel.yama.ptrace_scope` forbids the attach.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid argument passed to a patch function
    ///
    /// Examples:
    /// - Malformed hex-pair string
    /// - `base + offset` overflows the address space
    /// - File patch outside the file's length
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (opening, mapping or flushing files, reading `/proc`)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, PatchError>`
///
/// ```rust
/// use libpatch_core::error::PatchResult;
/// fn foo() -> PatchResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type PatchResult<T> = std::result::Result<T, PatchError>;
