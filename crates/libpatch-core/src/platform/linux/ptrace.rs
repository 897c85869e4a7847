//! `PtraceTracer`: peek, poke, attach and detach through `ptrace(2)`.

use std::io;

use libc::c_void;
use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, trace};

use crate::error::{PatchError, PatchResult};
use crate::tracer::{StopPoll, Tracer, Word};
use crate::types::{Address, ProcessId};

/// Tracer backed by the Linux `ptrace(2)` interface
///
/// Holds no state of its own; the kernel tracks which processes this thread
/// traces.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtraceTracer;

impl PtraceTracer
{
    /// Create a new tracer
    pub const fn new() -> Self
    {
        PtraceTracer
    }
}

fn to_pid(pid: ProcessId) -> PatchResult<Pid>
{
    i32::try_from(pid.raw())
        .map(Pid::from_raw)
        .map_err(|_| PatchError::InvalidArgument(format!("PID {pid} does not fit in pid_t")))
}

fn to_ptr(address: Address) -> PatchResult<ptrace::AddressType>
{
    usize::try_from(address.value())
        .map(|addr| addr as ptrace::AddressType)
        .map_err(|_| PatchError::InvalidArgument(format!("address {address} does not fit in a pointer")))
}

/// Map an errno from a lifecycle request (attach/detach/wait)
fn lifecycle_error(errno: Errno, pid: ProcessId, request: &str) -> PatchError
{
    match errno {
        Errno::EPERM => PatchError::PermissionDenied(format!("{request} on process {pid}: {errno}")),
        Errno::ESRCH | Errno::ECHILD => PatchError::NotFound(format!("process {pid} ({request}: {errno})")),
        _ => PatchError::Io(io::Error::from(errno)),
    }
}

/// Map an errno from a peek or poke
fn memory_error(errno: Errno, pid: ProcessId, address: Address) -> PatchError
{
    match errno {
        // ESRCH here means the target is not traced by us or not stopped.
        Errno::ESRCH => PatchError::InvalidState(format!("process {pid} is not stopped under this tracer")),
        _ => PatchError::AccessViolation {
            address,
            source: io::Error::from(errno),
        },
    }
}

impl Tracer for PtraceTracer
{
    fn attach(&mut self, pid: ProcessId) -> PatchResult<()>
    {
        debug!(%pid, "PTRACE_ATTACH");
        ptrace::attach(to_pid(pid)?).map_err(|e| lifecycle_error(e, pid, "PTRACE_ATTACH"))
    }

    fn poll_stopped(&mut self, pid: ProcessId) -> PatchResult<StopPoll>
    {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::__WALL;
        match waitpid(to_pid(pid)?, Some(flags)) {
            Ok(WaitStatus::Stopped(_, signal)) | Ok(WaitStatus::PtraceEvent(_, signal, _)) => {
                Ok(StopPoll::Stopped(signal as i32))
            }
            Ok(WaitStatus::Exited(_, code)) => Ok(StopPoll::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => Ok(StopPoll::Exited(signal as i32)),
            Ok(_) | Err(Errno::EINTR) => Ok(StopPoll::Running),
            Err(errno) => Err(lifecycle_error(errno, pid, "waitpid")),
        }
    }

    fn detach(&mut self, pid: ProcessId) -> PatchResult<()>
    {
        debug!(%pid, "PTRACE_DETACH");
        ptrace::detach(to_pid(pid)?, None).map_err(|e| lifecycle_error(e, pid, "PTRACE_DETACH"))
    }

    fn peek(&self, pid: ProcessId, address: Address) -> PatchResult<Word>
    {
        let word = ptrace::read(to_pid(pid)?, to_ptr(address)?).map_err(|e| memory_error(e, pid, address))?;
        trace!(%pid, %address, word = format_args!("{word:#x}"), "PTRACE_PEEKDATA");
        Ok(word.to_ne_bytes())
    }

    fn poke(&mut self, pid: ProcessId, address: Address, word: Word) -> PatchResult<()>
    {
        let data = libc::c_long::from_ne_bytes(word);
        let raw_pid = to_pid(pid)?.as_raw();
        let addr = to_ptr(address)?;
        trace!(%pid, %address, word = format_args!("{data:#x}"), "PTRACE_POKEDATA");

        // SAFETY: POKEDATA only writes into the tracee; no memory of this
        // process is read or written through `addr` or `data`.
        let result = unsafe { libc::ptrace(libc::PTRACE_POKEDATA, raw_pid, addr, data as *mut c_void) };
        if result == -1 {
            return Err(memory_error(Errno::last(), pid, address));
        }
        Ok(())
    }
}
