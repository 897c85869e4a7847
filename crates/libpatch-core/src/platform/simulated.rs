//! # Simulated Tracer
//!
//! An in-memory stand-in for a traced process. It keeps a set of mapped
//! regions with their bytes and answers peek/poke exactly like the kernel
//! would: a word is accessible only if every byte of it is mapped.
//!
//! It also models the parts of the tracer lifecycle that the session state
//! machine depends on:
//! - only one tracer per process (a second `attach` is refused)
//! - the target can be told to never stop, to exercise attach timeouts
//! - the target can be marked as exited
//!
//! ## Example
//!
//! ```rust
//! use libpatch_core::platform::simulated::SimulatedTracer;
//! use libpatch_core::types::{Address, ProcessId};
//!
//! let tracer = SimulatedTracer::new(ProcessId::from(42)).with_region(Address::from(0x1000), 0x100);
//! assert_eq!(tracer.bytes(Address::from(0x1000), 4), Some(vec![0, 0, 0, 0]));
//! ```

use std::cell::Cell;
use std::collections::BTreeMap;
use std::io;

use tracing::trace;

use crate::error::{PatchError, PatchResult};
use crate::tracer::{StopPoll, Tracer, Word, WORD_SIZE};
use crate::types::{Address, ProcessId};

/// How the simulated target reacts after `attach`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBehavior
{
    /// The first poll sees the stop
    #[default]
    Immediately,
    /// Reports `Running` for this many polls, then stops
    AfterPolls(u32),
    /// Never stops
    Never,
    /// Exits with the given code instead of stopping
    Exits(i32),
}

/// In-memory [`Tracer`] for tests
#[derive(Debug, Clone)]
pub struct SimulatedTracer
{
    pid: ProcessId,
    regions: BTreeMap<u64, Vec<u8>>,
    stop_behavior: StopBehavior,
    polls: u32,
    traced: bool,
    peeks: Cell<usize>,
    pokes: usize,
    attach_calls: usize,
    detach_calls: usize,
}

impl SimulatedTracer
{
    /// Create a simulated process with no mapped memory
    pub fn new(pid: ProcessId) -> Self
    {
        Self {
            pid,
            regions: BTreeMap::new(),
            stop_behavior: StopBehavior::Immediately,
            polls: 0,
            traced: false,
            peeks: Cell::new(0),
            pokes: 0,
            attach_calls: 0,
            detach_calls: 0,
        }
    }

    /// Map `len` zeroed bytes at `start`
    #[must_use]
    pub fn with_region(mut self, start: Address, len: usize) -> Self
    {
        self.regions.insert(start.value(), vec![0; len]);
        self
    }

    /// Map `bytes` at `start`
    #[must_use]
    pub fn with_bytes(mut self, start: Address, bytes: &[u8]) -> Self
    {
        self.regions.insert(start.value(), bytes.to_vec());
        self
    }

    /// Choose how the target reacts to `attach`
    #[must_use]
    pub fn with_stop_behavior(mut self, behavior: StopBehavior) -> Self
    {
        self.stop_behavior = behavior;
        self
    }

    /// Simulate another tracer already holding the process
    #[must_use]
    pub fn already_traced(mut self) -> Self
    {
        self.traced = true;
        self
    }

    /// Copy `len` bytes starting at `address`, if all of them are mapped
    pub fn bytes(&self, address: Address, len: usize) -> Option<Vec<u8>>
    {
        (0..len as u64).map(|i| self.byte(address + i)).collect()
    }

    /// Whether the simulated process is currently traced
    pub fn is_traced(&self) -> bool
    {
        self.traced
    }

    /// Number of successful peeks so far
    pub fn peek_count(&self) -> usize
    {
        self.peeks.get()
    }

    /// Number of successful pokes so far
    pub fn poke_count(&self) -> usize
    {
        self.pokes
    }

    /// Number of `attach` requests received
    pub fn attach_calls(&self) -> usize
    {
        self.attach_calls
    }

    /// Number of `detach` requests received
    pub fn detach_calls(&self) -> usize
    {
        self.detach_calls
    }

    fn locate(&self, address: u64) -> Option<(u64, usize)>
    {
        let (start, bytes) = self.regions.range(..=address).next_back()?;
        let index = usize::try_from(address - start).ok()?;
        (index < bytes.len()).then_some((*start, index))
    }

    fn byte(&self, address: Address) -> Option<u8>
    {
        let (start, index) = self.locate(address.value())?;
        self.regions.get(&start).map(|bytes| bytes[index])
    }

    fn check_pid(&self, pid: ProcessId) -> PatchResult<()>
    {
        if pid == self.pid {
            Ok(())
        } else {
            Err(PatchError::NotFound(format!("process {pid}")))
        }
    }

    fn fault(address: Address) -> PatchError
    {
        PatchError::AccessViolation {
            address,
            source: io::Error::from_raw_os_error(libc::EIO),
        }
    }
}

impl Tracer for SimulatedTracer
{
    fn attach(&mut self, pid: ProcessId) -> PatchResult<()>
    {
        self.check_pid(pid)?;
        self.attach_calls += 1;
        if self.traced {
            return Err(PatchError::PermissionDenied(format!("process {pid} is already traced")));
        }
        self.traced = true;
        self.polls = 0;
        Ok(())
    }

    fn poll_stopped(&mut self, pid: ProcessId) -> PatchResult<StopPoll>
    {
        self.check_pid(pid)?;
        let polls = self.polls;
        self.polls = self.polls.saturating_add(1);
        Ok(match self.stop_behavior {
            StopBehavior::Immediately => StopPoll::Stopped(libc::SIGSTOP),
            StopBehavior::AfterPolls(n) if polls >= n => StopPoll::Stopped(libc::SIGSTOP),
            StopBehavior::AfterPolls(_) | StopBehavior::Never => StopPoll::Running,
            StopBehavior::Exits(code) => StopPoll::Exited(code),
        })
    }

    fn detach(&mut self, pid: ProcessId) -> PatchResult<()>
    {
        self.check_pid(pid)?;
        self.detach_calls += 1;
        if !self.traced {
            return Err(PatchError::NotFound(format!("process {pid} is not traced")));
        }
        self.traced = false;
        Ok(())
    }

    fn peek(&self, pid: ProcessId, address: Address) -> PatchResult<Word>
    {
        self.check_pid(pid)?;
        let mut word = [0u8; WORD_SIZE];
        for (i, lane) in word.iter_mut().enumerate() {
            *lane = self.byte(address + i as u64).ok_or_else(|| Self::fault(address))?;
        }
        self.peeks.set(self.peeks.get() + 1);
        trace!(%pid, %address, "simulated peek");
        Ok(word)
    }

    fn poke(&mut self, pid: ProcessId, address: Address, word: Word) -> PatchResult<()>
    {
        self.check_pid(pid)?;
        let mut targets = Vec::with_capacity(WORD_SIZE);
        for i in 0..WORD_SIZE as u64 {
            targets.push(self.locate((address + i).value()).ok_or_else(|| Self::fault(address))?);
        }
        for ((start, index), value) in targets.into_iter().zip(word) {
            if let Some(bytes) = self.regions.get_mut(&start) {
                bytes[index] = value;
            }
        }
        self.pokes += 1;
        trace!(%pid, %address, "simulated poke");
        Ok(())
    }
}
