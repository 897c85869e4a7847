//! # libpatch-core
//!
//! Locate a running process, attach to it with the operating system's
//! process tracer and patch typed values at offsets from a loaded module's
//! base address. Also patches a module's on-disk image through a memory map.
//!
//! ## Flow
//!
//! ```text
//! ProcessLocator ──pid, module base──▶ ProcessHandle::attach
//!                                            │
//!                          MemoryReader / MemoryWriter (base + offset)
//!                                            │
//!                                     ProcessHandle::detach
//! ```
//!
//! ## Platform Support
//!
//! - **Linux / Android**: `ptrace(2)` through [`PtraceTracer`](platform::linux::PtraceTracer)
//! - **Everywhere**: [`SimulatedTracer`](platform::simulated::SimulatedTracer) for tests
//!
//! ## Why unsafe code is needed
//!
//! `PTRACE_POKEDATA`, `mprotect(2)` and file mappings are raw system
//! interfaces. They are wrapped in safe functions where the invariants can be
//! checked locally; [`protect::protect`] stays `unsafe` because it changes the
//! protection of arbitrary pages in this process.

#![allow(unsafe_code)] // ptrace, mprotect and mmap

pub mod error;
pub mod file_patch;
pub mod locator;
pub mod memory;
pub mod platform;
pub mod prelude;
pub mod protect;
pub mod session;
pub mod tracer;
pub mod types;

pub use error::{PatchError, PatchResult};
pub use file_patch::put_static_bytes;
pub use locator::ProcessLocator;
pub use memory::{MemoryReader, MemoryWriter, ReaderOptions};
pub use session::{AttachOptions, ProcessHandle};
pub use tracer::{create_tracer, Tracer};
pub use types::{Address, ModuleBase, ModuleMatch, PatchValue, ProcessId, ValueKind};
