//! Common module for library exports

pub use crate::error::{PatchError, PatchResult};
pub use crate::file_patch::put_static_bytes;
pub use crate::locator::{list_installed_packages, ProcessLocator};
pub use crate::memory::{MemoryReader, MemoryWriter, ReaderOptions};
pub use crate::protect::{protect, ProtectionMode};
pub use crate::session::{AttachOptions, ProcessHandle};
pub use crate::tracer::{create_tracer, Tracer};
pub use crate::types::address::{format_offset, Address};
pub use crate::types::process::{MemoryRegion, ModuleBase, ModuleMatch, ProcessEntry, ProcessId, TracingState};
pub use crate::types::value::{PatchValue, ValueKind, ARM_NOP, ARM_RET};
