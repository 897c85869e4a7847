//! # Types
//!
//! Plain data shared by the locator, the attach controller and the
//! reader/writer: addresses, process and module descriptions, and the tagged
//! patch values with their byte encodings.

pub mod address;
pub mod process;
pub mod value;

// Re-export all public types
pub use address::{format_offset, Address};
pub use process::{MemoryRegion, ModuleBase, ModuleMatch, ProcessEntry, ProcessId, TracingState};
pub use value::{format_hex, parse_hex_bytes, parse_int, PatchValue, ValueKind, ARM_NOP, ARM_RET, NO_STRING_SENTINEL};
