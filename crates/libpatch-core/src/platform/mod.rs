//! # Platform-Specific Implementations
//!
//! Each platform module implements the [`Tracer`](crate::tracer::Tracer)
//! trait using that platform's native tracing API:
//!
//! - **linux**: `ptrace(2)` and `waitpid(2)` (also used on Android)
//!   - See: [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - **simulated**: an in-memory address space with no real process behind
//!   it, used by the test suites on every platform

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod linux;

pub mod simulated;
