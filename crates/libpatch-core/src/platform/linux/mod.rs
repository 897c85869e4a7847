//! # Linux Tracer
//!
//! `ptrace(2)`-based implementation of [`Tracer`](crate::tracer::Tracer).
//!
//! ## ptrace requests used
//!
//! - `PTRACE_ATTACH`: start tracing; the kernel sends the target `SIGSTOP`
//! - `waitpid(WNOHANG | __WALL)`: observe the resulting stop without blocking
//! - `PTRACE_PEEKDATA` / `PTRACE_POKEDATA`: move one `long` in or out of the target
//! - `PTRACE_DETACH`: stop tracing and let the target run
//!
//! On Linux text and data share one address space, so the `*TEXT` and
//! `*DATA` requests are interchangeable.
//!
//! ## References
//!
//! - [ptrace(2)](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [waitpid(2)](https://man7.org/linux/man-pages/man2/waitpid.2.html)

mod ptrace;

pub use ptrace::PtraceTracer;
