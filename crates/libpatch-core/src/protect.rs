//! # Page Protection
//!
//! Changes the protection of pages in this process's own address space with
//! `mprotect(2)`. File-patch mode uses it to make a mapped code page writable
//! and then executable again.
//!
//! ## Modes
//!
//! | mode  | octal | protection            |
//! |-------|-------|-----------------------|
//! | `r`   | `444` | read                  |
//! | `rw`  | `766` | read + write          |
//! | `rx`  | `755` | read + execute        |
//! | `rwx` | `777` | read + write + execute|
//!
//! Any other string is rejected with `InvalidProtectionMode` and nothing is
//! changed.

use std::fmt;
use std::io;
use std::str::FromStr;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{PatchError, PatchResult};

static SYSTEM_PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|&size| size > 0).unwrap_or(4096)
});

/// Size of one memory page on this system
pub fn page_size() -> usize
{
    *SYSTEM_PAGE_SIZE
}

/// Round `address` down to the start of its page
pub fn page_align_down(address: usize) -> usize
{
    address & !(page_size() - 1)
}

/// A page protection accepted by [`protect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionMode
{
    /// `r` / `444`: read only
    Read,
    /// `rw` / `766`: read and write
    ReadWrite,
    /// `rx` / `755`: read and execute
    ReadExecute,
    /// `rwx` / `777`: read, write and execute
    ReadWriteExecute,
}

impl ProtectionMode
{
    /// The `PROT_*` flags for this mode
    pub fn to_prot(self) -> libc::c_int
    {
        match self {
            ProtectionMode::Read => libc::PROT_READ,
            ProtectionMode::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            ProtectionMode::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
            ProtectionMode::ReadWriteExecute => libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        }
    }
}

impl FromStr for ProtectionMode
{
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s {
            "r" | "444" => Ok(ProtectionMode::Read),
            "rw" | "766" => Ok(ProtectionMode::ReadWrite),
            "rx" | "755" => Ok(ProtectionMode::ReadExecute),
            "rwx" | "777" => Ok(ProtectionMode::ReadWriteExecute),
            _ => Err(PatchError::InvalidProtectionMode(s.to_string())),
        }
    }
}

impl fmt::Display for ProtectionMode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            ProtectionMode::Read => "r",
            ProtectionMode::ReadWrite => "rw",
            ProtectionMode::ReadExecute => "rx",
            ProtectionMode::ReadWriteExecute => "rwx",
        };
        f.write_str(name)
    }
}

/// Set the protection of every page overlapping `[address, address + size)`
///
/// `mode` is parsed first; an unknown mode is returned as an error without
/// touching any page.
///
/// ## Errors
///
/// - `InvalidProtectionMode`: `mode` is not one of the accepted strings
/// - `Io`: `mprotect(2)` refused the change
///
/// ## Safety
///
/// The range must lie inside a mapping owned by the caller. Removing read or
/// write access from memory that live Rust references point into, or from
/// this program's own code or stack, is undefined behaviour.
pub unsafe fn protect(address: *const u8, size: usize, mode: &str) -> PatchResult<()>
{
    let mode: ProtectionMode = mode.parse()?;

    let start = page_align_down(address as usize);
    let end = (address as usize).saturating_add(size.max(1));
    let len = end - start;

    debug!(start = format_args!("{start:#x}"), len, %mode, "mprotect");
    // SAFETY: the caller guarantees the range belongs to a mapping it owns.
    let result = unsafe { libc::mprotect(start as *mut libc::c_void, len, mode.to_prot()) };
    if result != 0 {
        return Err(PatchError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_symbolic_and_octal_modes()
    {
        assert_eq!("rw".parse::<ProtectionMode>().unwrap(), ProtectionMode::ReadWrite);
        assert_eq!("766".parse::<ProtectionMode>().unwrap(), ProtectionMode::ReadWrite);
        assert_eq!("755".parse::<ProtectionMode>().unwrap(), ProtectionMode::ReadExecute);
        assert_eq!("r".parse::<ProtectionMode>().unwrap().to_prot(), libc::PROT_READ);
    }

    #[test]
    fn test_every_mode_matches_its_documented_aliases()
    {
        let table = [
            (ProtectionMode::Read, "444", libc::PROT_READ),
            (ProtectionMode::ReadWrite, "766", libc::PROT_READ | libc::PROT_WRITE),
            (ProtectionMode::ReadExecute, "755", libc::PROT_READ | libc::PROT_EXEC),
            (
                ProtectionMode::ReadWriteExecute,
                "777",
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            ),
        ];
        for (mode, octal, prot) in table {
            assert_eq!(mode.to_string().parse::<ProtectionMode>().unwrap(), mode);
            assert_eq!(octal.parse::<ProtectionMode>().unwrap(), mode);
            assert_eq!(mode.to_prot(), prot);
        }
    }

    #[test]
    fn test_unknown_mode_is_rejected_before_mprotect()
    {
        // A null address would make mprotect fail with ENOMEM; the mode error wins.
        let result = unsafe { protect(std::ptr::null(), 4, "wx") };
        match result {
            Err(PatchError::InvalidProtectionMode(mode)) => assert_eq!(mode, "wx"),
            other => panic!("expected InvalidProtectionMode, got {other:?}"),
        }
    }

    #[test]
    fn test_page_align_down()
    {
        let page = page_size();
        assert!(page.is_power_of_two());
        assert_eq!(page_align_down(page + 3), page);
        assert_eq!(page_align_down(page - 1), 0);
    }
}
