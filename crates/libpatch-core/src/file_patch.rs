//! # File Patch Mode
//!
//! Patches a module's on-disk image instead of a running process. The file is
//! mapped shared and read-write, the page holding the patch is made writable,
//! the four bytes are written, the page is put back to read + execute and the
//! mapping is flushed synchronously before it is unmapped.
//!
//! ```text
//! open(rw) -> mmap(shared) -> mprotect(rw) -> write 4 bytes -> mprotect(rx) -> msync -> munmap
//! ```

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;
use tracing::{error, info};

use crate::error::{PatchError, PatchResult};
use crate::protect::protect;
use crate::types::{format_hex, parse_hex_bytes};

/// Number of bytes a static patch writes.
pub const STATIC_PATCH_LEN: usize = 4;

/// Overwrite four bytes of the file at `path`, starting at `offset`
///
/// `hex` holds the bytes as hex pairs, either spaced (`"1E FF 2F E1"`) or
/// compact (`"1EFF2FE1"`).
///
/// ## Errors
///
/// - `InvalidArgument`: `hex` does not decode to exactly four bytes, or the
///   patch does not fit inside the file (checked before anything is mapped)
/// - `Io`: the file cannot be opened, mapped, protected or flushed
pub fn put_static_bytes(path: impl AsRef<Path>, offset: u64, hex: &str) -> PatchResult<()>
{
    let path = path.as_ref();
    let bytes = parse_hex_bytes(hex)?;
    if bytes.len() != STATIC_PATCH_LEN {
        return Err(PatchError::InvalidArgument(format!(
            "static patch needs exactly {STATIC_PATCH_LEN} bytes, got {} ('{hex}')",
            bytes.len()
        )));
    }

    let file = OpenOptions::new().read(true).write(true).open(path).map_err(|err| {
        error!(path = %path.display(), error = %err, "Failed to open file for patching");
        PatchError::Io(err)
    })?;

    let file_len = file.metadata()?.len();
    let start = usize::try_from(offset)
        .ok()
        .filter(|_| offset.checked_add(STATIC_PATCH_LEN as u64).is_some_and(|end| end <= file_len))
        .ok_or_else(|| {
            PatchError::InvalidArgument(format!(
                "patch of {STATIC_PATCH_LEN} bytes at {offset:#x} is outside {} ({file_len} bytes)",
                path.display()
            ))
        })?;

    // SAFETY: the mapping is private to this call; concurrent truncation of
    // the file by another process would still fault, as for any mmap user.
    let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(|err| {
        error!(path = %path.display(), error = %err, "Failed to map file");
        PatchError::Io(err)
    })?;

    let target_ptr = map[start..].as_ptr();

    // SAFETY: the range lies inside `map`, which this function owns, and no
    // reference into it is alive while its protection is changed.
    unsafe { protect(target_ptr, STATIC_PATCH_LEN, "rw") }?;
    map[start..start + STATIC_PATCH_LEN].copy_from_slice(&bytes);
    // SAFETY: as above.
    unsafe { protect(target_ptr, STATIC_PATCH_LEN, "rx") }?;

    map.flush()?;
    info!(path = %path.display(), offset = format_args!("{offset:#x}"), bytes = %format_hex(&bytes), "Patched file");
    Ok(())
}
