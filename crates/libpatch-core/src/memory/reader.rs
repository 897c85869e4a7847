//! Remote Memory Reader: typed reads at `base + offset`.

use tracing::debug;

use super::{read_span, resolve};
use crate::error::{PatchError, PatchResult};
use crate::session::ProcessHandle;
use crate::tracer::{Tracer, WORD_SIZE};
use crate::types::{format_offset, Address, ModuleBase, PatchValue, ValueKind};

/// Longest string `read_string` scans for a NUL by default.
pub const DEFAULT_MAX_STRING_LEN: usize = 4096;

/// Limits applied by [`MemoryReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions
{
    /// Maximum number of bytes `read_string` scans before giving up
    pub max_string_len: usize,
}

impl Default for ReaderOptions
{
    fn default() -> Self
    {
        Self {
            max_string_len: DEFAULT_MAX_STRING_LEN,
        }
    }
}

/// Reads typed values from a traced process
///
/// Multi-byte values are assembled big-endian, except
/// [`read_little_dword`](Self::read_little_dword).
///
/// ## Example
///
/// ```rust
/// use libpatch_core::memory::{MemoryReader, MemoryWriter};
/// use libpatch_core::platform::simulated::SimulatedTracer;
/// use libpatch_core::session::{AttachOptions, ProcessHandle};
/// use libpatch_core::types::{Address, ModuleBase, ProcessId};
///
/// let pid = ProcessId::from(42);
/// let base = ModuleBase::new(Address::from(0x4000), "libg.so");
/// let tracer = SimulatedTracer::new(pid).with_region(base.address, 0x100);
/// let mut handle = ProcessHandle::new(pid, tracer);
/// handle.attach(&AttachOptions::default())?;
///
/// MemoryWriter::new(&mut handle, &base).put_dword(0x10, 0x12345678)?;
/// assert_eq!(MemoryReader::new(&handle, &base).read_dword(0x10)?, 0x12345678);
/// # Ok::<(), libpatch_core::error::PatchError>(())
/// ```
pub struct MemoryReader<'a, T: Tracer>
{
    handle: &'a ProcessHandle<T>,
    base: Address,
    options: ReaderOptions,
}

impl<'a, T: Tracer> MemoryReader<'a, T>
{
    /// Create a reader for offsets relative to `base`
    pub fn new(handle: &'a ProcessHandle<T>, base: &ModuleBase) -> Self
    {
        Self::with_options(handle, base, ReaderOptions::default())
    }

    /// Create a reader with explicit limits
    pub fn with_options(handle: &'a ProcessHandle<T>, base: &ModuleBase, options: ReaderOptions) -> Self
    {
        Self {
            handle,
            base: base.address,
            options,
        }
    }

    fn read_array<const N: usize>(&self, offset: i64) -> PatchResult<[u8; N]>
    {
        let address = resolve(self.base, offset)?;
        let bytes = read_span(self.handle, address, N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(&bytes);
        Ok(array)
    }

    /// Read one byte
    ///
    /// ## Errors
    ///
    /// - `AccessViolation`: the containing word is not readable
    /// - `InvalidState`: the handle is not attached
    pub fn read_byte(&self, offset: i64) -> PatchResult<u8>
    {
        Ok(self.read_array::<1>(offset)?[0])
    }

    /// Read a big-endian 16-bit word
    pub fn read_word(&self, offset: i64) -> PatchResult<i16>
    {
        self.read_array(offset).map(i16::from_be_bytes)
    }

    /// Read a big-endian 32-bit dword
    pub fn read_dword(&self, offset: i64) -> PatchResult<i32>
    {
        self.read_array(offset).map(i32::from_be_bytes)
    }

    /// Read a little-endian 32-bit dword
    pub fn read_little_dword(&self, offset: i64) -> PatchResult<i32>
    {
        self.read_array(offset).map(i32::from_le_bytes)
    }

    /// Read two consecutive dwords and return them as `(hi, lo)`
    ///
    /// The dword at `offset` is `lo` and the one at `offset + 4` is `hi`; the
    /// pair comes back with `hi` first. This mirrors
    /// [`MemoryWriter::put_double_dword`](super::MemoryWriter::put_double_dword),
    /// which takes `(lo, hi)`, so a write followed by a read swaps the order.
    pub fn read_double_dword(&self, offset: i64) -> PatchResult<(i32, i32)>
    {
        let lo = self.read_dword(offset)?;
        let hi_offset = offset
            .checked_add(4)
            .ok_or_else(|| PatchError::InvalidArgument(format!("offset {} + 4 overflows", format_offset(offset))))?;
        let hi = self.read_dword(hi_offset)?;
        Ok((hi, lo))
    }

    /// Read a big-endian 64-bit qword
    pub fn read_qword(&self, offset: i64) -> PatchResult<i64>
    {
        self.read_array(offset).map(i64::from_be_bytes)
    }

    /// Read exactly `size` bytes
    ///
    /// Costs one peek per word touched; meant for short buffers, not bulk
    /// transfers.
    pub fn read_bytes(&self, offset: i64, size: usize) -> PatchResult<Vec<u8>>
    {
        let address = resolve(self.base, offset)?;
        debug!(%address, size, "Reading bytes");
        read_span(self.handle, address, size)
    }

    /// Read the bytes of a NUL-terminated string, without the terminator
    ///
    /// Scans at most `max_string_len` bytes. The bytes come back exactly as
    /// they are in the target, whatever their encoding.
    ///
    /// ## Errors
    ///
    /// - `UnterminatedString`: no NUL within `max_string_len` bytes
    /// - `AccessViolation`: the scan ran into unreadable memory first
    pub fn read_c_string(&self, offset: i64) -> PatchResult<Vec<u8>>
    {
        let start = resolve(self.base, offset)?;
        let limit = self.options.max_string_len;
        let mut collected: Vec<u8> = Vec::new();

        while collected.len() < limit {
            let address = start.checked_add(collected.len() as u64).ok_or_else(|| {
                PatchError::InvalidArgument(format!("string at {start} runs past the end of the address space"))
            })?;
            // Read up to the next word boundary so each peek is used whole.
            let to_boundary = WORD_SIZE - (address.value() % WORD_SIZE as u64) as usize;
            let chunk = read_span(self.handle, address, to_boundary.min(limit - collected.len()))?;

            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                collected.extend_from_slice(&chunk[..nul]);
                return Ok(collected);
            }
            collected.extend_from_slice(&chunk);
        }

        Err(PatchError::UnterminatedString { address: start, limit })
    }

    /// Read a NUL-terminated string as text
    ///
    /// The conversion is lossy: bytes that are not valid UTF-8 become
    /// `U+FFFD`, so the result does not always write back to the same bytes.
    /// Use [`read_c_string`](Self::read_c_string) when the exact bytes matter.
    ///
    /// ## Errors
    ///
    /// Same as [`read_c_string`](Self::read_c_string).
    pub fn read_string(&self, offset: i64) -> PatchResult<String>
    {
        let bytes = self.read_c_string(offset)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a value of the given kind
    ///
    /// `size` is only used for [`ValueKind::Bytes`].
    pub fn read(&self, offset: i64, kind: ValueKind, size: usize) -> PatchResult<PatchValue>
    {
        let value = match kind {
            ValueKind::Byte => PatchValue::Byte(self.read_byte(offset)?),
            ValueKind::Word => PatchValue::Word(self.read_word(offset)?),
            ValueKind::Dword => PatchValue::Dword(self.read_dword(offset)?),
            ValueKind::LittleDword => PatchValue::LittleDword(self.read_little_dword(offset)?),
            ValueKind::DoubleDword => {
                let (hi, lo) = self.read_double_dword(offset)?;
                PatchValue::DoubleDword { lo, hi }
            }
            ValueKind::Qword => PatchValue::Qword(self.read_qword(offset)?),
            ValueKind::String => PatchValue::String(self.read_string(offset)?),
            ValueKind::Bytes => PatchValue::Bytes(self.read_bytes(offset, size)?),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::platform::simulated::SimulatedTracer;
    use crate::session::AttachOptions;
    use crate::types::ProcessId;

    fn handle_with(bytes: &[u8]) -> (ProcessHandle<SimulatedTracer>, ModuleBase)
    {
        let pid = ProcessId::from(9);
        let base = ModuleBase::new(Address::from(0x2000), "libg.so");
        let mut padded = bytes.to_vec();
        padded.resize(64, 0);
        let mut handle = ProcessHandle::new(pid, SimulatedTracer::new(pid).with_bytes(base.address, &padded));
        handle.attach(&AttachOptions::default()).unwrap();
        (handle, base)
    }

    #[test]
    fn test_read_byte_order()
    {
        let (handle, base) = handle_with(&[0x12, 0x34, 0x56, 0x78]);
        let reader = MemoryReader::new(&handle, &base);

        assert_eq!(reader.read_byte(1).unwrap(), 0x34);
        assert_eq!(reader.read_word(0).unwrap(), 0x1234);
        assert_eq!(reader.read_dword(0).unwrap(), 0x1234_5678);
        assert_eq!(reader.read_little_dword(0).unwrap(), 0x7856_3412);
    }

    #[test]
    fn test_read_string_stops_at_nul()
    {
        let (handle, base) = handle_with(b"hi\0there");
        let reader = MemoryReader::new(&handle, &base);
        assert_eq!(reader.read_string(0).unwrap(), "hi");
        assert_eq!(reader.read_string(3).unwrap(), "there");
    }

    #[test]
    fn test_read_c_string_keeps_invalid_utf8()
    {
        let (handle, base) = handle_with(&[b'a', 0xFF, 0xFE, b'b', 0]);
        let reader = MemoryReader::new(&handle, &base);

        assert_eq!(reader.read_c_string(0).unwrap(), vec![b'a', 0xFF, 0xFE, b'b']);
        assert_eq!(reader.read_string(0).unwrap(), "a\u{FFFD}\u{FFFD}b");
    }

    #[test]
    fn test_read_string_respects_limit()
    {
        let (handle, base) = handle_with(b"abcdefghijklmnop\0");
        let reader = MemoryReader::with_options(&handle, &base, ReaderOptions { max_string_len: 5 });

        match reader.read_string(0) {
            Err(PatchError::UnterminatedString { address, limit }) => {
                assert_eq!(address, base.address);
                assert_eq!(limit, 5);
            }
            other => panic!("expected UnterminatedString, got {other:?}"),
        }
    }

    #[test]
    fn test_read_string_exact_limit_with_terminator_inside()
    {
        let (handle, base) = handle_with(b"abcd\0");
        let reader = MemoryReader::with_options(&handle, &base, ReaderOptions { max_string_len: 5 });
        assert_eq!(reader.read_string(0).unwrap(), "abcd");
    }
}
