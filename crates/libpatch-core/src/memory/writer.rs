//! Remote Memory Writer: typed writes at `base + offset`.

use tracing::{debug, info};

use super::{resolve, write_span};
use crate::error::PatchResult;
use crate::session::ProcessHandle;
use crate::tracer::Tracer;
use crate::types::{format_hex, format_offset, parse_hex_bytes, Address, ModuleBase, PatchValue, ARM_NOP, ARM_RET};

/// Writes typed values into a traced process
///
/// Each call encodes its value into a fresh buffer and hands it to the word
/// splicer in one go; nothing is shared between calls.
///
/// ## Partial patches
///
/// A value wider than one machine word is written with several pokes. If one
/// of them fails the earlier ones are not rolled back, and a sequence of
/// `put_*` calls has no transaction either: callers that need all-or-nothing
/// behaviour must read back and restore the original bytes themselves.
pub struct MemoryWriter<'a, T: Tracer>
{
    handle: &'a mut ProcessHandle<T>,
    base: Address,
}

impl<'a, T: Tracer> MemoryWriter<'a, T>
{
    /// Create a writer for offsets relative to `base`
    pub fn new(handle: &'a mut ProcessHandle<T>, base: &ModuleBase) -> Self
    {
        Self {
            handle,
            base: base.address,
        }
    }

    /// Write any value at `base + offset`
    ///
    /// ## Errors
    ///
    /// - `InvalidState`: the handle is not attached
    /// - `AccessViolation`: a covering word could not be peeked or poked
    /// - `InvalidArgument`: `base + offset` falls outside the address space
    pub fn put(&mut self, offset: i64, value: &PatchValue) -> PatchResult<()>
    {
        let address = resolve(self.base, offset)?;
        let bytes = value.encode();
        debug!(%address, kind = ?value.kind(), bytes = %format_hex(&bytes), "Writing value");
        write_span(self.handle, address, &bytes)
    }

    /// Write raw bytes given as a hex-pair string (`"1E FF 2F E1"`), in input order
    pub fn put_bytes(&mut self, offset: i64, hex: &str) -> PatchResult<()>
    {
        let bytes = parse_hex_bytes(hex)?;
        self.put(offset, &PatchValue::Bytes(bytes))
    }

    /// Write the ARM `BX LR` return instruction
    pub fn put_ret(&mut self, offset: i64) -> PatchResult<()>
    {
        info!(offset = %format_offset(offset), "Patching return");
        self.put(offset, &PatchValue::Bytes(ARM_RET.to_vec()))
    }

    /// Write the ARM 4-byte no-op (branch to the following instruction)
    pub fn put_nop(&mut self, offset: i64) -> PatchResult<()>
    {
        info!(offset = %format_offset(offset), "Patching no-op");
        self.put(offset, &PatchValue::Bytes(ARM_NOP.to_vec()))
    }

    /// Write one byte
    pub fn put_byte(&mut self, offset: i64, value: u8) -> PatchResult<()>
    {
        self.put(offset, &PatchValue::Byte(value))
    }

    /// Write a big-endian 16-bit word
    pub fn put_word(&mut self, offset: i64, value: i16) -> PatchResult<()>
    {
        self.put(offset, &PatchValue::Word(value))
    }

    /// Write a big-endian 32-bit dword
    pub fn put_dword(&mut self, offset: i64, value: i32) -> PatchResult<()>
    {
        self.put(offset, &PatchValue::Dword(value))
    }

    /// Write a little-endian 32-bit dword
    pub fn put_little_dword(&mut self, offset: i64, value: i32) -> PatchResult<()>
    {
        self.put(offset, &PatchValue::LittleDword(value))
    }

    /// Write `lo` at `offset` and `hi` at `offset + 4`, both big-endian
    ///
    /// [`MemoryReader::read_double_dword`](super::MemoryReader::read_double_dword)
    /// returns the pair as `(hi, lo)`.
    pub fn put_double_dword(&mut self, offset: i64, lo: i32, hi: i32) -> PatchResult<()>
    {
        self.put(offset, &PatchValue::DoubleDword { lo, hi })
    }

    /// Write a big-endian 64-bit qword
    pub fn put_qword(&mut self, offset: i64, value: i64) -> PatchResult<()>
    {
        self.put(offset, &PatchValue::Qword(value))
    }

    /// Write a NUL-terminated string
    ///
    /// An empty string writes the all-ones "no string" dword instead.
    pub fn put_string(&mut self, offset: i64, value: &str) -> PatchResult<()>
    {
        self.put(offset, &PatchValue::String(value.to_string()))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::error::PatchError;
    use crate::platform::simulated::SimulatedTracer;
    use crate::session::AttachOptions;
    use crate::types::ProcessId;

    fn attached() -> (ProcessHandle<SimulatedTracer>, ModuleBase)
    {
        let pid = ProcessId::from(11);
        let base = ModuleBase::new(Address::from(0x8000), "libg.so");
        let mut handle = ProcessHandle::new(pid, SimulatedTracer::new(pid).with_bytes(base.address, &[0xCC; 64]));
        handle.attach(&AttachOptions::default()).unwrap();
        (handle, base)
    }

    #[test]
    fn test_put_dword_is_big_endian()
    {
        let (mut handle, base) = attached();
        MemoryWriter::new(&mut handle, &base).put_dword(2, 0x0102_0304).unwrap();
        assert_eq!(
            handle.tracer().bytes(Address::from(0x8000), 8).unwrap(),
            vec![0xCC, 0xCC, 1, 2, 3, 4, 0xCC, 0xCC]
        );
    }

    #[test]
    fn test_put_ret_and_nop_bytes()
    {
        let (mut handle, base) = attached();
        let mut writer = MemoryWriter::new(&mut handle, &base);
        writer.put_ret(0).unwrap();
        writer.put_nop(4).unwrap();
        assert_eq!(
            handle.tracer().bytes(Address::from(0x8000), 8).unwrap(),
            vec![0x1E, 0xFF, 0x2F, 0xE1, 0x00, 0x00, 0x00, 0xEA]
        );
    }

    #[test]
    fn test_put_bytes_rejects_bad_hex_without_writing()
    {
        let (mut handle, base) = attached();
        let result = MemoryWriter::new(&mut handle, &base).put_bytes(0, "1E FG");
        assert!(matches!(result, Err(PatchError::InvalidArgument(_))));
        assert_eq!(handle.tracer().poke_count(), 0);
    }

    #[test]
    fn test_consecutive_puts_do_not_leak_bytes()
    {
        let (mut handle, base) = attached();
        let mut writer = MemoryWriter::new(&mut handle, &base);
        writer.put_qword(0, -1).unwrap();
        writer.put_byte(16, 0x42).unwrap();
        assert_eq!(
            handle.tracer().bytes(Address::from(0x8010), 2).unwrap(),
            vec![0x42, 0xCC]
        );
    }
}
