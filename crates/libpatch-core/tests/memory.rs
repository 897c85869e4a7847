//! Reader/writer tests over the simulated tracer

use libpatch_core::error::PatchError;
use libpatch_core::memory::{MemoryReader, MemoryWriter, ReaderOptions};
use libpatch_core::platform::simulated::SimulatedTracer;
use libpatch_core::session::{AttachOptions, ProcessHandle};
use libpatch_core::types::{parse_int, Address, ModuleBase, PatchValue, ProcessId, ValueKind};

const PID: ProcessId = ProcessId(321);
const BASE: u64 = 0x74a0_0000;
const REGION_LEN: usize = 0x100;

fn session() -> (ProcessHandle<SimulatedTracer>, ModuleBase)
{
    let base = ModuleBase::new(Address::from(BASE), "libg.so");
    let tracer = SimulatedTracer::new(PID).with_region(base.address, REGION_LEN);
    let mut handle = ProcessHandle::new(PID, tracer);
    handle.attach(&AttachOptions::default()).unwrap();
    (handle, base)
}

#[test]
fn test_round_trip_every_fixed_width()
{
    let (mut handle, base) = session();
    {
        let mut writer = MemoryWriter::new(&mut handle, &base);
        writer.put_byte(0x01, 0xAB).unwrap();
        writer.put_word(0x03, -2).unwrap();
        writer.put_dword(0x09, 0x1234_5678).unwrap();
        writer.put_little_dword(0x11, -559_038_737).unwrap();
        writer.put_qword(0x1b, 0x0102_0304_0506_0708).unwrap();
    }

    let reader = MemoryReader::new(&handle, &base);
    assert_eq!(reader.read_byte(0x01).unwrap(), 0xAB);
    assert_eq!(reader.read_word(0x03).unwrap(), -2);
    assert_eq!(reader.read_dword(0x09).unwrap(), 0x1234_5678);
    assert_eq!(reader.read_little_dword(0x11).unwrap(), -559_038_737);
    assert_eq!(reader.read_qword(0x1b).unwrap(), 0x0102_0304_0506_0708);
}

#[test]
fn test_round_trip_through_patch_value()
{
    let (mut handle, base) = session();
    let values = [
        (0x40, PatchValue::Word(0x7f00)),
        (0x50, PatchValue::DoubleDword { lo: 7, hi: -7 }),
        (0x60, PatchValue::String("gems".to_string())),
        (0x70, PatchValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef, 0x01])),
    ];

    for (offset, value) in &values {
        MemoryWriter::new(&mut handle, &base).put(*offset, value).unwrap();
    }
    let reader = MemoryReader::new(&handle, &base);
    for (offset, value) in &values {
        assert_eq!(&reader.read(*offset, value.kind(), 5).unwrap(), value);
    }
}

#[test]
fn test_dword_is_stored_big_endian()
{
    let (mut handle, base) = session();
    MemoryWriter::new(&mut handle, &base).put_dword(0x10, 0x0102_0304).unwrap();
    assert_eq!(
        handle.tracer().bytes(Address::from(BASE + 0x10), 4).unwrap(),
        vec![0x01, 0x02, 0x03, 0x04]
    );
    assert_eq!(MemoryReader::new(&handle, &base).read_little_dword(0x10).unwrap(), 0x0403_0201);
}

#[test]
fn test_double_dword_reads_back_swapped()
{
    let (mut handle, base) = session();
    MemoryWriter::new(&mut handle, &base)
        .put_double_dword(0x20, 0x1111_1111, 0x2222_2222)
        .unwrap();

    let (first, second) = MemoryReader::new(&handle, &base).read_double_dword(0x20).unwrap();
    assert_eq!(first, 0x2222_2222);
    assert_eq!(second, 0x1111_1111);

    // lo sits at the offset, hi four bytes after it
    assert_eq!(MemoryReader::new(&handle, &base).read_dword(0x24).unwrap(), 0x2222_2222);
}

#[test]
fn test_string_round_trip()
{
    let (mut handle, base) = session();
    MemoryWriter::new(&mut handle, &base).put_string(0x30, "hi").unwrap();

    assert_eq!(
        handle.tracer().bytes(Address::from(BASE + 0x30), 3).unwrap(),
        b"hi\0".to_vec()
    );
    assert_eq!(MemoryReader::new(&handle, &base).read_string(0x30).unwrap(), "hi");
}

#[test]
fn test_empty_string_writes_sentinel()
{
    let (mut handle, base) = session();
    MemoryWriter::new(&mut handle, &base).put_string(0x30, "").unwrap();

    let reader = MemoryReader::new(&handle, &base);
    assert_eq!(reader.read_dword(0x30).unwrap() as u32, 0xFFFF_FFFF);
}

#[test]
fn test_read_bytes_returns_exact_size()
{
    let (mut handle, base) = session();
    MemoryWriter::new(&mut handle, &base).put_bytes(0x80, "1E FF 2F E1").unwrap();

    let reader = MemoryReader::new(&handle, &base);
    assert_eq!(reader.read_bytes(0x81, 3).unwrap(), vec![0xFF, 0x2F, 0xE1]);
    assert!(reader.read_bytes(0x81, 0).unwrap().is_empty());
}

#[test]
fn test_ret_and_nop_constants()
{
    let (mut handle, base) = session();
    let mut writer = MemoryWriter::new(&mut handle, &base);
    writer.put_ret(0x90).unwrap();
    writer.put_nop(0x94).unwrap();

    let reader = MemoryReader::new(&handle, &base);
    assert_eq!(reader.read_bytes(0x90, 4).unwrap(), vec![0x1E, 0xFF, 0x2F, 0xE1]);
    assert_eq!(reader.read_bytes(0x94, 4).unwrap(), vec![0x00, 0x00, 0x00, 0xEA]);
}

#[test]
fn test_unmapped_read_is_access_violation()
{
    let (handle, base) = session();
    let reader = MemoryReader::new(&handle, &base);

    match reader.read_dword(REGION_LEN as i64) {
        Err(PatchError::AccessViolation { address, .. }) => assert!(address.value() >= BASE),
        other => panic!("expected AccessViolation, got {other:?}"),
    }
}

#[test]
fn test_write_past_region_end_is_access_violation()
{
    let (mut handle, base) = session();
    let result = MemoryWriter::new(&mut handle, &base).put_dword(REGION_LEN as i64 - 2, 0x0102_0304);
    assert!(matches!(result, Err(PatchError::AccessViolation { .. })));
}

#[test]
fn test_unterminated_string_is_bounded()
{
    let (mut handle, base) = session();
    MemoryWriter::new(&mut handle, &base)
        .put_bytes(0, &"41".repeat(REGION_LEN))
        .unwrap();

    let reader = MemoryReader::with_options(&handle, &base, ReaderOptions { max_string_len: 64 });
    assert!(matches!(
        reader.read_string(0),
        Err(PatchError::UnterminatedString { limit: 64, .. })
    ));

    // Without a tighter bound the scan walks off the region first.
    let reader = MemoryReader::new(&handle, &base);
    assert!(matches!(reader.read_string(0), Err(PatchError::AccessViolation { .. })));
}

#[test]
fn test_detached_handle_is_invalid_state()
{
    let (mut handle, base) = session();
    handle.detach().unwrap();

    assert!(matches!(
        MemoryReader::new(&handle, &base).read_byte(0),
        Err(PatchError::InvalidState(_))
    ));
    assert!(matches!(
        MemoryWriter::new(&mut handle, &base).put_byte(0, 1),
        Err(PatchError::InvalidState(_))
    ));
}

#[test]
fn test_parsed_value_writes_like_typed_put()
{
    let (mut handle, base) = session();
    let value = ValueKind::Dword.parse_value("0xCAFEBABE").unwrap();
    MemoryWriter::new(&mut handle, &base).put(0xA0, &value).unwrap();
    assert_eq!(
        MemoryReader::new(&handle, &base).read_dword(0xA0).unwrap() as u32,
        0xCAFE_BABE
    );
}

#[test]
fn test_negative_offset_reaches_below_base()
{
    let base = ModuleBase::new(Address::from(0x2000), "libg.so");
    let tracer = SimulatedTracer::new(PID).with_region(Address::from(0x1f00), 0x200);
    let mut handle = ProcessHandle::new(PID, tracer);
    handle.attach(&AttachOptions::default()).unwrap();

    let offset = parse_int::<i64>("-16").unwrap();
    MemoryWriter::new(&mut handle, &base).put_dword(offset, 0x0BAD_F00D).unwrap();

    assert_eq!(
        handle.tracer().bytes(Address::from(0x1ff0), 4).unwrap(),
        vec![0x0B, 0xAD, 0xF0, 0x0D]
    );
    assert_eq!(MemoryReader::new(&handle, &base).read_dword(-0x10).unwrap(), 0x0BAD_F00D);
}

#[test]
fn test_offset_below_address_zero_is_invalid_argument()
{
    let (handle, _) = session();
    let low = ModuleBase::new(Address::from(0x10), "libg.so");
    assert!(matches!(
        MemoryReader::new(&handle, &low).read_byte(-0x20),
        Err(PatchError::InvalidArgument(_))
    ));
}

#[test]
fn test_read_bytes_with_huge_size_is_error()
{
    let (handle, base) = session();
    let reader = MemoryReader::new(&handle, &base);

    assert!(reader.read_bytes(0, usize::MAX).is_err());
    assert!(matches!(
        reader.read_bytes(0, usize::MAX / 2),
        Err(PatchError::AccessViolation { .. })
    ));
}
