//! Tests for platform-agnostic types

use libpatch_core::types::{
    format_hex, format_offset, parse_hex_bytes, parse_int, Address, MemoryRegion, ModuleBase, ModuleMatch, PatchValue, ProcessId,
    TracingState, ValueKind,
};

#[test]
fn test_process_id_from_u32()
{
    let pid = ProcessId::from(12345);
    assert_eq!(pid.0, 12345);
    assert_eq!(pid.to_string(), "12345");
}

#[test]
fn test_tracing_state_defaults_to_detached()
{
    assert_eq!(TracingState::default(), TracingState::Detached);
}

#[test]
fn test_address_display_is_padded_hex()
{
    assert_eq!(Address::from(0x74a000000).to_string(), "0x000000074a000000");
}

#[test]
fn test_module_base_offset_does_not_wrap()
{
    let base = ModuleBase::new(Address::from(u64::MAX - 1), "libg.so");
    assert_eq!(base.offset(1), Some(Address::from(u64::MAX)));
    assert_eq!(base.offset(2), None);
}

#[test]
fn test_module_base_negative_offset()
{
    let base = ModuleBase::new(Address::from(0x2000), "libg.so");
    assert_eq!(base.offset(-16), Some(Address::from(0x1ff0)));
    assert_eq!(base.offset(-0x2001), None);
}

#[test]
fn test_memory_region_parse_full_line()
{
    let region =
        MemoryRegion::parse("74a000000-74a010000 r-xp 00000000 fd:01 1234   /data/app/My App/lib/libg.so").unwrap();
    assert_eq!(region.start, Address::from(0x74a000000));
    assert_eq!(region.end, Address::from(0x74a010000));
    assert!(region.is_readable());
    assert!(!region.is_writable());
    assert!(region.is_executable());
    assert_eq!(region.path.as_deref(), Some("/data/app/My App/lib/libg.so"));
    assert!(region.contains(Address::from(0x74a00ffff)));
    assert!(!region.contains(Address::from(0x74a010000)));
}

#[test]
fn test_memory_region_parse_abbreviated_line()
{
    let region = MemoryRegion::parse("74a000000-74a010000 r-xp ... libg.so").unwrap();
    assert_eq!(region.path.as_deref(), Some("libg.so"));

    let anonymous = MemoryRegion::parse("7f0000000000-7f0000001000 rw-p").unwrap();
    assert_eq!(anonymous.path, None);

    assert!(MemoryRegion::parse("not a maps line").is_none());
    assert!(MemoryRegion::parse("").is_none());
}

#[test]
fn test_module_match_modes()
{
    let region = MemoryRegion::parse("1000-2000 r-xp 00000000 00:00 0 /system/lib/libgg.so").unwrap();
    assert!(region.maps_module("libg", ModuleMatch::Substring));
    assert!(!region.maps_module("libg.so", ModuleMatch::Exact));
    assert!(region.maps_module("libgg.so", ModuleMatch::Exact));
    assert!(region.maps_module("/system/lib/libgg.so", ModuleMatch::Exact));
}

#[test]
fn test_value_kind_from_str()
{
    assert_eq!("dword".parse::<ValueKind>().unwrap(), ValueKind::Dword);
    assert_eq!("DDWORD".parse::<ValueKind>().unwrap(), ValueKind::DoubleDword);
    assert_eq!("hex".parse::<ValueKind>().unwrap(), ValueKind::Bytes);
    assert!("float".parse::<ValueKind>().is_err());
}

#[test]
fn test_parse_value_per_kind()
{
    assert_eq!(ValueKind::Word.parse_value("-2").unwrap(), PatchValue::Word(-2));
    assert_eq!(
        ValueKind::Dword.parse_value("0xFFFFFFFF").unwrap(),
        PatchValue::Dword(-1)
    );
    assert_eq!(
        ValueKind::DoubleDword.parse_value("1, 0x2").unwrap(),
        PatchValue::DoubleDword { lo: 1, hi: 2 }
    );
    assert!(ValueKind::Byte.parse_value("256").is_err());
    assert!(ValueKind::DoubleDword.parse_value("1").is_err());
}

#[test]
fn test_parse_int_radixes()
{
    assert_eq!(parse_int::<u64>("0x10").unwrap(), 16);
    assert_eq!(parse_int::<u64>("16").unwrap(), 16);
    assert!(parse_int::<u64>("0xZZ").is_err());
}

#[test]
fn test_hex_helpers()
{
    let bytes = parse_hex_bytes("1EFF2FE1").unwrap();
    assert_eq!(bytes, parse_hex_bytes("1E FF 2F E1").unwrap());
    assert_eq!(format_hex(&bytes), "1E FF 2F E1");
    assert!(parse_hex_bytes("").is_err());
}

#[test]
fn test_encode_empty_string_is_sentinel()
{
    assert_eq!(PatchValue::String(String::new()).encode(), vec![0xFF; 4]);
}

#[test]
fn test_parse_signed_offsets()
{
    assert_eq!(parse_int::<i64>("-16").unwrap(), -16);
    assert_eq!(parse_int::<i64>("-0x10").unwrap(), -16);
    assert_eq!(parse_int::<i64>("0x1a2b").unwrap(), 0x1a2b);
    assert_eq!(parse_int::<i64>("0xfffffffffffffff0").unwrap(), -16);
    assert!(parse_int::<i64>("--16").is_err());
    assert!(parse_int::<i64>("0x-10").is_err());
}

#[test]
fn test_format_offset_is_signed_hex()
{
    assert_eq!(format_offset(0x1a2b), "0x1a2b");
    assert_eq!(format_offset(-16), "-0x10");
    assert_eq!(format_offset(i64::MIN), "-0x8000000000000000");
}
