//! # Remote Memory
//!
//! Typed reads and writes at `module base + offset` inside a traced process.
//!
//! The tracer moves whole machine words, so every access is widened to the
//! aligned words that overlap it:
//!
//! ```text
//!   word 0x1000        word 0x1008
//! [ . . . . . A A A ][ A . . . . . . . ]   4-byte access at 0x1005
//! ```
//!
//! - **Reads** peek each overlapping word once and keep the requested lanes.
//! - **Writes** peek the words that are only partly covered, splice the new
//!   bytes into their lanes and poke every overlapping word back. Bytes
//!   outside the requested range are written back unchanged, so a concurrent
//!   write by the target to the same word can be lost.
//!
//! Aligned words never straddle a page, so widening never turns a valid access
//! into a fault.

pub mod reader;
pub mod writer;

pub use reader::{MemoryReader, ReaderOptions, DEFAULT_MAX_STRING_LEN};
pub use writer::MemoryWriter;

use crate::error::{PatchError, PatchResult};
use crate::session::ProcessHandle;
use crate::tracer::{Tracer, WORD_SIZE};
use crate::types::{format_offset, Address};

const WORD: u64 = WORD_SIZE as u64;

/// Largest buffer `read_span` reserves before any word has been read.
const MAX_PREALLOCATED: usize = 4096;

/// Compute `base + offset`, refusing to leave the address space
///
/// Negative offsets reach below the base.
pub(crate) fn resolve(base: Address, offset: i64) -> PatchResult<Address>
{
    base.checked_add_signed(offset).ok_or_else(|| {
        PatchError::InvalidArgument(format!(
            "offset {} from base {base} is outside the address space",
            format_offset(offset)
        ))
    })
}

fn span_end(address: Address, len: usize) -> PatchResult<Address>
{
    address
        .checked_add(len as u64)
        .ok_or_else(|| PatchError::InvalidArgument(format!("{len} bytes at {address} overflow the address space")))
}

/// Read `len` bytes at `address`, one peek per overlapping word
pub(crate) fn read_span<T: Tracer>(handle: &ProcessHandle<T>, address: Address, len: usize) -> PatchResult<Vec<u8>>
{
    if len == 0 {
        return Ok(Vec::new());
    }

    let end = span_end(address, len)?;
    // Grows with each peek; a bogus length fails on an unmapped word
    // instead of reserving memory up front.
    let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOCATED));
    let mut word_address = address.align_down(WORD);
    while word_address < end {
        let word = handle.peek(word_address)?;
        for (lane, byte) in word.iter().enumerate() {
            let lane_address = word_address + lane as u64;
            if lane_address >= address && lane_address < end {
                bytes.push(*byte);
            }
        }
        match word_address.checked_add(WORD) {
            Some(next) => word_address = next,
            None => break,
        }
    }
    Ok(bytes)
}

/// Write `bytes` at `address`, one poke per overlapping word
///
/// Words are written in ascending order. If a poke fails, the words before it
/// stay written.
pub(crate) fn write_span<T: Tracer>(handle: &mut ProcessHandle<T>, address: Address, bytes: &[u8]) -> PatchResult<()>
{
    if bytes.is_empty() {
        return Ok(());
    }

    let end = span_end(address, bytes.len())?;
    let mut word_address = address.align_down(WORD);
    while word_address < end {
        let covered = word_address >= address && word_address.checked_add(WORD).is_some_and(|next| next <= end);
        let mut word = if covered { [0u8; WORD_SIZE] } else { handle.peek(word_address)? };

        for (lane, slot) in word.iter_mut().enumerate() {
            let lane_address = word_address + lane as u64;
            if lane_address >= address && lane_address < end {
                // In range, so the index is below bytes.len().
                *slot = bytes[lane_address.distance_from(address) as usize];
            }
        }
        handle.poke(word_address, word)?;

        match word_address.checked_add(WORD) {
            Some(next) => word_address = next,
            None => break,
        }
    }
    Ok(())
}
