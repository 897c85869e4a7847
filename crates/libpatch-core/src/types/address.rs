//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address in the target's virtual address space
///
/// Keeps module bases and computed patch addresses apart from module offsets
/// (`i64`, may be negative) and sizes (`usize`).
///
/// ## Example
///
/// ```rust
/// use libpatch_core::types::Address;
///
/// let base = Address::from(0x74a000000);
/// let patch = base + 0x1234;
/// assert_eq!(patch.value(), 0x74a001234);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// This is equivalent to `Address::from(value)` but can be used in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use libpatch_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Add a signed offset, checking that the result stays in the address space
    ///
    /// ```rust
    /// use libpatch_core::types::Address;
    ///
    /// let base = Address::from(0x2000);
    /// assert_eq!(base.checked_add_signed(-0x10), Some(Address::from(0x1ff0)));
    /// assert_eq!(base.checked_add_signed(0x10), Some(Address::from(0x2010)));
    /// assert_eq!(Address::ZERO.checked_add_signed(-1), None);
    /// ```
    pub fn checked_add_signed(self, offset: i64) -> Option<Self>
    {
        self.0.checked_add_signed(offset).map(Address)
    }

    /// Subtract an offset from this address, checking for underflow
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Round down to a multiple of `align`
    ///
    /// `align` must be a power of two (machine word size or page size).
    ///
    /// ```rust
    /// use libpatch_core::types::Address;
    ///
    /// assert_eq!(Address::from(0x1007).align_down(8), Address::from(0x1000));
    /// assert_eq!(Address::from(0x2fff).align_down(0x1000), Address::from(0x2000));
    /// ```
    pub const fn align_down(self, align: u64) -> Self
    {
        Address(self.0 & !(align - 1))
    }

    /// Distance in bytes from `other` up to `self` (0 if `other` is above)
    pub const fn distance_from(self, other: Address) -> u64
    {
        self.0.saturating_sub(other.0)
    }
}

/// Format a module offset as signed hex (`0x1a2b`, `-0x10`)
pub fn format_offset(offset: i64) -> String
{
    if offset < 0 {
        format!("-{:#x}", offset.unsigned_abs())
    } else {
        format!("{offset:#x}")
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
