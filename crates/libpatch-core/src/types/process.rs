//! Process, module and memory region types.

use std::fmt;

use super::Address;

/// Process identifier (PID)
///
/// A PID is the number under which a process appears in `/proc`.
///
/// ## Example
///
/// ```rust
/// use libpatch_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(u32::from(pid), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// Get the raw `u32` value of this process identifier
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Whether a [`ProcessHandle`](crate::session::ProcessHandle) currently traces its process
///
/// ## State Transitions
///
/// - `Detached` → `Attached`: `attach()` succeeded and the target stopped
/// - `Attached` → `Detached`: `detach()`, or a timed out / cancelled attach
///
/// No other transitions are permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TracingState
{
    /// Not traced (initial and final state)
    #[default]
    Detached,
    /// Traced and stopped; peek/poke are allowed
    Attached,
}

impl fmt::Display for TracingState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TracingState::Detached => write!(f, "detached"),
            TracingState::Attached => write!(f, "attached"),
        }
    }
}

/// A process table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry
{
    /// PID of the entry
    pub pid: ProcessId,
    /// First argument of the command line (the package name on Android)
    pub command: String,
}

/// How a module name is compared against the path field of a maps line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleMatch
{
    /// The path field contains the name anywhere
    ///
    /// Tolerates versioned or path-qualified names, but `libg.so` also
    /// matches `/system/lib/libgg.so.1`.
    #[default]
    Substring,
    /// The path field, or its last path component, equals the name
    Exact,
}

impl ModuleMatch
{
    /// Check whether `path` names `module` under this mode
    ///
    /// ```rust
    /// use libpatch_core::types::ModuleMatch;
    ///
    /// assert!(ModuleMatch::Substring.matches("/data/app/lib/arm/libg.so", "libg.so"));
    /// assert!(ModuleMatch::Exact.matches("/data/app/lib/arm/libg.so", "libg.so"));
    /// assert!(!ModuleMatch::Exact.matches("/data/app/lib/arm/libgg.so", "libg.so"));
    /// ```
    pub fn matches(self, path: &str, module: &str) -> bool
    {
        match self {
            ModuleMatch::Substring => path.contains(module),
            ModuleMatch::Exact => path == module || path.rsplit('/').next() == Some(module),
        }
    }
}

/// Where a module is mapped in a process
///
/// Resolved once per session from the maps listing. If the module could have
/// been unloaded and reloaded, resolve it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleBase
{
    /// Start address of the first mapping that matched
    pub address: Address,
    /// Name the lookup was made with
    pub module_name: String,
}

impl ModuleBase
{
    /// Create a module base
    pub fn new(address: Address, module_name: impl Into<String>) -> Self
    {
        Self {
            address,
            module_name: module_name.into(),
        }
    }

    /// Compute `address + offset`, refusing to wrap around the address space
    ///
    /// Negative offsets address memory below the module base.
    pub fn offset(&self, offset: i64) -> Option<Address>
    {
        self.address.checked_add_signed(offset)
    }
}

impl fmt::Display for ModuleBase
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} @ {}", self.module_name, self.address)
    }
}

/// One line of a process's maps listing
///
/// ## Examples
///
/// ```
/// use libpatch_core::types::{Address, MemoryRegion};
///
/// let region = MemoryRegion::parse("74a000000-74a010000 r-xp 00000000 fd:01 1234 /data/lib/libg.so").unwrap();
/// assert_eq!(region.start, Address::from(0x74a000000));
/// assert_eq!(region.size(), 0x10000);
/// assert_eq!(region.path.as_deref(), Some("/data/lib/libg.so"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion
{
    /// Start address of the mapping (inclusive)
    pub start: Address,

    /// End address of the mapping (exclusive)
    pub end: Address,

    /// Permission field as printed by the kernel (`r-xp`, `rw-s`, ...)
    pub permissions: String,

    /// Mapped path or pseudo-name (`[heap]`, `[stack]`), if any
    pub path: Option<String>,
}

impl MemoryRegion
{
    /// Create a new memory region
    pub fn new(start: Address, end: Address, permissions: String, path: Option<String>) -> Self
    {
        Self {
            start,
            end,
            permissions,
            path,
        }
    }

    /// Parse one line of `/proc/<pid>/maps`
    ///
    /// The range and permission fields are required. The path is everything
    /// from the sixth field on for a full line; abbreviated lines with fewer
    /// fields take their last field as the path. Returns `None` for lines
    /// without a parseable `start-end` range.
    pub fn parse(line: &str) -> Option<Self>
    {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (range, permissions) = match fields.as_slice() {
            [range, permissions, ..] => (*range, *permissions),
            _ => return None,
        };

        let (start, end) = range.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;

        let path = if fields.len() >= 6 {
            Some(fields[5..].join(" "))
        } else if fields.len() > 2 {
            fields.last().map(|s| (*s).to_string())
        } else {
            None
        };

        Some(Self::new(Address::from(start), Address::from(end), permissions.to_string(), path))
    }

    /// Get the size of the memory region in bytes (0 if `end <= start`)
    pub fn size(&self) -> u64
    {
        self.end.distance_from(self.start)
    }

    /// Check if the region is readable
    pub fn is_readable(&self) -> bool
    {
        self.permissions.starts_with('r')
    }

    /// Check if the region is writable
    pub fn is_writable(&self) -> bool
    {
        self.permissions.chars().nth(1) == Some('w')
    }

    /// Check if the region is executable
    pub fn is_executable(&self) -> bool
    {
        self.permissions.chars().nth(2) == Some('x')
    }

    /// Check if an address lies within this memory region
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }

    /// Check whether this region's path names `module`
    pub fn maps_module(&self, module: &str, mode: ModuleMatch) -> bool
    {
        self.path.as_deref().is_some_and(|path| mode.matches(path, module))
    }
}
