//! # Process Locator
//!
//! Finds processes by command line and modules by their maps listing, using
//! the `/proc` filesystem.
//!
//! ## Process table
//!
//! Every numeric directory under the root is a process. Its identity is the
//! first NUL-separated argument of `cmdline` (on Android, the package name).
//! Kernel threads have an empty `cmdline` and are skipped, as are entries that
//! vanish or become unreadable between the directory listing and the read.
//!
//! ## Maps listing
//!
//! ```text
//! 74a000000-74a010000 r-xp 00000000 fd:01 1234   /data/app/lib/arm/libg.so
//! ^start    ^end      ^perms                     ^path
//! ```
//!
//! The listing is a snapshot; a module can be unloaded right after its base
//! has been resolved.
//!
//! ## Android helpers
//!
//! [`list_installed_packages`] lists the install directories under
//! `/data/app`, and [`ProcessLocator::login_uid`] reads a process's
//! `loginuid`. Both only inform the operator; nothing else depends on them.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{PatchError, PatchResult};
use crate::types::{MemoryRegion, ModuleBase, ModuleMatch, ProcessEntry, ProcessId};

/// Default root of the process table.
pub const PROC_ROOT: &str = "/proc";

/// Where Android installs application packages.
pub const APP_ROOT: &str = "/data/app";

/// `loginuid` value of a process that has no login session.
pub const UNSET_LOGIN_UID: u32 = u32::MAX;

/// List the entries of an application install directory such as `/data/app`
///
/// Names are returned sorted. Hidden entries are skipped.
///
/// ## Errors
///
/// `Io` if the directory cannot be listed (it usually needs root).
pub fn list_installed_packages(app_root: impl AsRef<Path>) -> PatchResult<Vec<String>>
{
    let app_root = app_root.as_ref();
    let mut packages: Vec<String> = fs::read_dir(app_root)?
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    packages.sort();
    debug!(root = %app_root.display(), count = packages.len(), "Listed installed packages");
    Ok(packages)
}

/// Looks up processes and modules under a `/proc`-shaped directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLocator
{
    root: PathBuf,
}

impl Default for ProcessLocator
{
    fn default() -> Self
    {
        Self::with_root(PROC_ROOT)
    }
}

impl ProcessLocator
{
    /// Locator over the live `/proc`
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Locator over another directory laid out like `/proc`
    pub fn with_root(root: impl Into<PathBuf>) -> Self
    {
        Self { root: root.into() }
    }

    /// Root directory this locator reads
    pub fn root(&self) -> &Path
    {
        &self.root
    }

    /// List every process with a readable, non-empty command line
    ///
    /// Sorted by ascending PID.
    ///
    /// ## Errors
    ///
    /// `Io` if the root directory itself cannot be listed.
    pub fn list_processes(&self) -> PatchResult<Vec<ProcessEntry>>
    {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let Ok(dir_entry) = dir_entry else {
                continue;
            };
            let Some(pid) = dir_entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) else {
                continue;
            };
            let pid = ProcessId::from(pid);
            if let Some(command) = self.command_of(pid) {
                entries.push(ProcessEntry { pid, command });
            }
        }
        entries.sort_by_key(|entry| entry.pid);
        debug!(root = %self.root.display(), count = entries.len(), "Listed processes");
        Ok(entries)
    }

    fn command_of(&self, pid: ProcessId) -> Option<String>
    {
        let raw = match fs::read(self.root.join(pid.to_string()).join("cmdline")) {
            Ok(raw) => raw,
            Err(err) => {
                trace!(%pid, error = %err, "Skipping unreadable cmdline");
                return None;
            }
        };
        let first = raw.split(|&b| b == 0).next().unwrap_or_default();
        let command = String::from_utf8_lossy(first);
        let command = command.trim_end_matches('\n');
        (!command.is_empty()).then(|| command.to_string())
    }

    /// Find the first process (lowest PID) whose command equals `name`
    ///
    /// ## Errors
    ///
    /// - `NotFound`: no entry matches
    /// - `Io`: the process table cannot be listed
    pub fn find_process_id_by_name(&self, name: &str) -> PatchResult<ProcessId>
    {
        let pid = self
            .list_processes()?
            .into_iter()
            .find(|entry| entry.command == name)
            .map(|entry| entry.pid)
            .ok_or_else(|| PatchError::NotFound(format!("process '{name}'")))?;
        debug!(name, %pid, "Found process");
        Ok(pid)
    }

    fn read_maps(&self, pid: ProcessId) -> PatchResult<String>
    {
        let path = self.root.join(pid.to_string()).join("maps");
        fs::read_to_string(&path)
            .map_err(|err| PatchError::NotFound(format!("maps listing {} ({err})", path.display())))
    }

    /// Parse every line of the process's maps listing
    ///
    /// Lines without a valid address range are skipped.
    ///
    /// ## Errors
    ///
    /// `NotFound` if the listing cannot be read.
    pub fn memory_regions(&self, pid: ProcessId) -> PatchResult<Vec<MemoryRegion>>
    {
        Ok(self.read_maps(pid)?.lines().filter_map(MemoryRegion::parse).collect())
    }

    /// Resolve the base address of `module` in `pid`
    ///
    /// The base is the start of the first maps line (in listing order) whose
    /// path matches `module` under `mode`.
    ///
    /// ## Errors
    ///
    /// `NotFound` if the listing cannot be read or no line matches.
    pub fn find_module_base(&self, pid: ProcessId, module: &str, mode: ModuleMatch) -> PatchResult<ModuleBase>
    {
        let base = self
            .memory_regions(pid)?
            .into_iter()
            .find(|region| region.maps_module(module, mode))
            .map(|region| ModuleBase::new(region.start, module))
            .ok_or_else(|| PatchError::NotFound(format!("module '{module}' in process {pid}")))?;
        debug!(%pid, module, address = %base.address, ?mode, "Resolved module base");
        Ok(base)
    }

    /// Login UID of `pid`, or of this process when `pid` is `None`
    ///
    /// `None` is returned when the process has no login session.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: `loginuid` cannot be read
    /// - `InvalidArgument`: its content is not a number
    pub fn login_uid(&self, pid: Option<ProcessId>) -> PatchResult<Option<u32>>
    {
        let entry = pid.map_or_else(|| "self".to_string(), |pid| pid.to_string());
        let path = self.root.join(entry).join("loginuid");
        let text = fs::read_to_string(&path)
            .map_err(|err| PatchError::NotFound(format!("login uid {} ({err})", path.display())))?;
        let uid = text
            .trim()
            .parse::<u32>()
            .map_err(|_| PatchError::InvalidArgument(format!("malformed login uid '{}'", text.trim())))?;
        Ok((uid != UNSET_LOGIN_UID).then_some(uid))
    }

    /// Whether any mapping of `pid` matches `module`
    ///
    /// ## Errors
    ///
    /// `NotFound` if the listing cannot be read.
    pub fn is_module_loaded(&self, pid: ProcessId, module: &str, mode: ModuleMatch) -> PatchResult<bool>
    {
        Ok(self
            .memory_regions(pid)?
            .iter()
            .any(|region| region.maps_module(module, mode)))
    }
}
