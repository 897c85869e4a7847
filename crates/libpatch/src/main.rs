use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use libpatch_core::error::PatchResult;
use libpatch_core::file_patch::put_static_bytes;
use libpatch_core::locator::{list_installed_packages, ProcessLocator, APP_ROOT};
use libpatch_core::memory::{MemoryReader, MemoryWriter, ReaderOptions, DEFAULT_MAX_STRING_LEN};
use libpatch_core::session::{AttachOptions, ProcessHandle};
use libpatch_core::tracer::Tracer;
use libpatch_core::types::{format_offset, parse_int, ModuleBase, ModuleMatch, ProcessId, ValueKind};
use libpatch_utils::{info, init_logging, init_logging_with_level, warn, LogLevel};

/// Locate a process, attach with ptrace and patch a loaded library.
#[derive(Parser, Debug)]
#[command(name = "libpatch")]
#[command(version)]
#[command(about = "Locate a process, attach with ptrace and patch a loaded library's memory or on-disk image", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG): error, warn, info, debug, trace
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Give up attaching after this many milliseconds (waits forever if unset)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Where to find the module to patch
#[derive(clap::Args, Debug)]
struct Target
{
    /// Process command line (package name on Android)
    name: String,
    /// Module to locate in the maps listing (e.g. libg.so)
    module: String,
    /// Offset from the module base (0x hex or decimal, may be negative)
    #[arg(value_parser = parse_module_offset, allow_hyphen_values = true)]
    offset: i64,
    /// Require the module's file name to match exactly instead of by substring
    #[arg(long, default_value_t = false)]
    exact: bool,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List processes with a command line
    Ps
    {
        /// Only show commands containing this text
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print the PID of a process by command line
    Pid
    {
        /// Process command line (package name on Android)
        name: String,
    },
    /// List the memory regions of a process
    Regions
    {
        /// Process ID
        pid: u32,
    },
    /// Print the base address of a module in a process
    Base
    {
        /// Process ID
        pid: u32,
        /// Module to locate in the maps listing
        module: String,
        /// Require the module's file name to match exactly
        #[arg(long, default_value_t = false)]
        exact: bool,
    },
    /// Attach, read a value at module base + offset, detach
    Read
    {
        #[command(flatten)]
        target: Target,
        /// byte, word, dword, little-dword, double-dword, qword, string or bytes
        kind: ValueKind,
        /// Number of bytes for `bytes`
        #[arg(long, default_value_t = 16)]
        size: usize,
        /// Longest string scanned for a terminator
        #[arg(long, default_value_t = DEFAULT_MAX_STRING_LEN)]
        max_string_len: usize,
    },
    /// Attach, write a value at module base + offset, detach
    Write
    {
        #[command(flatten)]
        target: Target,
        /// byte, word, dword, little-dword, double-dword, qword, string or bytes
        kind: ValueKind,
        /// Value to write (`lo,hi` for double-dword, hex pairs for bytes)
        value: String,
    },
    /// Attach, write an ARM return (BX LR) at module base + offset, detach
    Ret
    {
        #[command(flatten)]
        target: Target,
    },
    /// Attach, write an ARM no-op at module base + offset, detach
    Nop
    {
        #[command(flatten)]
        target: Target,
    },
    /// List installed application packages (Android, usually needs root)
    Packages
    {
        /// Install directory to list
        #[arg(long, default_value = APP_ROOT)]
        root: String,
    },
    /// Print the login UID of a process (this one if no PID is given)
    LoginUid
    {
        /// Process ID
        pid: Option<u32>,
    },
    /// Overwrite four bytes of a library file on disk
    StaticPatch
    {
        /// Path to the library file
        path: String,
        /// File offset (0x hex or decimal)
        #[arg(value_parser = parse_file_offset)]
        offset: u64,
        /// Four bytes as hex pairs, e.g. "1E FF 2F E1"
        hex: String,
    },
}

fn parse_module_offset(text: &str) -> Result<i64, String>
{
    parse_int::<i64>(text).map_err(|err| err.to_string())
}

fn parse_file_offset(text: &str) -> Result<u64, String>
{
    if text.trim_start().starts_with('-') {
        return Err(format!("file offset '{text}' cannot be negative"));
    }
    parse_int::<u64>(text).map_err(|err| err.to_string())
}

fn main()
{
    let cli = Cli::parse();

    // Hold the guard until exit so buffered file logs are flushed.
    let logging = match cli.log_level {
        Some(level) => init_logging_with_level(level),
        None => init_logging(),
    };
    let _guard = match logging {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "Could not install Ctrl-C handler; attach cannot be interrupted");
    }

    let mut options = AttachOptions::default().with_cancel_flag(cancel);
    if let Some(ms) = cli.timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }

    if let Err(e) = run_command(cli.command, &options) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn module_match(exact: bool) -> ModuleMatch
{
    if exact { ModuleMatch::Exact } else { ModuleMatch::Substring }
}

/// Resolve the target and attach to it
fn open_target(target: &Target, options: &AttachOptions) -> PatchResult<(ProcessHandle, ModuleBase)>
{
    let locator = ProcessLocator::new();
    let pid = locator.find_process_id_by_name(&target.name)?;
    let base = locator.find_module_base(pid, &target.module, module_match(target.exact))?;
    info!(%pid, base = %base, "Attaching");
    let handle = ProcessHandle::attach_to(pid, options)?;
    Ok((handle, base))
}

fn run_command(command: Commands, options: &AttachOptions) -> PatchResult<()>
{
    match command {
        Commands::Ps { filter } => {
            for entry in ProcessLocator::new().list_processes()? {
                if filter.as_deref().map_or(true, |f| entry.command.contains(f)) {
                    println!("{:>7}  {}", entry.pid.raw(), entry.command);
                }
            }
            Ok(())
        }
        Commands::Pid { name } => {
            println!("{}", ProcessLocator::new().find_process_id_by_name(&name)?);
            Ok(())
        }
        Commands::Regions { pid } => {
            for region in ProcessLocator::new().memory_regions(ProcessId::from(pid))? {
                println!(
                    "{:#014x}-{:#014x} {} {}",
                    region.start,
                    region.end,
                    region.permissions,
                    region.path.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Commands::Base { pid, module, exact } => {
            let base = ProcessLocator::new().find_module_base(ProcessId::from(pid), &module, module_match(exact))?;
            println!("{:#x}", base.address);
            Ok(())
        }
        Commands::Read {
            target,
            kind,
            size,
            max_string_len,
        } => {
            let (handle, base) = open_target(&target, options)?;
            let result = MemoryReader::with_options(&handle, &base, ReaderOptions { max_string_len })
                .read(target.offset, kind, size);
            println!("{}", detach_after(handle, result)?);
            Ok(())
        }
        Commands::Write { target, kind, value } => {
            let value = kind.parse_value(&value)?;
            let (mut handle, base) = open_target(&target, options)?;
            let result = MemoryWriter::new(&mut handle, &base).put(target.offset, &value);
            detach_after(handle, result)?;
            println!("Wrote {value} at {base} {}", signed_offset(target.offset));
            Ok(())
        }
        Commands::Ret { target } => patch_instruction(&target, options, "ret", |writer, offset| writer.put_ret(offset)),
        Commands::Nop { target } => patch_instruction(&target, options, "nop", |writer, offset| writer.put_nop(offset)),
        Commands::Packages { root } => {
            for package in list_installed_packages(&root)? {
                println!("{package}");
            }
            Ok(())
        }
        Commands::LoginUid { pid } => {
            match ProcessLocator::new().login_uid(pid.map(ProcessId::from))? {
                Some(uid) => println!("{uid}"),
                None => println!("unset"),
            }
            Ok(())
        }
        Commands::StaticPatch { path, offset, hex } => {
            put_static_bytes(&path, offset, &hex)?;
            println!("Patched {path} at {offset:#x}");
            Ok(())
        }
    }
}

fn patch_instruction<F>(target: &Target, options: &AttachOptions, name: &str, patch: F) -> PatchResult<()>
where
    F: FnOnce(&mut MemoryWriter<'_, Box<dyn Tracer>>, i64) -> PatchResult<()>,
{
    let (mut handle, base) = open_target(target, options)?;
    let result = patch(&mut MemoryWriter::new(&mut handle, &base), target.offset);
    detach_after(handle, result)?;
    println!("Wrote {name} at {base} {}", signed_offset(target.offset));
    Ok(())
}

/// `+ 0x10` or `- 0x10`
fn signed_offset(offset: i64) -> String
{
    match format_offset(offset).strip_prefix('-') {
        Some(magnitude) => format!("- {magnitude}"),
        None => format!("+ {}", format_offset(offset)),
    }
}

/// Detach once a read or write is done
///
/// A failed operation is reported ahead of a failed detach; the detach error
/// is only logged then.
fn detach_after<T: Tracer, R>(mut handle: ProcessHandle<T>, result: PatchResult<R>) -> PatchResult<R>
{
    let detached = handle.detach();
    match result {
        Ok(value) => detached.map(|()| value),
        Err(err) => {
            if let Err(detach_err) = detached {
                warn!(pid = %handle.pid(), error = %detach_err, "Detach after a failed operation also failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;
    use libpatch_core::error::PatchError;
    use libpatch_core::platform::simulated::SimulatedTracer;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid()
    {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_offsets_accept_hex_and_decimal()
    {
        assert_eq!(parse_module_offset("0x1f00").unwrap(), 0x1f00);
        assert_eq!(parse_module_offset("4096").unwrap(), 4096);
        assert_eq!(parse_module_offset("-16").unwrap(), -16);
        assert!(parse_module_offset("x10").is_err());
        assert_eq!(parse_file_offset("0x10").unwrap(), 0x10);
        assert!(parse_file_offset("-16").is_err());
    }

    #[test]
    fn test_negative_offset_is_not_taken_for_a_flag()
    {
        let cli = Cli::try_parse_from(["libpatch", "ret", "com.example.app", "libg.so", "-0x10"]).unwrap();
        match cli.command {
            Commands::Ret { target } => assert_eq!(target.offset, -0x10),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(signed_offset(-0x10), "- 0x10");
        assert_eq!(signed_offset(0x10), "+ 0x10");
    }

    fn attached_handle() -> ProcessHandle<SimulatedTracer>
    {
        let pid = ProcessId::from(77);
        let mut handle = ProcessHandle::new(pid, SimulatedTracer::new(pid));
        handle.attach(&AttachOptions::default()).unwrap();
        handle
    }

    #[test]
    fn test_operation_error_wins_over_detach_error()
    {
        let mut handle = attached_handle();
        handle.detach().unwrap();

        // Detaching again fails, and the operation error is still returned.
        let failed: PatchResult<()> = Err(PatchError::NotFound("module 'libg.so'".to_string()));
        assert!(matches!(detach_after(handle, failed), Err(PatchError::NotFound(_))));
    }

    #[test]
    fn test_detach_error_reported_after_successful_operation()
    {
        let mut handle = attached_handle();
        handle.detach().unwrap();
        assert!(matches!(detach_after(handle, Ok(5)), Err(PatchError::InvalidState(_))));

        let handle = attached_handle();
        assert_eq!(detach_after(handle, Ok(5)).unwrap(), 5);
    }

    #[test]
    fn test_packages_subcommand_defaults_to_data_app()
    {
        let cli = Cli::try_parse_from(["libpatch", "packages"]).unwrap();
        assert!(matches!(cli.command, Commands::Packages { root } if root == APP_ROOT));
    }

    #[test]
    fn test_write_subcommand_parses()
    {
        let cli = Cli::try_parse_from([
            "libpatch",
            "--timeout-ms",
            "500",
            "write",
            "com.example.app",
            "libg.so",
            "0x1a2b",
            "dword",
            "0xFFFFFFFF",
            "--exact",
        ])
        .unwrap();

        assert_eq!(cli.timeout_ms, Some(500));
        match cli.command {
            Commands::Write { target, kind, value } => {
                assert_eq!(target.offset, 0x1a2b);
                assert!(target.exact);
                assert_eq!(kind, ValueKind::Dword);
                assert_eq!(value, "0xFFFFFFFF");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_static_patch_subcommand_parses()
    {
        let cli = Cli::try_parse_from(["libpatch", "static-patch", "libg.so", "16", "1E FF 2F E1"]).unwrap();
        assert!(matches!(cli.command, Commands::StaticPatch { offset: 16, .. }));
    }
}
