//! Build script for libpatch-core
//!
//! Checks system requirements before compilation:
//! - Minimum Rust version (Edition 2021 = Rust 1.56.0+)
//! - Target operating system (the real tracer needs Linux or Android)

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match (rustc_version::version(), rustc_version::Version::parse("1.56.0")) {
        (Ok(found), Ok(minimum)) if found < minimum => {
            println!("cargo:warning=libpatch-core requires Rust {minimum} or newer (Edition 2021), found {found}");
        }
        (Ok(_), Ok(_)) => {}
        _ => println!("cargo:warning=could not verify Rust version"),
    }

    // cfg!(target_os) would describe the host running this script, not the target.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" && target_os != "android" {
        println!(
            "cargo:warning=libpatch-core only has a process tracer for Linux and Android; \
             building for '{target_os}' leaves the simulated tracer and file patching"
        );
    }
}
