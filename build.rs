//! Build script for hostlink
//!
//! The module finds `hl_host_probe` by looking it up in the host executable's
//! own image, which only works when the executable exports its symbols
//! dynamically. Test binaries get the same flag so the probe can be exercised
//! in-process.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let flag = match target_os.as_str() {
        "linux" | "android" | "freebsd" | "netbsd" | "openbsd" | "dragonfly" => {
            "-Wl,--export-dynamic"
        }
        "macos" | "ios" => "-Wl,-export_dynamic",
        _ => {
            // PE executables export nothing unless told symbol by symbol
            println!(
                "cargo:warning=hostlink: {} host image exports are not configured; the bootstrap probe will not resolve",
                target_os
            );
            return;
        }
    };

    println!("cargo:rustc-link-arg-bin=hl={}", flag);
    println!("cargo:rustc-link-arg-tests={}", flag);
}
