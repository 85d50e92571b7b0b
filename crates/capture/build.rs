// Build script for pushtohold-capture
// Compiles the Objective-C capture shim on macOS

use std::env;

fn main() {
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap();

    if target_os == "macos" {
        println!("cargo:rerun-if-changed=src/backend/macos/ScreenTap.m");
        println!("cargo:rerun-if-changed=src/backend/macos/ScreenTap.h");

        cc::Build::new()
            .file("src/backend/macos/ScreenTap.m")
            .flag("-fobjc-arc")
            .flag("-fmodules")
            .compile("ScreenTap");

        println!("cargo:rustc-link-lib=framework=Foundation");
        println!("cargo:rustc-link-lib=framework=AVFoundation");
        println!("cargo:rustc-link-lib=framework=CoreMedia");
        println!("cargo:rustc-link-lib=framework=CoreVideo");
        println!("cargo:rustc-link-lib=framework=CoreGraphics");
        println!("cargo:rustc-link-lib=framework=ScreenCaptureKit");
    }
}
