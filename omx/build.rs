// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for the `omx` crate.
//!
//! This script generates `constants.rs` containing the compile-time
//! directory of the VideoCore userland libraries. The configuration module
//! uses it to locate `libopenmaxil.so` and `libbcm_host.so` at runtime.

use std::env;
use std::path::PathBuf;

/// Where Raspberry Pi OS installs the VideoCore userland.
const DEFAULT_LIB_DIR: &str = "/opt/vc/lib";

fn main() {
    println!("cargo:rerun-if-env-changed=OMX_LIB_DIR");
    let lib_dir = env::var("OMX_LIB_DIR").unwrap_or_else(|_| DEFAULT_LIB_DIR.to_string());

    // Generate constants.rs in the build output directory
    let out_path = PathBuf::from(env::var("OUT_DIR").expect("failed to get output directory"))
        .join("constants.rs");

    let data = format!("pub const OMX_LIB_DIR: &str = {:?};\n", lib_dir);
    std::fs::write(out_path, data).expect("Unable to write file");
}
