// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Common utilities shared across examples.

use std::{path::PathBuf, sync::Arc};

use omx::{IlDriver, config, load_api};

/// Initializes tracing subscriber for examples.
///
/// Configures logging to stdout with an INFO level filter, respecting the
/// `RUST_LOG` environment variable for custom log levels.
pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// Loads the IL libraries from `lib_dir`, or from the build-time default
/// directory, and wraps them in a driver.
pub fn open_driver(lib_dir: Option<PathBuf>, no_host: bool) -> Result<Arc<IlDriver>, omx::Error> {
    let (il, host) = match lib_dir {
        Some(dir) => (dir.join("libopenmaxil.so"), dir.join("libbcm_host.so")),
        None => (config::library_path(), config::host_library_path()),
    };
    let api = load_api(&il, (!no_host).then_some(host.as_path()))?;
    Ok(Arc::new(IlDriver::new(api)))
}
