// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Opens one hardware unit, prints what the driver reports about it and
//! walks it through Loaded -> Idle -> Loaded.
//!
//! ```text
//! cargo run -p omx --example probe -- OMX.broadcom.video_encode
//! ```

mod common;

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use omx::{Component, ComponentConfig, State, Timeouts};
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about = "Probe an OpenMAX IL component")]
struct Opts {
    /// Component name, e.g. OMX.broadcom.video_encode
    name: String,

    /// Directory holding libopenmaxil.so and libbcm_host.so
    #[arg(long, env = "OMX_LIB_DIR")]
    lib_dir: Option<PathBuf>,

    /// Skip the VideoCore host library
    #[arg(long)]
    no_host: bool,

    /// Allocate caller memory instead of driver buffers
    #[arg(long)]
    external: bool,

    /// Command completion timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    command_timeout: u64,
}

fn main() -> Result<(), omx::Error> {
    common::setup_logging();
    let opts = Opts::parse();

    let driver = common::open_driver(opts.lib_dir, opts.no_host)?;
    let config = ComponentConfig {
        timeouts: Timeouts {
            command: Duration::from_millis(opts.command_timeout),
            ..Timeouts::default()
        },
        ..ComponentConfig::default()
    };

    let component = Component::open(driver, &opts.name, config)?;
    info!(
        name = component.name(),
        state = %component.state(),
        input_port = component.input_port(),
        output_port = component.output_port(),
        "component opened"
    );

    for port in [component.input_port(), component.output_port()] {
        let definition = component.port_definition(port)?;
        info!(
            port,
            direction = if definition.eDir == omx::sys::OMX_DirInput {
                "input"
            } else {
                "output"
            },
            buffers = definition.nBufferCountActual,
            minimum = definition.nBufferCountMin,
            size = definition.nBufferSize,
            alignment = definition.nBufferAlignment,
            "port definition"
        );
    }

    component.allocate_output_buffers(opts.external)?;
    info!(
        state = %component.state(),
        stats = ?component.output_stats(),
        bytes = component.output_buffer_size(),
        "output buffers allocated"
    );

    component.free_output_buffers(true)?;
    component.set_state(State::Loaded)?;
    info!(state = %component.state(), "back to loaded");

    component.close()
}
