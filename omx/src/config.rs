// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration and library path resolution.
//!
//! The core defines no file format of its own. Every type here derives
//! `serde` traits so a collaborator can embed it in whatever settings it
//! already reads.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::driver::PortDomain;

// Build script generates constants.rs with OMX_LIB_DIR
include!(concat!(env!("OUT_DIR"), "/constants.rs"));

/// Returns the path to the IL core library (`libopenmaxil.so`).
///
/// The directory is fixed at build time from the `OMX_LIB_DIR` environment
/// variable and defaults to `/opt/vc/lib`.
///
/// # Examples
///
/// ```no_run
/// use omx::config::{host_library_path, library_path};
/// use omx::load_api;
///
/// # fn main() -> Result<(), omx::Error> {
/// let api = load_api(library_path(), Some(host_library_path().as_path()))?;
/// # Ok(())
/// # }
/// ```
pub fn library_path() -> PathBuf {
    PathBuf::from(OMX_LIB_DIR).join("libopenmaxil.so")
}

/// Returns the path to the VideoCore host support library (`libbcm_host.so`).
pub fn host_library_path() -> PathBuf {
    PathBuf::from(OMX_LIB_DIR).join("libbcm_host.so")
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Upper bounds for the blocking waits of a component.
///
/// Serialized as whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// State changes, port enable/disable and flush completion.
    #[serde(with = "millis")]
    pub command: Duration,
    /// Plain event waits such as port-settings-changed.
    #[serde(with = "millis")]
    pub event: Duration,
    /// Default bound for buffer acquisition.
    #[serde(with = "millis")]
    pub buffer: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_millis(2000),
            event: Duration::from_millis(300),
            buffer: Duration::from_millis(200),
        }
    }
}

/// Longest wait a deadline is computed for; larger timeouts are clamped.
const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Deadline `timeout` from now that cannot overflow [`Instant`].
pub(crate) fn deadline(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(MAX_WAIT))
        .unwrap_or(now)
}

/// Input and output port numbers of a unit, relative to the first port the
/// driver declares for it.
///
/// Without a `domain` the first domain with declared ports is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLayout {
    pub input_offset: u32,
    pub output_offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<PortDomain>,
}

impl Default for PortLayout {
    fn default() -> Self {
        Self {
            input_offset: 0,
            output_offset: 1,
            domain: None,
        }
    }
}

impl PortLayout {
    /// Resolves the layout against the driver's declared port range.
    ///
    /// The output index never points past the last declared port, so single
    /// port units report the same index for input and output.
    pub fn resolve(&self, start: u32, count: u32) -> (u32, u32) {
        let last = start + count.saturating_sub(1);
        let input = start + self.input_offset;
        let output = (start + self.output_offset).min(last);
        (input, output)
    }
}

/// Port layout table keyed by unit name.
///
/// Units that number their ports unusually are listed explicitly; everything
/// else uses the default layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortLayouts {
    pub default: PortLayout,
    pub units: BTreeMap<String, PortLayout>,
}

impl PortLayouts {
    /// A table with only a default layout.
    pub fn new(default: PortLayout) -> Self {
        Self {
            default,
            units: BTreeMap::new(),
        }
    }

    /// The Broadcom VideoCore units.
    ///
    /// The audio mixer takes input on its second port, and the camera
    /// delivers preview on its first port while its clock input sits at
    /// `start + 3`.
    pub fn broadcom() -> Self {
        Self::new(PortLayout::default())
            .with(
                "OMX.broadcom.audio_mixer",
                PortLayout {
                    input_offset: 1,
                    output_offset: 0,
                    domain: Some(PortDomain::Audio),
                },
            )
            .with(
                "OMX.broadcom.camera",
                PortLayout {
                    input_offset: 3,
                    output_offset: 0,
                    domain: Some(PortDomain::Video),
                },
            )
    }

    pub fn with(mut self, unit: impl Into<String>, layout: PortLayout) -> Self {
        self.units.insert(unit.into(), layout);
        self
    }

    pub fn layout_for(&self, unit: &str) -> PortLayout {
        self.units.get(unit).copied().unwrap_or(self.default)
    }
}

impl Default for PortLayouts {
    fn default() -> Self {
        Self::broadcom()
    }
}

/// Everything a [`crate::Component`] needs besides its driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    pub timeouts: Timeouts,
    pub layouts: PortLayouts,
}
