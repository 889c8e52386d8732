//! Auxiliary controller discovery.

use crate::error::{Error, Result};
use crate::{pids, LOGITECH_VID};
use tracing::{debug, info};

/// Supported Kosmos controller hardware revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerModel {
    KosmosV1,
    KosmosV2,
}

impl ControllerModel {
    /// Look up model from USB product ID.
    pub fn from_pid(pid: u16) -> Option<Self> {
        match pid {
            pids::KOSMOS_V1 => Some(Self::KosmosV1),
            pids::KOSMOS_V2 => Some(Self::KosmosV2),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::KosmosV1 => "Kosmos test controller v1",
            Self::KosmosV2 => "Kosmos test controller v2",
        }
    }

    /// USB Product ID.
    pub fn pid(&self) -> u16 {
        match self {
            Self::KosmosV1 => pids::KOSMOS_V1,
            Self::KosmosV2 => pids::KOSMOS_V2,
        }
    }
}

/// Information about a discovered controller.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub model: ControllerModel,
    pub vid: u16,
    pub pid: u16,
    pub path: String,
    pub serial: Option<String>,
}

/// Discover all attached Kosmos controllers.
///
/// Enumerates USB HID devices and returns info for any recognized models.
pub fn discover_controllers() -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Transport(e.to_string()))?;

    let mut devices = Vec::new();
    for info in api.device_list() {
        if info.vendor_id() != LOGITECH_VID {
            continue;
        }

        if let Some(model) = ControllerModel::from_pid(info.product_id()) {
            info!(
                model = model.name(),
                vid = format_args!("0x{:04X}", info.vendor_id()),
                pid = format_args!("0x{:04X}", info.product_id()),
                path = %info.path().to_string_lossy(),
                "Found controller"
            );
            devices.push(DeviceInfo {
                model,
                vid: info.vendor_id(),
                pid: info.product_id(),
                path: info.path().to_string_lossy().into_owned(),
                serial: info.serial_number().map(|s| s.to_string()),
            });
        }
    }

    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_model_from_known_pid() {
        assert_eq!(
            ControllerModel::from_pid(pids::KOSMOS_V1),
            Some(ControllerModel::KosmosV1)
        );
        assert_eq!(
            ControllerModel::from_pid(pids::KOSMOS_V2),
            Some(ControllerModel::KosmosV2)
        );
    }

    #[test]
    fn controller_model_from_unknown_pid() {
        assert_eq!(ControllerModel::from_pid(0x1234), None);
    }

    #[test]
    fn model_names_and_pids_roundtrip() {
        for model in [ControllerModel::KosmosV1, ControllerModel::KosmosV2] {
            assert!(!model.name().is_empty());
            assert_eq!(ControllerModel::from_pid(model.pid()), Some(model));
        }
    }
}
