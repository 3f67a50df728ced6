//! Calibration stages.
//!
//! During alignment the user moves tracker objects onto the character in rest
//! pose; during offsetting they adjust joint offsets in pose position. The
//! tracker object poses from alignment are kept per device and swapped in and
//! out as the stages cycle. Scale is never touched.

use log::*;

use crate::device::DeviceRegistry;
use crate::host::HostScene;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStage {
    Idle,
    Alignment,
    Offsetting,
}

impl Default for CalibrationStage {
    fn default() -> Self {
        CalibrationStage::Idle
    }
}

impl CalibrationStage {
    pub fn next(self) -> Self {
        match self {
            CalibrationStage::Idle => CalibrationStage::Alignment,
            CalibrationStage::Alignment => CalibrationStage::Offsetting,
            CalibrationStage::Offsetting => CalibrationStage::Idle,
        }
    }
}

/// Remembers where each connected tracker object is and moves it back to its
/// calibrated pose.
pub fn enter_alignment(host: &mut dyn HostScene, registry: &mut DeviceRegistry) {
    for device in registry.iter_mut().filter(|device| device.connected) {
        let current = match host.local_loc_rot(&device.name) {
            Some(current) => current,
            None => continue,
        };
        device.target_transform = Some(current);
        if let Some(calibration) = device.calibration_transform {
            if let Err(error) = host.set_local_loc_rot(&device.name, &calibration) {
                debug!("Could not restore calibration: {}", error);
            }
        }
    }
}

/// Stores the calibrated pose of each connected tracker object and puts the
/// object back where it was before alignment.
pub fn finish_calibration(host: &mut dyn HostScene, registry: &mut DeviceRegistry) {
    for device in registry.iter_mut().filter(|device| device.connected) {
        let current = match host.local_loc_rot(&device.name) {
            Some(current) => current,
            None => continue,
        };
        device.calibration_transform = Some(current);
        if let Some(target) = device.target_transform {
            if let Err(error) = host.set_local_loc_rot(&device.name, &target) {
                debug!("Could not restore target transform: {}", error);
            }
        }
    }
}
