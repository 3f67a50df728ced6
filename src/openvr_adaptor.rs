//! SteamVR pose source.

use nalgebra as na;

use anyhow::Result;
use log::*;

use crate::device::{DeviceClass, InputState};
use crate::error::SourceError;
use crate::source::{DeviceDescriptor, DeviceIndex, NativePoses, PoseSource};

const BUTTON_APPLICATION_MENU: u64 = 1 << 1;
const BUTTON_GRIP: u64 = 1 << 2;
const BUTTON_A: u64 = 1 << 7;
const AXIS_JOYSTICK: usize = 0;
const AXIS_TRIGGER: usize = 1;

/// [`PoseSource`] backed by a SteamVR session.
///
/// The session lives as long as this value; dropping it shuts OpenVR down.
pub struct OpenVrSource {
    /// Context needs to be kept around for interop reasons
    /// Otherwise you get a segfault
    #[allow(dead_code)]
    context: openvr::Context,
    system: openvr::System,
    compositor: openvr::Compositor,
}

// The polling thread is the only user of the session once it is shared.
unsafe impl Send for OpenVrSource {}

impl OpenVrSource {
    pub fn new() -> Result<Self> {
        let context = unsafe { openvr::init(openvr::ApplicationType::Scene) }?;
        let system = context.system()?;
        let compositor = context.compositor()?;
        info!("OpenVR initialized");
        Ok(Self {
            context,
            system,
            compositor,
        })
    }

    fn device_class(&self, index: DeviceIndex) -> Option<DeviceClass> {
        match self.system.tracked_device_class(index) {
            openvr::TrackedDeviceClass::Invalid => None,
            openvr::TrackedDeviceClass::HMD => Some(DeviceClass::HMD),
            openvr::TrackedDeviceClass::Controller => Some(DeviceClass::Controller),
            openvr::TrackedDeviceClass::GenericTracker => Some(DeviceClass::Tracker),
            _ => Some(DeviceClass::Other),
        }
    }

    fn serial(&self, index: DeviceIndex) -> Result<String, SourceError> {
        self.system
            .string_tracked_device_property(index, openvr::property::SerialNumber_String)
            .map(|serial| serial.to_string_lossy().into_owned())
            .map_err(|error| SourceError::Transient(format!("{:?}", error)))
    }
}

impl PoseSource for OpenVrSource {
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, SourceError> {
        let mut devices = Vec::new();
        for index in 0..openvr::MAX_TRACKED_DEVICE_COUNT as DeviceIndex {
            let class = match self.device_class(index) {
                Some(class) => class,
                None => continue,
            };
            let serial = self.serial(index)?;
            debug!("Found {} {} at {}", class, serial, index);
            devices.push(DeviceDescriptor {
                index,
                serial,
                class,
            });
        }
        Ok(devices)
    }

    fn is_device_connected(&self, index: DeviceIndex) -> bool {
        self.system.is_tracked_device_connected(index)
    }

    fn wait_next_frame_poses(&mut self) -> Result<NativePoses, SourceError> {
        let poses = self
            .compositor
            .wait_get_poses()
            // compositor failures are session wide, not per device
            .map_err(|error| SourceError::Runtime(format!("{:?}", error)))?;
        Ok(poses
            .render
            .iter()
            .enumerate()
            .filter(|(_, pose)| pose.pose_is_valid())
            .map(|(index, pose)| {
                (
                    index as DeviceIndex,
                    pose.device_to_absolute_tracking().to_matrix(),
                )
            })
            .collect())
    }

    fn poll_input(&mut self) -> Result<Vec<(DeviceIndex, InputState)>, SourceError> {
        let mut states = Vec::new();
        for index in 0..openvr::MAX_TRACKED_DEVICE_COUNT as DeviceIndex {
            if self.device_class(index) != Some(DeviceClass::Controller) {
                continue;
            }
            if let Some(state) = self.system.controller_state(index) {
                let joystick = state.axis[AXIS_JOYSTICK];
                let trigger = state.axis[AXIS_TRIGGER];
                let grip = if state.button_pressed & BUTTON_GRIP != 0 {
                    1.0
                } else {
                    0.0
                };
                states.push((
                    index,
                    InputState {
                        joystick: [joystick.x, joystick.y],
                        grip,
                        trigger: trigger.x,
                        a_button: state.button_pressed & BUTTON_A != 0,
                        b_button: state.button_pressed & BUTTON_APPLICATION_MENU != 0,
                    },
                ));
            }
        }
        Ok(states)
    }
}

trait OpenVRPose {
    fn to_position(&self) -> na::Point3<f32>;
    fn to_matrix(&self) -> na::Matrix4<f32>;
}

impl OpenVRPose for [[f32; 4]; 3] {
    /// Translation column of the row-major pose.
    fn to_position(&self) -> na::Point3<f32> {
        let x = self[0][3];
        let y = self[1][3];
        let z = self[2][3];
        na::Point3::new(x, y, z)
    }

    /// Row-major 3x4 pose as a homogeneous transform.
    fn to_matrix(&self) -> na::Matrix4<f32> {
        let m = self;
        let p = self.to_position();
        na::Matrix4::new(
            m[0][0], m[0][1], m[0][2], p.x, //
            m[1][0], m[1][1], m[1][2], p.y, //
            m[2][0], m[2][1], m[2][2], p.z, //
            0., 0., 0., 1.,
        )
    }
}
