//! Device pose source boundary.

use nalgebra as na;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::device::{DeviceClass, InputState};
use crate::error::SourceError;

/// Runtime slot of a tracked device. Not stable across runtime restarts, the
/// serial is.
pub type DeviceIndex = u32;

/// One enumerated device slot.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub index: DeviceIndex,
    pub serial: String,
    pub class: DeviceClass,
}

/// Native transforms of every device the runtime reported for one frame.
pub type NativePoses = HashMap<DeviceIndex, na::Matrix4<f32>>;

pub trait PoseSource: Send {
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, SourceError>;

    fn is_device_connected(&self, index: DeviceIndex) -> bool;

    /// Blocks until the runtime hands out the next frame's poses.
    ///
    /// This is the pacing of the polling loop, so it may block for up to one
    /// display frame.
    fn wait_next_frame_poses(&mut self) -> Result<NativePoses, SourceError>;

    /// Controller input states, polled after the poses of each frame.
    fn poll_input(&mut self) -> Result<Vec<(DeviceIndex, InputState)>, SourceError> {
        Ok(Vec::new())
    }
}

pub type SharedPoseSource = Arc<Mutex<dyn PoseSource>>;

pub fn shared<S: PoseSource + 'static>(source: S) -> SharedPoseSource {
    Arc::new(Mutex::new(source))
}
