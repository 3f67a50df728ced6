//! Tracked devices known to a capture session.

use log::*;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, HostError};
use crate::host::{HostScene, LocRot};
use crate::source::{DeviceDescriptor, DeviceIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Tracker,
    Controller,
    HMD,
    Other,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceClass::Tracker => "tracker",
            DeviceClass::Controller => "controller",
            DeviceClass::HMD => "hmd",
            DeviceClass::Other => "other",
        };
        f.write_str(name)
    }
}

/// Latest controller input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub joystick: [f32; 2],
    pub grip: f32,
    pub trigger: f32,
    pub a_button: bool,
    pub b_button: bool,
}

/// Bone a tracker drives through a copy-transforms constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoneBinding {
    pub armature: String,
    pub bone: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDevice {
    /// Runtime slot, refreshed on every enumeration.
    pub index: DeviceIndex,
    /// Name of the scene object representing this device.
    pub name: String,
    pub serial: String,
    pub class: DeviceClass,
    pub connected: bool,
    pub binding: Option<BoneBinding>,
    /// Pose the tracker object had outside of calibration.
    pub target_transform: Option<LocRot>,
    /// Pose the tracker object was given during alignment.
    pub calibration_transform: Option<LocRot>,
}

impl TrackedDevice {
    fn from_descriptor(descriptor: &DeviceDescriptor) -> Self {
        Self {
            index: descriptor.index,
            name: descriptor.serial.clone(),
            serial: descriptor.serial.clone(),
            class: descriptor.class,
            connected: false,
            binding: None,
            target_transform: None,
            calibration_transform: None,
        }
    }
}

/// Every device known to a session, one entry per serial.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<TrackedDevice>,
}

pub type SharedRegistry = Arc<RwLock<DeviceRegistry>>;

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an enumeration into the registry and returns how many devices
    /// were added.
    ///
    /// Existing entries keep their name and calibration and only pick up the
    /// new slot and connected state.
    pub fn load(
        &mut self,
        descriptors: &[DeviceDescriptor],
        is_connected: impl Fn(DeviceIndex) -> bool,
        reset: bool,
    ) -> usize {
        if reset {
            self.devices.clear();
        }
        let mut added = 0;
        for descriptor in descriptors {
            let position = self
                .devices
                .iter()
                .position(|device| device.serial == descriptor.serial);
            let device = match position {
                Some(position) => &mut self.devices[position],
                None => {
                    trace!("New {} {}", descriptor.class, descriptor.serial);
                    self.devices.push(TrackedDevice::from_descriptor(descriptor));
                    added += 1;
                    let last = self.devices.len() - 1;
                    &mut self.devices[last]
                }
            };
            device.index = descriptor.index;
            device.connected = is_connected(descriptor.index);
        }
        added
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedDevice> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedDevice> {
        self.devices.iter_mut()
    }

    pub fn get(&self, serial: &str) -> Option<&TrackedDevice> {
        self.devices.iter().find(|device| device.serial == serial)
    }

    pub fn get_mut(&mut self, serial: &str) -> Option<&mut TrackedDevice> {
        self.devices.iter_mut().find(|device| device.serial == serial)
    }

    pub fn by_index(&self, index: DeviceIndex) -> Option<&TrackedDevice> {
        self.devices.iter().find(|device| device.index == index)
    }

    pub fn name_of(&self, serial: &str) -> Option<&str> {
        self.get(serial).map(|device| device.name.as_str())
    }

    /// Renames a device and the scene objects linked to it.
    ///
    /// Objects that don't exist are left alone; the registry name changes
    /// regardless. Returns false if the serial is unknown.
    pub fn rename(
        &mut self,
        host: &mut dyn HostScene,
        config: &CaptureConfig,
        serial: &str,
        new_name: &str,
    ) -> bool {
        let device = match self.get_mut(serial) {
            Some(device) => device,
            None => return false,
        };
        let old_name = std::mem::replace(&mut device.name, new_name.to_owned());
        if old_name == new_name {
            return true;
        }

        let links = [
            (old_name.clone(), new_name.to_owned()),
            (config.joint_name(&old_name), config.joint_name(new_name)),
        ];
        for (from, to) in links.iter() {
            if let Err(error) = host.rename_object(from, to) {
                debug!("Not renaming linked object: {}", error);
            }
        }
        info!("Renamed tracker {} from {:?} to {:?}", serial, old_name, new_name);
        true
    }

    /// Binds a device's joint object to an armature bone.
    ///
    /// The constraint on a previously bound bone is removed first.
    pub fn bind_bone(
        &mut self,
        host: &mut dyn HostScene,
        config: &CaptureConfig,
        serial: &str,
        armature: &str,
        bone: &str,
    ) -> Result<(), CaptureError> {
        let device = self
            .get_mut(serial)
            .ok_or_else(|| HostError::MissingObject(serial.to_owned()))?;

        if let Some(previous) = device.binding.take() {
            host.remove_bone_constraint(
                &previous.armature,
                &previous.bone,
                &config.binding_constraint,
            );
        }

        let joint = config.joint_name(&device.name);
        host.add_copy_transforms_constraint(armature, bone, &config.binding_constraint, &joint)?;
        device.binding = Some(BoneBinding {
            armature: armature.to_owned(),
            bone: bone.to_owned(),
        });
        Ok(())
    }
}
