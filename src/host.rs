//! Host scene boundary.
//!
//! Everything the capture core needs from the host application: objects,
//! transforms, animation curves, armatures and timeline state. All calls
//! happen on the host's main context, never from the polling thread.

use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::HostError;

/// Animated property of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Location,
    RotationQuaternion,
    Scale,
}

impl Channel {
    pub const ALL: [Channel; 3] = [
        Channel::Location,
        Channel::RotationQuaternion,
        Channel::Scale,
    ];

    pub fn data_path(self) -> &'static str {
        match self {
            Channel::Location => "location",
            Channel::RotationQuaternion => "rotation_quaternion",
            Channel::Scale => "scale",
        }
    }

    pub fn components(self) -> usize {
        match self {
            Channel::Location => 3,
            Channel::RotationQuaternion => 4,
            Channel::Scale => 3,
        }
    }
}

/// A single scalar curve on an object: channel plus component index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurveKey {
    pub channel: Channel,
    pub index: usize,
}

impl CurveKey {
    pub fn new(channel: Channel, index: usize) -> Self {
        Self { channel, index }
    }
}

impl fmt::Display for CurveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.channel.data_path(), self.index)
    }
}

/// Keyframe on a scene timeline. Frames may be fractional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame: f64,
    pub value: f32,
}

/// Local location and rotation of an object, scale left out on purpose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocRot {
    pub location: na::Vector3<f32>,
    pub rotation: na::UnitQuaternion<f32>,
}

impl Default for LocRot {
    fn default() -> Self {
        Self {
            location: na::Vector3::zeros(),
            rotation: na::UnitQuaternion::identity(),
        }
    }
}

pub trait HostScene {
    fn object_exists(&self, name: &str) -> bool;

    fn world_transform(&self, name: &str) -> Option<na::Matrix4<f32>>;
    fn set_world_transform(
        &mut self,
        name: &str,
        transform: &na::Matrix4<f32>,
    ) -> Result<(), HostError>;

    fn scale(&self, name: &str) -> Option<na::Vector3<f32>>;
    fn set_scale(&mut self, name: &str, scale: na::Vector3<f32>) -> Result<(), HostError>;

    fn local_loc_rot(&self, name: &str) -> Option<LocRot>;
    fn set_local_loc_rot(&mut self, name: &str, loc_rot: &LocRot) -> Result<(), HostError>;

    fn rename_object(&mut self, from: &str, to: &str) -> Result<(), HostError>;

    /// True while the timeline is playing back or being scrubbed.
    fn is_playing(&self) -> bool;
    /// Frames per second, already divided by the host's frame-rate base.
    fn frame_rate(&self) -> f64;
    fn current_frame(&self) -> i32;

    fn ensure_animation_data(&mut self, name: &str) -> Result<(), HostError>;
    fn has_curve(&self, name: &str, key: CurveKey) -> bool;
    fn remove_curve(&mut self, name: &str, key: CurveKey) -> bool;
    fn new_curve(&mut self, name: &str, key: CurveKey) -> Result<(), HostError>;
    /// Writes every keyframe of a freshly created curve in one call.
    fn set_keyframes(
        &mut self,
        name: &str,
        key: CurveKey,
        keyframes: &[Keyframe],
    ) -> Result<(), HostError>;

    /// Switches every armature between rest position and pose position.
    fn set_armature_rest_pose(&mut self, rest: bool);
    fn remove_bone_constraint(&mut self, armature: &str, bone: &str, constraint: &str) -> bool;
    fn add_copy_transforms_constraint(
        &mut self,
        armature: &str,
        bone: &str,
        constraint: &str,
        target: &str,
    ) -> Result<(), HostError>;
}
