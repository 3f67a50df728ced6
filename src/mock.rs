//! In-memory scene and scripted pose source for tests.

use nalgebra as na;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::thread;
use std::time::Duration;

use crate::device::InputState;
use crate::error::{HostError, SourceError};
use crate::host::{CurveKey, HostScene, Keyframe, LocRot};
use crate::source::{DeviceDescriptor, DeviceIndex, NativePoses, PoseSource};

#[derive(Debug, Clone, PartialEq)]
pub struct MockObject {
    pub world: na::Matrix4<f32>,
    pub scale: na::Vector3<f32>,
    pub loc_rot: LocRot,
    pub animation_data: bool,
    pub curves: BTreeMap<CurveKey, Vec<Keyframe>>,
}

impl Default for MockObject {
    fn default() -> Self {
        Self {
            world: na::Matrix4::identity(),
            scale: na::Vector3::new(1.0, 1.0, 1.0),
            loc_rot: LocRot::default(),
            animation_data: false,
            curves: BTreeMap::new(),
        }
    }
}

pub struct MockScene {
    objects: HashMap<String, MockObject>,
    bones: HashMap<(String, String), Vec<(String, String)>>,
    frame_rate: f64,
    removed_curves: usize,
    pub playing: bool,
    pub current_frame: i32,
    pub rest_pose: bool,
}

impl MockScene {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            bones: HashMap::new(),
            frame_rate: 24.0,
            removed_curves: 0,
            playing: false,
            current_frame: 1,
            rest_pose: false,
        }
    }

    pub fn add_object(&mut self, name: &str) {
        self.objects.insert(name.to_owned(), MockObject::default());
    }

    pub fn add_bone(&mut self, armature: &str, bone: &str) {
        self.bones
            .insert((armature.to_owned(), bone.to_owned()), Vec::new());
    }

    pub fn object(&self, name: &str) -> &MockObject {
        &self.objects[name]
    }

    pub fn object_mut(&mut self, name: &str) -> &mut MockObject {
        self.objects.get_mut(name).expect("no such mock object")
    }

    pub fn set_frame_rate(&mut self, frame_rate: f64) {
        self.frame_rate = frame_rate;
    }

    pub fn curve(&self, name: &str, key: CurveKey) -> Option<&Vec<Keyframe>> {
        self.objects.get(name).and_then(|object| object.curves.get(&key))
    }

    pub fn removed_curves(&self) -> usize {
        self.removed_curves
    }

    pub fn constraints(&self, armature: &str, bone: &str) -> Vec<(String, String)> {
        self.bones
            .get(&(armature.to_owned(), bone.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut MockObject, HostError> {
        self.objects
            .get_mut(name)
            .ok_or_else(|| HostError::MissingObject(name.to_owned()))
    }
}

impl HostScene for MockScene {
    fn object_exists(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    fn world_transform(&self, name: &str) -> Option<na::Matrix4<f32>> {
        self.objects.get(name).map(|object| object.world)
    }

    fn set_world_transform(
        &mut self,
        name: &str,
        transform: &na::Matrix4<f32>,
    ) -> Result<(), HostError> {
        self.get_mut(name)?.world = *transform;
        Ok(())
    }

    fn scale(&self, name: &str) -> Option<na::Vector3<f32>> {
        self.objects.get(name).map(|object| object.scale)
    }

    fn set_scale(&mut self, name: &str, scale: na::Vector3<f32>) -> Result<(), HostError> {
        self.get_mut(name)?.scale = scale;
        Ok(())
    }

    fn local_loc_rot(&self, name: &str) -> Option<LocRot> {
        self.objects.get(name).map(|object| object.loc_rot)
    }

    fn set_local_loc_rot(&mut self, name: &str, loc_rot: &LocRot) -> Result<(), HostError> {
        self.get_mut(name)?.loc_rot = *loc_rot;
        Ok(())
    }

    fn rename_object(&mut self, from: &str, to: &str) -> Result<(), HostError> {
        let object = self
            .objects
            .remove(from)
            .ok_or_else(|| HostError::MissingObject(from.to_owned()))?;
        self.objects.insert(to.to_owned(), object);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn current_frame(&self) -> i32 {
        self.current_frame
    }

    fn ensure_animation_data(&mut self, name: &str) -> Result<(), HostError> {
        self.get_mut(name)?.animation_data = true;
        Ok(())
    }

    fn has_curve(&self, name: &str, key: CurveKey) -> bool {
        self.curve(name, key).is_some()
    }

    fn remove_curve(&mut self, name: &str, key: CurveKey) -> bool {
        let removed = self
            .objects
            .get_mut(name)
            .and_then(|object| object.curves.remove(&key))
            .is_some();
        if removed {
            self.removed_curves += 1;
        }
        removed
    }

    fn new_curve(&mut self, name: &str, key: CurveKey) -> Result<(), HostError> {
        self.get_mut(name)?.curves.insert(key, Vec::new());
        Ok(())
    }

    fn set_keyframes(
        &mut self,
        name: &str,
        key: CurveKey,
        keyframes: &[Keyframe],
    ) -> Result<(), HostError> {
        let curve = self
            .get_mut(name)?
            .curves
            .get_mut(&key)
            .ok_or_else(|| HostError::MissingObject(format!("{} {}", name, key)))?;
        *curve = keyframes.to_vec();
        Ok(())
    }

    fn set_armature_rest_pose(&mut self, rest: bool) {
        self.rest_pose = rest;
    }

    fn remove_bone_constraint(&mut self, armature: &str, bone: &str, constraint: &str) -> bool {
        match self.bones.get_mut(&(armature.to_owned(), bone.to_owned())) {
            Some(constraints) => {
                let before = constraints.len();
                constraints.retain(|(name, _)| name != constraint);
                constraints.len() != before
            }
            None => false,
        }
    }

    fn add_copy_transforms_constraint(
        &mut self,
        armature: &str,
        bone: &str,
        constraint: &str,
        target: &str,
    ) -> Result<(), HostError> {
        let constraints = self
            .bones
            .get_mut(&(armature.to_owned(), bone.to_owned()))
            .ok_or_else(|| HostError::MissingBone {
                armature: armature.to_owned(),
                bone: bone.to_owned(),
            })?;
        constraints.push((constraint.to_owned(), target.to_owned()));
        Ok(())
    }
}

/// Pose source replaying fixed poses at a fixed pace.
pub struct MockSource {
    pub devices: Vec<DeviceDescriptor>,
    pub connected: HashSet<DeviceIndex>,
    pub poses: NativePoses,
    pub inputs: Vec<(DeviceIndex, InputState)>,
    pub frame_delay: Duration,
    /// Every n-th wait fails with `failure`.
    pub fail_every: Option<usize>,
    pub failure: SourceError,
    pub input_error: bool,
    wait_calls: usize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            connected: HashSet::new(),
            poses: NativePoses::new(),
            inputs: Vec::new(),
            frame_delay: Duration::from_millis(1),
            fail_every: None,
            failure: SourceError::Transient(String::from("tracking lost")),
            input_error: false,
            wait_calls: 0,
        }
    }

    pub fn add_device(&mut self, descriptor: DeviceDescriptor, pose: na::Matrix4<f32>) {
        self.connected.insert(descriptor.index);
        self.poses.insert(descriptor.index, pose);
        self.devices.push(descriptor);
    }

    pub fn wait_calls(&self) -> usize {
        self.wait_calls
    }
}

impl PoseSource for MockSource {
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, SourceError> {
        Ok(self.devices.clone())
    }

    fn is_device_connected(&self, index: DeviceIndex) -> bool {
        self.connected.contains(&index)
    }

    fn wait_next_frame_poses(&mut self) -> Result<NativePoses, SourceError> {
        thread::sleep(self.frame_delay);
        self.wait_calls += 1;
        if let Some(every) = self.fail_every {
            if self.wait_calls % every == 0 {
                return Err(self.failure.clone());
            }
        }
        Ok(self.poses.clone())
    }

    fn poll_input(&mut self) -> Result<Vec<(DeviceIndex, InputState)>, SourceError> {
        if self.input_error {
            return Err(SourceError::NotReady);
        }
        Ok(self.inputs.clone())
    }
}
