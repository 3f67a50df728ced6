//! Turns a recorded take into animation curves.
//!
//! Each sample's wall-clock offset from the first sample of the take maps to a
//! fractional scene frame. Every device gets ten dense curves: location xyz,
//! rotation quaternion wxyz and scale xyz. Consecutive quaternions are written
//! as sampled, without sign correction, so interpolation may take the long
//! way around between two keys.

use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::Frame;
use crate::convert::decompose;
use crate::device::DeviceRegistry;
use crate::error::HostError;
use crate::host::{Channel, CurveKey, HostScene, Keyframe};

/// Scene frame of a sample taken `timestamp`, for a take that started at
/// `take_start` on frame `start_frame`. Not rounded.
pub fn frame_number(
    start_frame: f64,
    take_start: Instant,
    timestamp: Instant,
    framerate: f64,
) -> f64 {
    start_frame + timestamp.saturating_duration_since(take_start).as_secs_f64() * framerate
}

/// Per-device channel data of one take, in temporal order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceTake {
    pub device: String,
    pub frames: Vec<f64>,
    /// Flattened xyz triples.
    pub locations: Vec<f32>,
    /// Flattened wxyz quadruples.
    pub rotations: Vec<f32>,
    /// Flattened xyz triples.
    pub scales: Vec<f32>,
}

impl DeviceTake {
    fn new(device: &str) -> Self {
        Self {
            device: device.to_owned(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn values(&self, channel: Channel) -> &[f32] {
        match channel {
            Channel::Location => &self.locations,
            Channel::RotationQuaternion => &self.rotations,
            Channel::Scale => &self.scales,
        }
    }

    /// Keys of one curve, in the order the samples were taken.
    pub fn keyframes(&self, key: CurveKey) -> Vec<Keyframe> {
        let components = key.channel.components();
        self.values(key.channel)
            .iter()
            .skip(key.index)
            .step_by(components)
            .zip(self.frames.iter())
            .map(|(value, frame)| Keyframe {
                frame: *frame,
                value: *value,
            })
            .collect()
    }
}

/// Groups a snapshot by device and decomposes every sample.
///
/// Devices come out in the order they first appear in the take.
pub fn compile_take(
    frames: &[Arc<Frame>],
    record_start_frame: i32,
    framerate: f64,
) -> Vec<DeviceTake> {
    let take_start = match frames.iter().flat_map(|frame| frame.samples.first()).next() {
        Some(sample) => sample.timestamp,
        None => return Vec::new(),
    };
    let start_frame = f64::from(record_start_frame);

    let mut takes: Vec<DeviceTake> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for frame in frames {
        for sample in &frame.samples {
            let position = *positions.entry(sample.device.as_str()).or_insert_with(|| {
                takes.push(DeviceTake::new(&sample.device));
                takes.len() - 1
            });
            let take = &mut takes[position];
            let parts = decompose(&sample.transform);

            take.frames
                .push(frame_number(start_frame, take_start, sample.timestamp, framerate));
            take.locations.extend(parts.translation.iter());
            take.rotations.extend(parts.rotation_wxyz().iter());
            take.scales.extend(parts.scale.iter());
        }
    }
    takes
}

fn write_device(host: &mut dyn HostScene, name: &str, take: &DeviceTake) -> Result<(), HostError> {
    host.ensure_animation_data(name)?;
    for channel in Channel::ALL.iter() {
        for index in 0..channel.components() {
            let key = CurveKey::new(*channel, index);
            // replace, never merge: no key of an older take may survive
            if host.has_curve(name, key) {
                host.remove_curve(name, key);
            }
            host.new_curve(name, key)?;
            host.set_keyframes(name, key, &take.keyframes(key))?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileSummary {
    pub frames: usize,
    pub devices_written: usize,
    pub devices_skipped: usize,
}

/// Writes compiled takes as curves on each device's scene object.
///
/// Devices whose object has gone missing are skipped.
pub fn write_takes(
    host: &mut dyn HostScene,
    registry: &DeviceRegistry,
    takes: &[DeviceTake],
) -> CompileSummary {
    let mut summary = CompileSummary::default();
    for take in takes.iter().filter(|take| !take.is_empty()) {
        let name = match registry.name_of(&take.device) {
            Some(name) => name,
            None => {
                debug!("Device {} is no longer registered", take.device);
                summary.devices_skipped += 1;
                continue;
            }
        };
        if !host.object_exists(name) {
            debug!("No object {:?} for device {}, skipping", name, take.device);
            summary.devices_skipped += 1;
            continue;
        }
        match write_device(host, name, take) {
            Ok(()) => {
                info!("> {} ({} keys)", name, take.len());
                summary.devices_written += 1;
            }
            Err(error) => {
                debug!("Skipping {}: {}", name, error);
                summary.devices_skipped += 1;
            }
        }
    }
    summary
}

/// Compiles a snapshot into curves on the host.
pub fn compile_recording(
    host: &mut dyn HostScene,
    registry: &DeviceRegistry,
    frames: &[Arc<Frame>],
    record_start_frame: i32,
) -> CompileSummary {
    info!("Processing {} recorded samples", frames.len());
    if frames.is_empty() {
        info!("Found no samples to process");
        return CompileSummary::default();
    }

    let framerate = host.frame_rate();
    let takes = compile_take(frames, record_start_frame, framerate);
    let mut summary = write_takes(host, registry, &takes);
    summary.frames = frames.len();
    summary
}
