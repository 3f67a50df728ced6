//! Frames of converted poses shared between the polling thread and the main
//! context.

use nalgebra as na;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// A device's scene-space transform at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSample {
    pub timestamp: Instant,
    /// Serial of the device the sample belongs to.
    pub device: String,
    pub transform: na::Matrix4<f32>,
}

/// Output of a single polling iteration, in device enumeration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub samples: Vec<PoseSample>,
}

impl Frame {
    pub fn new(samples: Vec<PoseSample>) -> Self {
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Append-only, lock protected list of frames shared by the polling thread
/// and the main context.
///
/// Frames are immutable once appended and handed out behind `Arc`, so a
/// snapshot copies pointers rather than samples.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    frames: Mutex<Vec<Arc<Frame>>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Frame>>> {
        // a panicking holder can't leave the Vec half-written
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn append(&self, frame: Frame) {
        let frame = Arc::new(frame);
        self.lock().push(frame);
    }

    pub fn snapshot(&self) -> Vec<Arc<Frame>> {
        self.lock().clone()
    }

    pub fn peek_latest(&self) -> Option<Arc<Frame>> {
        self.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
