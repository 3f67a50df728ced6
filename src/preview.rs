//! Live preview of the latest polled frame.

use log::*;
use nalgebra as na;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use crate::buffer::SampleBuffer;
use crate::convert::RootScale;
use crate::device::SharedRegistry;
use crate::host::HostScene;
use crate::scheduler::{Scheduler, TimerToken};

/// Moves scene objects to the most recent buffered poses.
///
/// Does nothing while the timeline is playing, so preview never fights with
/// recorded animation. Returns the number of objects moved.
pub fn apply_latest(
    host: &mut dyn HostScene,
    buffer: &SampleBuffer,
    registry: &SharedRegistry,
) -> usize {
    if host.is_playing() {
        return 0;
    }
    let frame = match buffer.peek_latest() {
        Some(frame) => frame,
        None => return 0,
    };

    let registry = registry.read().unwrap_or_else(PoisonError::into_inner);
    let mut applied = 0;
    for sample in &frame.samples {
        let name = match registry.name_of(&sample.device) {
            Some(name) => name,
            None => continue,
        };
        if let Err(error) = host.set_world_transform(name, &sample.transform) {
            trace!("Preview skipped: {}", error);
            continue;
        }
        // the pose already carries the root scale
        if let Err(error) = host.set_scale(name, na::Vector3::new(1.0, 1.0, 1.0)) {
            trace!("Preview skipped: {}", error);
            continue;
        }
        applied += 1;
    }
    applied
}

/// Registers and cancels the periodic preview task.
pub struct PreviewDriver {
    period: Duration,
    token: Option<TimerToken>,
}

impl PreviewDriver {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.token.is_some()
    }

    /// Schedules the first tick immediately. Already active drivers are left alone.
    pub fn start(
        &mut self,
        scheduler: &mut dyn Scheduler,
        buffer: Arc<SampleBuffer>,
        registry: SharedRegistry,
        root_scale: Arc<RootScale>,
        root_object: String,
    ) {
        if let Some(token) = self.token {
            if scheduler.is_registered(token) {
                return;
            }
        }
        let period = self.period;
        let token = scheduler.register(
            Duration::ZERO,
            Box::new(move |host: &mut dyn HostScene| {
                root_scale.refresh(host, &root_object);
                apply_latest(host, &buffer, &registry);
                Some(period)
            }),
        );
        self.token = Some(token);
    }

    pub fn stop(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(token) = self.token.take() {
            scheduler.unregister(token);
        }
    }
}
