//! Capture of VR device poses into scene animation.
//!
//! A [`CaptureSession`] polls a [`PoseSource`] on a background thread, shows
//! the latest poses on scene objects through a periodic preview task and, when
//! a take ends, writes the buffered poses as animation curves on a
//! [`HostScene`].

pub mod buffer;
pub mod calibration;
pub mod compiler;
pub mod config;
pub mod convert;
pub mod device;
pub mod error;
pub mod host;
pub mod openvr_adaptor;
pub mod polling;
pub mod preview;
pub mod scheduler;
pub mod session;
pub mod source;

#[cfg(test)]
mod mock;

pub use config::CaptureConfig;
pub use error::{CaptureError, HostError, SourceError};
pub use host::HostScene;
pub use scheduler::{Scheduler, TimerQueue};
pub use session::CaptureSession;
pub use source::PoseSource;
