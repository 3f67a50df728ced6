//! Error types.

use thiserror::Error;

/// Errors reported by a [`PoseSource`](crate::source::PoseSource).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("VR session is not ready")]
    NotReady,
    #[error("transient device error: {0}")]
    Transient(String),
    #[error("VR runtime error: {0}")]
    Runtime(String),
}

/// Errors reported by a [`HostScene`](crate::host::HostScene).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("no object named {0:?} in the scene")]
    MissingObject(String),
    #[error("armature {armature:?} has no bone named {bone:?}")]
    MissingBone { armature: String, bone: String },
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to spawn polling thread")]
    Spawn(#[source] std::io::Error),
    #[error("previous polling thread has not shut down yet")]
    PollingStillRunning,
    #[error("pose source is busy")]
    SourceBusy,
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("failed to read config")]
    ConfigIo(#[source] std::io::Error),
    #[error("failed to parse config")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
