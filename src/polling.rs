//! Background pose polling.
//!
//! One dedicated thread repeatedly waits on the pose source, converts every
//! connected device's pose and appends the result to the sample buffer.

use log::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::buffer::{Frame, PoseSample, SampleBuffer};
use crate::convert::{convert, RootScale};
use crate::device::{InputState, SharedRegistry};
use crate::error::{CaptureError, Result, SourceError};
use crate::source::SharedPoseSource;

/// Latest controller input per device serial.
pub type SharedInputs = Arc<Mutex<HashMap<String, InputState>>>;

/// Everything the polling thread works with.
#[derive(Clone)]
pub struct PollContext {
    pub source: SharedPoseSource,
    pub registry: SharedRegistry,
    pub buffer: Arc<SampleBuffer>,
    pub root_scale: Arc<RootScale>,
    pub inputs: SharedInputs,
    pub error_backoff: Duration,
}

/// Device enumeration handed to a running polling thread, which owns the
/// source between frames.
struct LoadRequest {
    reset: bool,
    reply: Sender<std::result::Result<usize, SourceError>>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    requests: Sender<LoadRequest>,
    handle: JoinHandle<()>,
}

enum PollerState {
    Stopped,
    Running(Worker),
    /// Asked to stop but missed the join timeout.
    Stopping(Worker),
}

/// Owns at most one polling thread.
pub struct PollingLoop {
    state: PollerState,
    join_timeout: Duration,
}

impl PollingLoop {
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            state: PollerState::Stopped,
            join_timeout,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, PollerState::Running(_))
    }

    /// Spawns the polling thread. Starting a running loop does nothing.
    ///
    /// Fails if a previous thread missed its join timeout and still hasn't
    /// exited, so two pollers never run at once.
    pub fn start(&mut self, context: PollContext) -> Result<()> {
        self.reap();
        match self.state {
            PollerState::Running(_) => return Ok(()),
            PollerState::Stopping(_) => return Err(CaptureError::PollingStillRunning),
            PollerState::Stopped => {}
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let (request_tx, request_rx) = mpsc::channel();
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(String::from("pose-poller"))
            .spawn(move || {
                poll(&context, &thread_stop, &request_rx);
                // receiver may already be gone after a timed out stop
                let _ = done_tx.send(());
            })
            .map_err(CaptureError::Spawn)?;

        debug!("Polling thread started");
        self.state = PollerState::Running(Worker {
            stop,
            done: done_rx,
            requests: request_tx,
            handle,
        });
        Ok(())
    }

    /// Enumerates devices and merges them into the registry.
    ///
    /// With no thread alive this runs right away. A running thread does it
    /// between two frames and the answer is awaited for at most the join
    /// timeout. A thread that missed its join timeout may sit in a blocking
    /// wait holding the source, so it is not waited on at all.
    pub fn load_devices(&mut self, context: &PollContext, reset: bool) -> Result<usize> {
        self.reap();
        let worker = match &self.state {
            PollerState::Stopped => return Ok(load_into_registry(context, reset)?),
            PollerState::Stopping(_) => return Err(CaptureError::PollingStillRunning),
            PollerState::Running(worker) => worker,
        };

        let (reply_tx, reply_rx) = mpsc::channel();
        worker
            .requests
            .send(LoadRequest {
                reset,
                reply: reply_tx,
            })
            .map_err(|_| CaptureError::PollingStillRunning)?;
        match reply_rx.recv_timeout(self.join_timeout) {
            Ok(added) => Ok(added?),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Polling thread did not enumerate devices within {:?}",
                    self.join_timeout
                );
                Err(CaptureError::SourceBusy)
            }
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::PollingStillRunning),
        }
    }

    /// Signals the thread and waits for it for at most the join timeout.
    ///
    /// Returns whether the thread has exited. A thread that misses the
    /// timeout is logged and left to finish on its own.
    pub fn stop(&mut self) -> bool {
        self.reap();
        let worker = match std::mem::replace(&mut self.state, PollerState::Stopped) {
            PollerState::Stopped => return true,
            PollerState::Stopping(worker) => worker,
            PollerState::Running(worker) => {
                worker.stop.store(true, Ordering::Release);
                worker
            }
        };

        match worker.done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("Polling thread panicked");
                }
                debug!("Polling thread joined");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Polling thread did not stop within {:?}, leaving it to finish",
                    self.join_timeout
                );
                self.state = PollerState::Stopping(worker);
                false
            }
        }
    }

    /// Collects a thread that finished after missing its join timeout.
    fn reap(&mut self) {
        let finished = match &self.state {
            PollerState::Stopping(worker) => worker.handle.is_finished(),
            _ => false,
        };
        if finished {
            if let PollerState::Stopping(worker) =
                std::mem::replace(&mut self.state, PollerState::Stopped)
            {
                if worker.handle.join().is_err() {
                    error!("Polling thread panicked");
                }
            }
        }
    }
}

impl Drop for PollingLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll(context: &PollContext, stop: &AtomicBool, requests: &Receiver<LoadRequest>) {
    while !stop.load(Ordering::Acquire) {
        for request in requests.try_iter() {
            // caller may have given up waiting
            let _ = request.reply.send(load_into_registry(context, request.reset));
        }
        match poll_once(context) {
            Ok(Some(frame)) => context.buffer.append(frame),
            Ok(None) => {}
            Err(error) => {
                trace!("Skipping poll iteration: {}", error);
                thread::sleep(context.error_backoff);
            }
        }
    }
}

fn load_into_registry(
    context: &PollContext,
    reset: bool,
) -> std::result::Result<usize, SourceError> {
    let mut source = context.source.lock().unwrap_or_else(PoisonError::into_inner);
    let descriptors = source.enumerate()?;
    let mut registry = context
        .registry
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    Ok(registry.load(&descriptors, |index| source.is_device_connected(index), reset))
}

/// Runs one polling iteration. Devices that are disconnected or missing from
/// the runtime's answer are left out of the frame.
fn poll_once(context: &PollContext) -> std::result::Result<Option<Frame>, SourceError> {
    let mut source = context.source.lock().unwrap_or_else(PoisonError::into_inner);
    let poses = source.wait_next_frame_poses()?;
    let timestamp = Instant::now();
    let root_scale = context.root_scale.get();

    let mut registry = context
        .registry
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let mut samples = Vec::with_capacity(registry.len());
    for device in registry.iter_mut() {
        device.connected = source.is_device_connected(device.index);
        if !device.connected {
            continue;
        }
        let native = match poses.get(&device.index) {
            Some(native) => native,
            None => {
                trace!("No pose for {} this frame", device.serial);
                continue;
            }
        };
        samples.push(PoseSample {
            timestamp,
            device: device.serial.clone(),
            transform: convert(native, root_scale),
        });
    }

    match source.poll_input() {
        Ok(states) => {
            let mut inputs = context.inputs.lock().unwrap_or_else(PoisonError::into_inner);
            for (index, state) in states {
                if let Some(device) = registry.by_index(index) {
                    inputs.insert(device.serial.clone(), state);
                }
            }
        }
        Err(error) => trace!("Input poll failed: {}", error),
    }

    if samples.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Frame::new(samples)))
    }
}
