//! Cooperative timers on the host's main context.
//!
//! A task runs, returns the delay until its next run and is re-queued, or
//! returns `None` to retire. Tasks are cancelled by token.

use std::time::{Duration, Instant};

use crate::host::HostScene;

/// A periodic task. The return value is the delay until the next run.
pub type HostTask = Box<dyn FnMut(&mut dyn HostScene) -> Option<Duration>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

pub trait Scheduler {
    fn register(&mut self, first_delay: Duration, task: HostTask) -> TimerToken;
    /// Returns false if the token was not registered.
    fn unregister(&mut self, token: TimerToken) -> bool;
    fn is_registered(&self, token: TimerToken) -> bool;
}

struct Entry {
    token: TimerToken,
    due: Instant,
    task: HostTask,
}

/// Single-threaded timer queue the host pumps from its main loop.
#[derive(Default)]
pub struct TimerQueue {
    next_token: u64,
    entries: Vec<Entry>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every task due at `now` once and returns how many ran.
    pub fn run_due(&mut self, now: Instant, host: &mut dyn HostScene) -> usize {
        let (due, pending): (Vec<Entry>, Vec<Entry>) =
            self.entries.drain(..).partition(|entry| entry.due <= now);
        self.entries = pending;

        let ran = due.len();
        for mut entry in due {
            if let Some(delay) = (entry.task)(host) {
                entry.due = now + delay;
                self.entries.push(entry);
            }
        }
        ran
    }

    /// Time until the earliest task is due, if any task is queued.
    pub fn next_due(&self, now: Instant) -> Option<Duration> {
        self.entries
            .iter()
            .map(|entry| entry.due.saturating_duration_since(now))
            .min()
    }
}

impl Scheduler for TimerQueue {
    fn register(&mut self, first_delay: Duration, task: HostTask) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.entries.push(Entry {
            token,
            due: Instant::now() + first_delay,
            task,
        });
        token
    }

    fn unregister(&mut self, token: TimerToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.token != token);
        self.entries.len() != before
    }

    fn is_registered(&self, token: TimerToken) -> bool {
        self.entries.iter().any(|entry| entry.token == token)
    }
}
