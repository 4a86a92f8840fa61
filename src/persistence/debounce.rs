use std::time::Duration;

use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Idle,
    Scheduled { deadline: Instant },
}

/// Coalesces bursts of edits into a single save.
///
/// Every `schedule` pushes the deadline out to `now + delay`; the owner
/// commits once `take_due` reports the deadline has passed.
#[derive(Debug)]
pub struct SaveDebouncer {
    delay: Duration,
    phase: SavePhase,
}

impl SaveDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            phase: SavePhase::Idle,
        }
    }

    pub fn phase(&self) -> SavePhase {
        self.phase
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self) -> Instant {
        self.schedule_at(Instant::now())
    }

    /// Arm (or re-arm) the timer relative to `now`.
    pub fn schedule_at(&mut self, now: Instant) -> Instant {
        let deadline = now + self.delay;
        self.phase = SavePhase::Scheduled { deadline };
        deadline
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            SavePhase::Idle => None,
            SavePhase::Scheduled { deadline } => Some(deadline),
        }
    }

    pub fn take_due(&mut self) -> bool {
        self.take_due_at(Instant::now())
    }

    /// If the deadline has passed, disarm and report that a commit is due.
    pub fn take_due_at(&mut self, now: Instant) -> bool {
        match self.phase {
            SavePhase::Scheduled { deadline } if now >= deadline => {
                self.phase = SavePhase::Idle;
                true
            }
            _ => false,
        }
    }

    /// Cancel any pending save.
    pub fn dispose(&mut self) {
        self.phase = SavePhase::Idle;
    }

    /// Resolve once the armed deadline passes; never resolves while idle.
    pub async fn wait(&self) {
        match self.deadline() {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
