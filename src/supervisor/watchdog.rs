use std::time::Duration;
use tokio::time::{self, Instant};

/// Heartbeat deadline for the active link.
///
/// Holds at most one deadline; arming always replaces the previous one, so
/// there is never more than one watchdog in flight.
pub struct HeartbeatWatchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl HeartbeatWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Start (or restart) the countdown from now.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves when the deadline passes. Never resolves while disarmed.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
