//! Fixed-window call limiter for the weather provider.
//!
//! Free-plan limit: 60 calls per minute. The budget stops one short of that
//! and then waits out a cooldown longer than the window.

use log::info;
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct CallBudget {
    ceiling: u32,
    cooldown: Duration,
    window: Duration,
    calls: u32,
    window_start: Instant,
    total_calls: u32,
}

impl CallBudget {
    pub fn new(ceiling: u32, cooldown: Duration) -> Self {
        Self::with_window(ceiling, cooldown, WINDOW)
    }

    pub fn with_window(ceiling: u32, cooldown: Duration, window: Duration) -> Self {
        Self {
            ceiling,
            cooldown,
            window,
            calls: 0,
            window_start: Instant::now(),
            total_calls: 0,
        }
    }

    /// Waits, if needed, until one more call fits into the current window,
    /// then counts it.
    pub async fn acquire(&mut self) {
        if self.window_start.elapsed() >= self.window {
            self.reset();
        }
        if self.calls >= self.ceiling {
            info!(
                "Call ceiling of {} reached, sleeping for {} seconds...",
                self.ceiling,
                self.cooldown.as_secs()
            );
            sleep(self.cooldown).await;
            self.reset();
        }
        self.calls += 1;
        self.total_calls += 1;
    }

    pub fn calls_in_window(&self) -> u32 {
        self.calls
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls
    }

    fn reset(&mut self) {
        self.calls = 0;
        self.window_start = Instant::now();
    }
}
