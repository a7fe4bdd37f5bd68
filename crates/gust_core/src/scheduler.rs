//! Frame scheduling seam.
//!
//! The engine never drives its own loop; after each tick it asks the
//! scheduler for the next one. On a real window this maps to
//! `request_redraw`; tests drive ticks by hand and only need to observe that
//! a continuation was requested.

pub trait TickScheduler {
    fn request_tick(&mut self);
}

/// Test scheduler that counts requests instead of scheduling anything.
#[derive(Default)]
pub struct ManualScheduler {
    requested: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }
}

impl TickScheduler for ManualScheduler {
    fn request_tick(&mut self) {
        self.requested += 1;
    }
}
