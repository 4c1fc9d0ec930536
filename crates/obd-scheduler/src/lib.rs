//! OBD-II Command Scheduler
//!
//! Provides priority-based, rate-limited polling of OBD-II commands over a
//! shared connection, with back-off for commands that keep failing.

mod scheduler;

pub use scheduler::{CommandScheduler, ScheduledCommand, SchedulerConfig, StopHandle};
