// Scheduler module: due-event detection and notification publishing

pub mod engine;

pub use engine::{NotificationScheduler, SchedulerState};
