// Shared library for the calendar event store, scheduler and sender

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod sender;
pub mod storage;
pub mod telemetry;
