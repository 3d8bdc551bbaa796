//! Alarm evaluation: matching persisted logs against project alarms and
//! fanning out to delivery sinks

pub mod sinks;
pub mod worker;

pub use sinks::AlarmDispatcher;
pub use worker::AlarmWorker;
