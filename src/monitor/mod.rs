//! Scheduled HTTP checks described as curl commands, with PushPlus alerts.

pub mod config;
pub mod curl;
pub mod executor;
pub mod scheduler;

pub use config::{MonitorConfig, TaskConfig, TaskStatus};
pub use curl::{parse_curl, ParsedRequest};
pub use executor::{ExecutionResult, Executor};
pub use scheduler::Scheduler;
