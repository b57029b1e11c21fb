//! Shared domain types for the task execution engine and its notifier.

pub mod error;
pub mod messages;
pub mod status;
pub mod task;
pub mod types;
