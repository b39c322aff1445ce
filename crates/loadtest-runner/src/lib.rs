//! Simulated users driving the test-management API
pub mod client;
pub mod models;
pub mod runner;
pub mod session;
pub mod tasks;

pub use client::{ApiClient, CapturedResponse};
pub use models::NewTest;
pub use runner::{assign_groups, LoadRunner, RunSummary, UserGroup};
pub use session::{HarnessContext, UserSession};
pub use tasks::{
    Exchange, ListsSequence, SequenceEnd, StatsSequence, TaskSequence, TestsSequence,
};
