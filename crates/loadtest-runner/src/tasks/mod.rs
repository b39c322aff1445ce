//! Task sequences run by simulated users.
//!
//! A sequence is an ordered set of API calls. It runs to the end once per
//! iteration; a session without a token stops it before any call is made.

mod crud;
mod lists;
mod stats;

pub use crud::TestsSequence;
pub use lists::ListsSequence;
pub use stats::StatsSequence;

use crate::session::UserSession;
use async_trait::async_trait;
use http::Method;
use serde_json::Value;

/// How a sequence iteration ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEnd {
    Completed,
    Interrupted(String),
}

/// An ordered set of API calls made by one session
#[async_trait]
pub trait TaskSequence: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, session: &UserSession) -> SequenceEnd;
}

/// One API call together with how to judge and describe its outcome
///
/// Outcome messages read `"<success> by user: <name>"` and
/// `"<failure> by user: <name>. Response: <text>. Status code: <code>."`.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub task: String,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub expected_status: u16,
    pub success: String,
    pub failure: String,
}

impl Exchange {
    pub fn new(task: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        let task = task.into();
        Self {
            success: format!("{} succeeded", task),
            failure: format!("{} failed", task),
            task,
            method,
            path: path.into(),
            body: None,
            expected_status: 200,
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    pub fn outcome(mut self, success: impl Into<String>, failure: impl Into<String>) -> Self {
        self.success = success.into();
        self.failure = failure.into();
        self
    }
}

/// Stop the sequence when the session never obtained a token
pub(crate) fn require_token(session: &UserSession) -> Result<(), SequenceEnd> {
    if session.token().is_some() {
        return Ok(());
    }

    let error_msg = format!(
        "Cannot proceed: token is missing for user {}",
        session.display_name()
    );
    session.events().error(&error_msg);
    Err(SequenceEnd::Interrupted(error_msg))
}
