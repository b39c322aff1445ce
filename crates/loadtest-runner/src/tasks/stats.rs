use super::{require_token, Exchange, SequenceEnd, TaskSequence};
use crate::session::UserSession;
use async_trait::async_trait;
use http::Method;

pub const STATS_PATH: &str = "/api/getstat";

/// Reads the test statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSequence;

#[async_trait]
impl TaskSequence for StatsSequence {
    fn name(&self) -> &'static str {
        "stats"
    }

    async fn run(&self, session: &UserSession) -> SequenceEnd {
        if let Err(end) = require_token(session) {
            return end;
        }

        session
            .exchange(
                &Exchange::new("Get Stats", Method::GET, STATS_PATH).outcome(
                    "Test stats successfully received",
                    "Test stats receiving failed",
                ),
            )
            .await;

        SequenceEnd::Completed
    }
}
