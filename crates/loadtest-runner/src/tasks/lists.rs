use super::{require_token, Exchange, SequenceEnd, TaskSequence};
use crate::session::UserSession;
use async_trait::async_trait;
use http::Method;
use rand::Rng;

pub const LIST_PATH: &str = "/api/tests";

const SUCCESS: &str = "List of tests successfully received";
const FAILURE: &str = "List of tests receiving failed";

/// Lists test cases, first in full and then one random page
#[derive(Debug, Clone, Copy, Default)]
pub struct ListsSequence;

#[async_trait]
impl TaskSequence for ListsSequence {
    fn name(&self) -> &'static str {
        "lists"
    }

    async fn run(&self, session: &UserSession) -> SequenceEnd {
        if let Err(end) = require_token(session) {
            return end;
        }

        session
            .exchange(&Exchange::new("List Tests", Method::GET, LIST_PATH).outcome(SUCCESS, FAILURE))
            .await;

        let (page, size) = random_page();
        session
            .exchange(
                &Exchange::new("List Tests with params", Method::GET, page_path(page, size))
                    .outcome(SUCCESS, FAILURE),
            )
            .await;

        SequenceEnd::Completed
    }
}

/// Page in `1..=3`, size in `1..=5`
fn random_page() -> (u32, u32) {
    let mut rng = rand::thread_rng();
    (rng.gen_range(1..=3), rng.gen_range(1..=5))
}

fn page_path(page: u32, size: u32) -> String {
    format!("{}?page={}&size={}", LIST_PATH, page, size)
}
