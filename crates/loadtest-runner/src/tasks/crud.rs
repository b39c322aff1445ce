use super::{require_token, Exchange, SequenceEnd, TaskSequence};
use crate::client::CapturedResponse;
use crate::models::NewTest;
use crate::session::UserSession;
use async_trait::async_trait;
use http::Method;
use loadtest_common::ResponseView;
use serde_json::Value;

pub const CREATE_PATH: &str = "/api/tests/new";

/// Steps that need the id returned by the create call
const DEPENDENT_STEPS: [&str; 5] = ["get", "update", "partial update", "run", "delete"];

/// Full lifecycle of one test case: create, read, update, patch, run, delete
#[derive(Debug, Clone, Copy, Default)]
pub struct TestsSequence;

#[async_trait]
impl TaskSequence for TestsSequence {
    fn name(&self) -> &'static str {
        "tests"
    }

    async fn run(&self, session: &UserSession) -> SequenceEnd {
        if let Err(end) = require_token(session) {
            return end;
        }
        let username = session.display_name();

        let created = session
            .exchange(
                &Exchange::new("Create Test", Method::POST, CREATE_PATH)
                    .body(NewTest::for_creation(&username).to_json())
                    .expect_status(201)
                    .outcome("Test successfully created", "Test creation failed"),
            )
            .await;

        let Some(test_id) = read_test_id(session, &created) else {
            for step in DEPENDENT_STEPS {
                session
                    .events()
                    .error(&format!("Cannot {} test: test_id is not set", step));
            }
            return SequenceEnd::Completed;
        };
        let test_path = format!("/api/tests/{}", test_id);

        session
            .exchange(
                &Exchange::new("Get Test", Method::GET, &test_path)
                    .outcome("Test successfully received", "Test receiving failed"),
            )
            .await;

        session
            .exchange(
                &Exchange::new("Update Test", Method::PUT, &test_path)
                    .body(NewTest::for_update(&username).to_json())
                    .outcome("Test successfully changed", "Test changing failed"),
            )
            .await;

        session
            .exchange(
                &Exchange::new("Partial Update Test", Method::PATCH, &test_path)
                    .body(serde_json::json!({
                        "description": format!(
                            "Checking the update a test description by {}.",
                            username
                        ),
                    }))
                    .outcome(
                        "Test description successfully changed",
                        "Test description changing failed",
                    ),
            )
            .await;

        session
            .exchange(
                &Exchange::new("Run Test", Method::POST, format!("{}/status", test_path))
                    .body(serde_json::json!({"status": "PASS"}))
                    .outcome("Test successfully run", "Test running failed"),
            )
            .await;

        session
            .exchange(
                &Exchange::new("Delete Test", Method::DELETE, &test_path)
                    .outcome("Test successfully deleted", "Test deleting failed"),
            )
            .await;

        SequenceEnd::Completed
    }
}

/// Pull `test_id` out of the create response, logging why when it is absent
fn read_test_id(session: &UserSession, response: &CapturedResponse) -> Option<String> {
    let body: Value = match serde_json::from_str(response.text()) {
        Ok(body) => body,
        Err(e) => {
            session
                .events()
                .error(&format!("Failed to parse response JSON: {}", e));
            return None;
        }
    };

    let test_id = test_id_of(&body);
    if test_id.is_none() {
        session.events().error("Response missing test_id field");
    }
    test_id
}

/// `test_id` as a path segment; the API may send it as a string or a number
fn test_id_of(body: &Value) -> Option<String> {
    match body.get("test_id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
