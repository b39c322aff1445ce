//! Authenticated simulated user.
//!
//! A session takes one credential from the shared queue, logs in, keeps the
//! token the API hands back, and logs out at the end of the run. Every call
//! made through it is written to the trace log, and its outcome to the event
//! log.

use crate::client::{ApiClient, CapturedResponse};
use crate::tasks::Exchange;
use http::{HeaderMap, Method};
use loadtest_common::{
    base_headers, headers_with_token, CredentialQueue, EventLog, ResponseView, TokenExtractor,
    TraceLog,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const LOGOUT_PATH: &str = "/api/auth/logout";

/// Shared harness state handed to every simulated user
#[derive(Debug, Clone)]
pub struct HarnessContext {
    pub credentials: Arc<CredentialQueue>,
    pub trace: TraceLog,
    pub events: EventLog,
    pub tokens: TokenExtractor,
}

impl HarnessContext {
    pub fn new(credentials: Arc<CredentialQueue>, trace: TraceLog, events: EventLog) -> Self {
        Self {
            credentials,
            trace,
            events,
            tokens: TokenExtractor::default(),
        }
    }
}

/// Identity of a logged-in user; empty until login succeeds
#[derive(Debug, Clone, Default)]
struct UserData {
    username: Option<String>,
    token: Option<String>,
}

/// One simulated user
#[derive(Debug)]
pub struct UserSession {
    ctx: HarnessContext,
    client: ApiClient,
    /// Name from the dispensed credential, kept for login/logout messages
    login_name: String,
    data: UserData,
}

impl UserSession {
    pub fn new(ctx: HarnessContext, client: ApiClient) -> Self {
        Self {
            ctx,
            client,
            login_name: String::new(),
            data: UserData::default(),
        }
    }

    /// Username of the logged-in user
    pub fn username(&self) -> Option<&str> {
        self.data.username.as_deref()
    }

    /// Token captured at login
    pub fn token(&self) -> Option<&str> {
        self.data.token.as_deref()
    }

    /// Username as it appears in event messages
    pub fn display_name(&self) -> String {
        self.username().unwrap_or("None").to_string()
    }

    pub fn events(&self) -> &EventLog {
        &self.ctx.events
    }

    pub fn clear(&mut self) {
        self.data = UserData::default();
    }

    /// Take a credential and log in with it
    ///
    /// Failures are written to the event log; the session is then left
    /// without a token and every task sequence it runs stops immediately.
    pub async fn start(&mut self) {
        let record = match self.ctx.credentials.dispense() {
            Ok(record) => record,
            Err(e) => {
                self.ctx
                    .events
                    .error(&format!("Failed to load user: {}", e));
                return;
            }
        };

        let Some(username) = record.username().map(str::to_string) else {
            self.ctx.events.error("Invalid user data: missing username");
            return;
        };
        self.login_name = username.clone();

        let body = match serde_json::to_value(&record) {
            Ok(body) => body,
            Err(e) => {
                self.ctx
                    .events
                    .error(&format!("Failed to load user: {}", e));
                return;
            }
        };

        self.trace_request("User Login", LOGIN_PATH, &Method::POST, Some(&body))
            .await;
        let response = self
            .send(Method::POST, LOGIN_PATH, base_headers(), Some(&body))
            .await;

        let task_result = if response.status_code() == 200 {
            let success_info = format!("Login successfully for user: {}", username);
            self.ctx.events.info(&success_info);
            self.data.username = Some(username.clone());

            match self.ctx.tokens.extract(&response) {
                Some(token) => {
                    debug!("User {} logged in", username);
                    self.data.token = Some(token);
                    success_info
                }
                None => {
                    let error_msg = format!("Failed to extract token for user: {}", username);
                    self.ctx.events.error(&error_msg);
                    error_msg
                }
            }
        } else {
            let failure_info = format!(
                "Login failed for user: {}. Response: {}. Status code: {}.",
                username,
                response.text(),
                response.status_code()
            );
            self.ctx.events.error(&failure_info);
            format!("Login failed for user: {}", username)
        };

        self.trace_response(&response, &task_result).await;
    }

    /// Log out and forget the user's data
    pub async fn stop(&mut self) {
        let headers = headers_with_token(self.token());

        self.trace_request("User Logout", LOGOUT_PATH, &Method::GET, None)
            .await;
        let response = self.send(Method::GET, LOGOUT_PATH, headers, None).await;

        let task_result = if response.status_code() == 200 {
            let success_info = format!("Logout successfully for user: {}", self.login_name);
            self.ctx.events.info(&success_info);
            self.clear();
            success_info
        } else {
            let failure_info = format!(
                "Logout failed for user: {}. Response: {}. Status code: {}.",
                self.login_name,
                response.text(),
                response.status_code()
            );
            self.ctx.events.error(&failure_info);
            format!("Logout failed for user: {}", self.login_name)
        };

        self.trace_response(&response, &task_result).await;
    }

    /// Perform one authenticated call and record its outcome
    pub async fn exchange(&self, exchange: &Exchange) -> CapturedResponse {
        let headers = headers_with_token(self.token());

        self.trace_request(
            &exchange.task,
            &exchange.path,
            &exchange.method,
            exchange.body.as_ref(),
        )
        .await;
        let response = self
            .send(
                exchange.method.clone(),
                &exchange.path,
                headers,
                exchange.body.as_ref(),
            )
            .await;

        let username = self.display_name();
        let task_result = if response.status_code() == exchange.expected_status {
            let success_info = format!("{} by user: {}", exchange.success, username);
            self.ctx.events.info(&success_info);
            success_info
        } else {
            let failure_info = format!(
                "{} by user: {}. Response: {}. Status code: {}.",
                exchange.failure,
                username,
                response.text(),
                response.status_code()
            );
            self.ctx.events.error(&failure_info);
            failure_info
        };

        self.trace_response(&response, &task_result).await;
        response
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: Option<&Value>,
    ) -> CapturedResponse {
        match self.client.send(method, path, headers, body).await {
            Ok(response) => response,
            Err(e) => {
                warn!("{}", e);
                CapturedResponse::transport_failure(&e)
            }
        }
    }

    async fn trace_request(&self, task: &str, path: &str, method: &Method, body: Option<&Value>) {
        if let Err(e) = self.ctx.trace.add_request(task, path, method, body).await {
            warn!("Failed to write trace log {}: {}", self.ctx.trace.path().display(), e);
        }
    }

    async fn trace_response(&self, response: &CapturedResponse, task_result: &str) {
        if let Err(e) = self.ctx.trace.add_response(response, Some(task_result)).await {
            warn!("Failed to write trace log {}: {}", self.ctx.trace.path().display(), e);
        }
    }
}
