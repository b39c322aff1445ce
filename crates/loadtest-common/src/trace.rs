use crate::error::LoadResult;
use crate::headers::{header_mapping, ResponseView};
use chrono::Local;
use http::Method;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const SEPARATOR: &str = "\n-----\n";

/// Append-only request/response trace file
///
/// The file is named after the moment the log was created and lives under
/// `logs_dir`, which is created on demand. Clones share the same file and the
/// same lock: each `add_request`/`add_response` block is written whole before
/// any other block can start.
///
/// Pairing requests with responses is up to the caller; blocks land in the
/// order the calls acquire the lock.
#[derive(Debug, Clone)]
pub struct TraceLog {
    logs_dir: PathBuf,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl TraceLog {
    /// Create a trace log named `log_<start timestamp>.log` under `logs_dir`
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        let file_name = format!("log_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        Self::with_file_name(logs_dir, file_name)
    }

    /// Create a trace log with an explicit file name under `logs_dir`
    pub fn with_file_name(logs_dir: impl Into<PathBuf>, file_name: impl AsRef<Path>) -> Self {
        let logs_dir = logs_dir.into();
        let path = logs_dir.join(file_name);
        Self {
            logs_dir,
            path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the trace file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an outgoing request
    pub async fn add_request(
        &self,
        task_name: &str,
        url: &str,
        method: &Method,
        body: Option<&serde_json::Value>,
    ) -> LoadResult<()> {
        let block = format_request(task_name, url, method, body);
        self.append(&block).await
    }

    /// Record a received response and the outcome the task assigned to it
    pub async fn add_response(
        &self,
        response: &dyn ResponseView,
        task_result: Option<&str>,
    ) -> LoadResult<()> {
        let block = format_response(response, task_result);
        self.append(&block).await
    }

    async fn append(&self, block: &str) -> LoadResult<()> {
        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(&self.logs_dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(block.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn format_request(
    task_name: &str,
    url: &str,
    method: &Method,
    body: Option<&serde_json::Value>,
) -> String {
    let mut block = String::from(SEPARATOR);
    block.push_str(&format!("Task: {}\n", task_name));
    block.push_str(&format!(
        "Time: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S%.6f")
    ));
    block.push_str(&format!("Request method: {}\n", method));
    block.push_str(&format!("Request URL: {}\n", url));

    if let Some(body) = body {
        let rendered = match body {
            serde_json::Value::Object(_) => {
                serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
            }
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        block.push_str(&format!("Request Body: {}\n", rendered));
    }

    block.push('\n');
    block
}

fn format_response(response: &dyn ResponseView, task_result: Option<&str>) -> String {
    let headers = response.headers().map(header_mapping).unwrap_or_default();
    let cookies = response.cookies().cloned().unwrap_or_default();

    let mut block = String::new();
    block.push_str(&format!("Task result: {}\n", task_result.unwrap_or("None")));
    block.push_str(&format!("Response code: {}\n", response.status_code()));
    block.push_str(&format!("Response text: {}\n", response.text()));
    block.push_str(&format!("Response headers: {}\n", render_mapping(&headers)));
    block.push_str(&format!("Response cookies: {}\n", render_mapping(&cookies)));
    block.push_str(SEPARATOR);
    block
}

fn render_mapping(mapping: &BTreeMap<String, String>) -> String {
    format!("{:?}", mapping)
}
