use crate::error::{LoadError, LoadResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Column holding the login name
pub const USERNAME_FIELD: &str = "username";

/// One identity loaded from the users CSV file
///
/// Serializes as a flat JSON object so it can be posted as the login body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRecord {
    fields: BTreeMap<String, String>,
}

impl CredentialRecord {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    /// Get a field by column name
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// The login name, if the source had a username column
    pub fn username(&self) -> Option<&str> {
        self.get(USERNAME_FIELD)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }
}

impl<K, V> FromIterator<(K, V)> for CredentialRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    records: Vec<CredentialRecord>,
    source: Option<PathBuf>,
}

/// Process-wide pool of user credentials
///
/// Records are served last-in-first-out: the last row of the file is handed
/// out first. Every record is handed out at most once per load. When the pool
/// runs dry, `dispense` reloads the last known source exactly once before
/// giving up with [`LoadError::Exhausted`].
///
/// Check, reload and pop happen under a single lock, so the queue can be
/// shared across simulated users behind an `Arc`.
#[derive(Debug, Default)]
pub struct CredentialQueue {
    state: Mutex<QueueState>,
    loads: AtomicUsize,
}

impl CredentialQueue {
    /// Create an empty queue with no known source
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue and load it from `source`
    pub fn from_file(source: impl AsRef<Path>) -> LoadResult<Self> {
        let queue = Self::new();
        queue.load(source)?;
        Ok(queue)
    }

    /// Load all users from `source`, replacing whatever was loaded before
    ///
    /// Returns the number of records loaded. A failed load leaves both the
    /// records and the reload source untouched.
    pub fn load(&self, source: impl AsRef<Path>) -> LoadResult<usize> {
        let mut state = self.state.lock();
        self.load_into(&mut state, source.as_ref())
    }

    /// Take one user out of the queue
    pub fn dispense(&self) -> LoadResult<CredentialRecord> {
        let mut state = self.state.lock();

        if state.records.is_empty() {
            let source = state.source.clone().ok_or(LoadError::Exhausted)?;
            debug!("Credential queue is empty, reloading from {}", source.display());

            match self.load_into(&mut state, &source) {
                Ok(_) => {}
                Err(LoadError::EmptyData(_)) => return Err(LoadError::Exhausted),
                Err(e) => return Err(e),
            }
        }

        state.records.pop().ok_or(LoadError::Exhausted)
    }

    /// Number of records still available
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last source passed to `load`
    pub fn source(&self) -> Option<PathBuf> {
        self.state.lock().source.clone()
    }

    /// How many times the source file has been read
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn load_into(&self, state: &mut QueueState, source: &Path) -> LoadResult<usize> {
        if !source.exists() {
            return Err(LoadError::NotFound(source.to_path_buf()));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        let records = read_records(source).map_err(|e| {
            warn!("Failed to read users from {}: {}", source.display(), e);
            e
        })?;

        if records.is_empty() {
            warn!("No users found in {}", source.display());
            return Err(LoadError::EmptyData(source.to_path_buf()));
        }

        let count = records.len();
        state.records = records;
        state.source = Some(source.to_path_buf());

        info!("Loaded {} users from {}", count, source.display());
        Ok(count)
    }
}

fn read_records(source: &Path) -> LoadResult<Vec<CredentialRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(source)?;

    let headers = reader.headers()?.clone();
    let mut records = Vec::new();

    for row in reader.records() {
        let row = row?;
        records.push(
            headers
                .iter()
                .zip(row.iter())
                .collect::<CredentialRecord>(),
        );
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn users_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_and_dispense_round_trip() {
        let file = users_file("username,password\nalice,secret1\n");
        let queue = CredentialQueue::from_file(file.path()).unwrap();

        let record = queue.dispense().unwrap();
        let expected: CredentialRecord =
            [("username", "alice"), ("password", "secret1")].into_iter().collect();

        assert_eq!(record, expected);
        assert_eq!(record.username(), Some("alice"));
        assert_eq!(record.get("password"), Some("secret1"));
    }

    #[test]
    fn test_dispense_is_last_in_first_out() {
        let file = users_file("username,password\na,1\nb,2\nc,3\n");
        let queue = CredentialQueue::from_file(file.path()).unwrap();

        let order: Vec<String> = (0..3)
            .map(|_| queue.dispense().unwrap().username().unwrap().to_string())
            .collect();

        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_load_missing_file() {
        let queue = CredentialQueue::new();
        let err = queue.load("/definitely/not/here/users.csv").unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        assert_eq!(queue.load_count(), 0);
    }

    #[test]
    fn test_load_header_only_file() {
        let file = users_file("username,password\n");
        let err = CredentialQueue::from_file(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::EmptyData(_)));
    }

    #[test]
    fn test_load_empty_file() {
        let file = users_file("");
        let err = CredentialQueue::from_file(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::EmptyData(_)));
    }

    #[test]
    fn test_load_replaces_previous_records() {
        let first = users_file("username\nold1\nold2\n");
        let second = users_file("username\nnew\n");
        let queue = CredentialQueue::from_file(first.path()).unwrap();

        assert_eq!(queue.load(second.path()).unwrap(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dispense().unwrap().username(), Some("new"));
        assert_eq!(queue.source().as_deref(), Some(second.path()));
    }

    #[test]
    fn test_ragged_row_is_csv_error_and_keeps_queue() {
        let good = users_file("username\nold1\nold2\n");
        let bad = users_file("username\nnew1\nnew2,extra,field\n");
        let queue = CredentialQueue::from_file(good.path()).unwrap();

        let err = queue.load(bad.path()).unwrap_err();
        assert!(matches!(err, LoadError::Csv(_)));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.source().as_deref(), Some(good.path()));
        assert_eq!(queue.dispense().unwrap().username(), Some("old2"));
        assert_eq!(queue.dispense().unwrap().username(), Some("old1"));

        // Drained: the reload still reads the last good file
        assert_eq!(queue.dispense().unwrap().username(), Some("old2"));
    }

    #[test]
    fn test_invalid_utf8_is_csv_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"username,password\nal\xffce,secret\n").unwrap();
        file.flush().unwrap();

        let queue = CredentialQueue::new();
        let err = queue.load(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Csv(_)));
        assert!(queue.is_empty());
        assert!(queue.source().is_none());
        assert!(matches!(queue.dispense(), Err(LoadError::Exhausted)));
    }

    #[test]
    fn test_empty_load_keeps_previous_records() {
        let good = users_file("username\nalice\n");
        let empty = users_file("username\n");
        let queue = CredentialQueue::from_file(good.path()).unwrap();

        assert!(matches!(
            queue.load(empty.path()),
            Err(LoadError::EmptyData(_))
        ));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.source().as_deref(), Some(good.path()));
        assert_eq!(queue.load_count(), 2);
    }

    #[test]
    fn test_empty_queue_reloads_once() {
        let file = users_file("username\nalice\n");
        let queue = CredentialQueue::from_file(file.path()).unwrap();
        assert_eq!(queue.load_count(), 1);

        assert_eq!(queue.dispense().unwrap().username(), Some("alice"));
        assert!(queue.is_empty());

        // Drained: the next dispense reads the file again
        assert_eq!(queue.dispense().unwrap().username(), Some("alice"));
        assert_eq!(queue.load_count(), 2);
    }

    #[test]
    fn test_exhausted_after_empty_reload() {
        let mut file = users_file("username\nalice\n");
        let queue = CredentialQueue::from_file(file.path()).unwrap();
        queue.dispense().unwrap();

        // Truncate the source so the reload yields nothing
        file.as_file_mut().set_len(0).unwrap();

        let err = queue.dispense().unwrap_err();
        assert!(matches!(err, LoadError::Exhausted));
        assert_eq!(queue.load_count(), 2);
    }

    #[test]
    fn test_dispense_without_source() {
        let queue = CredentialQueue::new();
        assert!(matches!(queue.dispense(), Err(LoadError::Exhausted)));
        assert_eq!(queue.load_count(), 0);
    }

    #[test]
    fn test_record_serializes_as_flat_object() {
        let record: CredentialRecord =
            [("username", "alice"), ("password", "secret1")].into_iter().collect();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"username": "alice", "password": "secret1"})
        );
    }
}
