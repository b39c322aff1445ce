use crate::error::{LoadError, LoadResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load test configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// API under test
    #[serde(default)]
    pub target: TargetConfig,

    /// Simulated users
    #[serde(default)]
    pub users: UsersConfig,

    /// Relative weight of each user group
    #[serde(default)]
    pub weights: GroupWeights,

    /// Log destinations
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL, e.g. `http://localhost:8000`
    #[serde(default = "default_host")]
    pub host: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Simulated user configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersConfig {
    /// CSV file with one row per identity
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Number of concurrent users
    #[serde(default = "default_user_count")]
    pub count: usize,

    /// Users started per second
    #[serde(default = "default_spawn_rate")]
    pub spawn_rate: f64,

    /// Total run time, humantime format (`30s`, `5m`, `1h`)
    #[serde(default = "default_run_time")]
    pub run_time: String,

    /// Lower bound of the pause between task sequences
    #[serde(default = "default_think_time_min_ms")]
    pub think_time_min_ms: u64,

    /// Upper bound of the pause between task sequences
    #[serde(default = "default_think_time_max_ms")]
    pub think_time_max_ms: u64,
}

/// User group weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupWeights {
    #[serde(default = "default_tests_weight")]
    pub tests: u32,

    #[serde(default = "default_lists_weight")]
    pub lists: u32,

    #[serde(default = "default_stats_weight")]
    pub stats: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for request/response trace files
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Runtime event log file; no event log when unset
    pub event_log_path: Option<PathBuf>,

    /// Logger name written on every event line
    #[serde(default = "default_event_source")]
    pub event_source: String,

    /// Console log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_host() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("data/users.csv")
}

fn default_user_count() -> usize {
    10
}

fn default_spawn_rate() -> f64 {
    1.0
}

fn default_run_time() -> String {
    "1m".to_string()
}

fn default_think_time_min_ms() -> u64 {
    1000
}

fn default_think_time_max_ms() -> u64 {
    2000
}

fn default_tests_weight() -> u32 {
    4
}

fn default_lists_weight() -> u32 {
    2
}

fn default_stats_weight() -> u32 {
    1
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_event_source() -> String {
    "load_test".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            count: default_user_count(),
            spawn_rate: default_spawn_rate(),
            run_time: default_run_time(),
            think_time_min_ms: default_think_time_min_ms(),
            think_time_max_ms: default_think_time_max_ms(),
        }
    }
}

impl Default for GroupWeights {
    fn default() -> Self {
        Self {
            tests: default_tests_weight(),
            lists: default_lists_weight(),
            stats: default_stats_weight(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            event_log_path: None,
            event_source: default_event_source(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> LoadResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("TARGET_HOST") {
            config.target.host = host;
        }

        if let Ok(path) = std::env::var("USERS_CSV") {
            config.users.credentials_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("LOGS_DIR") {
            config.logging.logs_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("EVENT_LOG_FILE") {
            config.logging.event_log_path = Some(PathBuf::from(path));
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.log_level = level;
        }

        config
    }

    /// Parsed run time
    pub fn run_time(&self) -> LoadResult<Duration> {
        humantime::parse_duration(&self.users.run_time).map_err(|e| {
            LoadError::Config(format!("Invalid run time '{}': {}", self.users.run_time, e))
        })
    }

    /// Think time bounds
    pub fn think_time(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.users.think_time_min_ms),
            Duration::from_millis(self.users.think_time_max_ms),
        )
    }

    /// Delay between two user spawns
    pub fn spawn_interval(&self) -> LoadResult<Duration> {
        let rate = self.users.spawn_rate;
        if rate.is_nan() || rate <= 0.0 {
            return Err(LoadError::Config("spawn rate must be positive".to_string()));
        }

        Duration::try_from_secs_f64(1.0 / rate).map_err(|_| {
            LoadError::Config(format!("spawn rate {} is too low", rate))
        })
    }

    /// Reject configurations the runner cannot execute
    pub fn validate(&self) -> LoadResult<()> {
        self.run_time()?;

        if self.users.count == 0 {
            return Err(LoadError::Config("user count must be positive".to_string()));
        }

        self.spawn_interval()?;

        if self.users.think_time_min_ms > self.users.think_time_max_ms {
            return Err(LoadError::Config(
                "think time minimum exceeds maximum".to_string(),
            ));
        }

        let weights = &self.weights;
        if weights.tests == 0 && weights.lists == 0 && weights.stats == 0 {
            return Err(LoadError::Config(
                "at least one user group needs a positive weight".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target.host, "http://localhost:8000");
        assert_eq!(config.users.credentials_path, PathBuf::from("data/users.csv"));
        assert_eq!(config.weights.tests, 4);
        assert_eq!(config.weights.lists, 2);
        assert_eq!(config.weights.stats, 1);
        assert_eq!(config.logging.logs_dir, PathBuf::from("logs"));
        assert!(config.logging.event_log_path.is_none());
        assert_eq!(
            config.think_time(),
            (Duration::from_secs(1), Duration::from_secs(2))
        );
        assert_eq!(config.run_time().unwrap(), Duration::from_secs(60));
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_with_partial_sections() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[target]
host = "http://api.test:9000"

[users]
count = 50
run_time = "5m"

[logging]
event_log_path = "out/run.log"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.target.host, "http://api.test:9000");
        assert_eq!(config.target.request_timeout_secs, 30);
        assert_eq!(config.users.count, 50);
        assert_eq!(config.users.spawn_rate, 1.0);
        assert_eq!(config.run_time().unwrap(), Duration::from_secs(300));
        assert_eq!(
            config.logging.event_log_path,
            Some(PathBuf::from("out/run.log"))
        );
        assert_eq!(config.weights.tests, 4);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/load-test.toml");
        let config = Config::from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.run_time().unwrap(), Duration::from_secs(300));
        assert_eq!(
            config.logging.event_log_path,
            Some(PathBuf::from("logs/load_test.log"))
        );
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[users\ncount = ").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(LoadError::Config(_))
        ));
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("TARGET_HOST", "http://staging:8080");
        std::env::set_var("USERS_CSV", "fixtures/staging.csv");
        std::env::set_var("EVENT_LOG_FILE", "out/events.log");

        let config = Config::from_env();

        std::env::remove_var("TARGET_HOST");
        std::env::remove_var("USERS_CSV");
        std::env::remove_var("EVENT_LOG_FILE");

        assert_eq!(config.target.host, "http://staging:8080");
        assert_eq!(
            config.users.credentials_path,
            PathBuf::from("fixtures/staging.csv")
        );
        assert_eq!(
            config.logging.event_log_path,
            Some(PathBuf::from("out/events.log"))
        );
        assert_eq!(config.logging.logs_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.users.run_time = "forever".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.users.count = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.users.think_time_min_ms = 3000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.weights = GroupWeights {
            tests: 0,
            lists: 0,
            stats: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_spawn_interval() {
        let mut config = Config::default();
        config.users.spawn_rate = 4.0;
        assert_eq!(config.spawn_interval().unwrap(), Duration::from_millis(250));

        for rate in [0.0, -1.0, f64::NAN, 1e-30] {
            config.users.spawn_rate = rate;
            assert!(matches!(config.spawn_interval(), Err(LoadError::Config(_))));
            assert!(matches!(config.validate(), Err(LoadError::Config(_))));
        }
    }

    #[test]
    fn test_huge_weights_are_valid() {
        let mut config = Config::default();
        config.weights = GroupWeights {
            tests: u32::MAX,
            lists: 1,
            stats: 0,
        };
        config.validate().unwrap();

        config.weights = GroupWeights {
            tests: u32::MAX,
            lists: u32::MAX,
            stats: u32::MAX,
        };
        config.validate().unwrap();
    }
}
