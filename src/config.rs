use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_DIR: &str = "manga";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_RETRY_LIMIT: u32 = 4;
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:36.0) Gecko/20100101 Firefox/36.0";

/// Settings for one run of the crawler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Root that series directories are created under
    pub base_dir: PathBuf,
    /// Concurrent workers per stage
    pub workers: usize,
    /// Bounded queue size for the chapter discovery stage
    pub chapter_queue: usize,
    /// Bounded queue size for the page download stage
    pub page_queue: usize,
    /// Re-download chapters that already have an archive or files
    pub force: bool,
    /// Leave chapter directories in place after archiving
    pub keep_dirs: bool,
    /// Draw progress bars on stderr
    pub show_progress: bool,
    #[serde(with = "millis")]
    pub progress_interval: Duration,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    pub user_agent: String,
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            workers: DEFAULT_WORKERS,
            chapter_queue: 1000,
            page_queue: 10000,
            force: false,
            keep_dirs: false,
            show_progress: true,
            progress_interval: Duration::from_millis(125),
            request_timeout: Duration::from_secs(10),
            user_agent: USER_AGENT.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl FetchConfig {
    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }
}

/// Image fetch retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts before a page is abandoned
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add 0-100% random extra delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_LIMIT,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
