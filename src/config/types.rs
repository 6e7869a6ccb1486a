use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a harvest run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    pub output: OutputConfig,
}

/// Remote API endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// URL that receives one POST per identifier
    pub endpoint: String,

    /// Form field carrying the identifier
    #[serde(default = "default_id_param")]
    pub id_param: String,

    /// Payload field holding the record name
    #[serde(default = "default_name_field")]
    pub name_field: String,

    /// Total per-request timeout (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Connect timeout (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Client identity material used to decorate every request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentityConfig {
    /// Pool of User-Agent strings, one is picked at random per request
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    #[serde(default)]
    pub referer: Option<String>,

    #[serde(default)]
    pub origin: Option<String>,
}

/// Identifier range, worker pool and pacing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HarvestConfig {
    /// First identifier of the range
    #[serde(default = "default_first_id")]
    pub first_id: u32,

    /// Number of identifiers in the range
    #[serde(default = "default_total_ids")]
    pub total_ids: u32,

    /// Number of concurrent workers
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: u32,

    /// Flush a checkpoint after this many successes
    #[serde(default = "default_save_every")]
    pub save_every: u32,

    /// Pacing delay between two items of one worker (milliseconds)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Pre-request jitter window (milliseconds)
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,

    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,

    /// Sleep after a worker fault before picking the next item (milliseconds)
    #[serde(default = "default_worker_recovery_ms")]
    pub worker_recovery_ms: u64,

    /// Randomize the order of the work list
    #[serde(default = "default_true")]
    pub shuffle: bool,

    /// A restart within this many seconds of the last save triggers a cooldown
    #[serde(default = "default_cooldown_threshold_secs")]
    pub cooldown_threshold_secs: u64,

    #[serde(default = "default_cooldown_min_ms")]
    pub cooldown_min_ms: u64,

    #[serde(default = "default_cooldown_max_ms")]
    pub cooldown_max_ms: u64,
}

/// Retry and backoff configuration for a single identifier
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackoffConfig {
    /// Backoff applied to the first rate-limit response (milliseconds)
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,

    /// Multiplier applied after a rate-limit response
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,

    /// Multiplier applied after a transient network fault
    #[serde(default = "default_transient_factor")]
    pub transient_factor: f64,

    /// Upper bound for the backoff (milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,

    /// Upper bound for the pause after a transient fault (milliseconds)
    #[serde(default = "default_transient_pause_cap_ms")]
    pub transient_pause_cap_ms: u64,

    /// Attempts per identifier before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Total time budget per identifier (seconds)
    #[serde(default = "default_max_elapsed_secs")]
    pub max_elapsed_secs: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the dataset JSON document (id -> name)
    pub dataset_path: PathBuf,

    /// Path to the progress JSON document
    pub progress_path: PathBuf,

    /// Optional log file, appended to
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_agents: default_user_agents(),
            referer: None,
            origin: None,
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            first_id: default_first_id(),
            total_ids: default_total_ids(),
            max_concurrent_requests: default_max_concurrent_requests(),
            save_every: default_save_every(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            worker_recovery_ms: default_worker_recovery_ms(),
            shuffle: true,
            cooldown_threshold_secs: default_cooldown_threshold_secs(),
            cooldown_min_ms: default_cooldown_min_ms(),
            cooldown_max_ms: default_cooldown_max_ms(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            factor: default_backoff_factor(),
            transient_factor: default_transient_factor(),
            max_ms: default_backoff_max_ms(),
            transient_pause_cap_ms: default_transient_pause_cap_ms(),
            max_attempts: default_max_attempts(),
            max_elapsed_secs: default_max_elapsed_secs(),
        }
    }
}

impl HarvestConfig {
    /// Last identifier of the range (inclusive)
    pub fn last_id(&self) -> u32 {
        self.first_id.saturating_add(self.total_ids.saturating_sub(1))
    }

    /// Iterates over every identifier in the configured range
    pub fn id_range(&self) -> std::ops::RangeInclusive<u32> {
        self.first_id..=self.last_id()
    }

    pub fn worker_recovery(&self) -> Duration {
        Duration::from_millis(self.worker_recovery_ms)
    }

    pub fn cooldown_threshold(&self) -> Duration {
        Duration::from_secs(self.cooldown_threshold_secs)
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_id_param() -> String {
    "id".to_string()
}

fn default_name_field() -> String {
    "name".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/94.0.4606.81 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:93.0) Gecko/20100101 Firefox/93.0",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/94.0.4606.81 Safari/537.36",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1",
        "Mozilla/5.0 (Linux; Android 10; Pixel 3 XL) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.120 Mobile Safari/537.36",
    ]
    .iter()
    .map(|ua| ua.to_string())
    .collect()
}

fn default_first_id() -> u32 {
    1
}

fn default_total_ids() -> u32 {
    5169
}

fn default_max_concurrent_requests() -> u32 {
    2
}

fn default_save_every() -> u32 {
    5
}

fn default_min_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    3_000
}

fn default_jitter_min_ms() -> u64 {
    100
}

fn default_jitter_max_ms() -> u64 {
    500
}

fn default_worker_recovery_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_cooldown_threshold_secs() -> u64 {
    300
}

fn default_cooldown_min_ms() -> u64 {
    30_000
}

fn default_cooldown_max_ms() -> u64 {
    60_000
}

fn default_backoff_initial_ms() -> u64 {
    30_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_transient_factor() -> f64 {
    1.5
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_transient_pause_cap_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_max_elapsed_secs() -> u64 {
    1_800
}
