//! Configuration types for transferd

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use utoipa::ToSchema;

/// Serializes a `Duration` as an integer number of seconds.
pub mod duration_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Like [`duration_serde`] but for `Option<Duration>`.
pub mod optional_duration_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_concurrent_by_host() -> usize {
    2
}

fn default_max_concurrent_by_group() -> HashMap<String, usize> {
    HashMap::new()
}

/// Concurrency caps enforced by the holding queue (three independent semaphores:
/// global, per-host, per-group). A task is released to the executor only when
/// all three caps it is subject to have a free slot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum number of tasks running concurrently across the whole engine.
    pub max_concurrent: usize,
    /// Default per-host cap, used when a host has no entry in `max_concurrent_by_group`.
    pub max_concurrent_by_host: usize,
    /// Per-group concurrency overrides, keyed by task group name.
    pub max_concurrent_by_group: HashMap<String, usize>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_concurrent_by_host: default_max_concurrent_by_host(),
            max_concurrent_by_group: default_max_concurrent_by_group(),
        }
    }
}

fn default_base_directory() -> String {
    ".".to_string()
}

fn default_temp_dir() -> String {
    std::env::temp_dir().to_string_lossy().into_owned()
}

/// Filesystem locations the engine writes into.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory `BaseDirectory::ApplicationDocuments` resolves to.
    pub base_directory: String,
    /// Directory used for in-progress chunk files and resume staging.
    pub temp_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
            temp_dir: default_temp_dir(),
        }
    }
}

fn default_soft_timeout() -> Duration {
    Duration::from_secs(9 * 60)
}

fn default_hard_timeout() -> Duration {
    Duration::from_secs(4 * 60 * 60)
}

/// Per-task wall-clock limits enforced by the transfer executor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TimeoutConfig {
    /// If a running task exceeds this duration it is suspended and re-enqueued
    /// rather than failed, modeling a background-execution time limit.
    #[serde(with = "duration_serde")]
    #[schema(value_type = u64)]
    pub soft_timeout: Duration,
    /// If a running task exceeds this duration it is failed outright.
    #[serde(with = "duration_serde")]
    #[schema(value_type = u64)]
    pub hard_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            soft_timeout: default_soft_timeout(),
            hard_timeout: default_hard_timeout(),
        }
    }
}

fn default_max_record_count() -> usize {
    500
}

fn default_max_age() -> Duration {
    Duration::from_secs(10 * 24 * 60 * 60)
}

fn default_auto_clean() -> bool {
    false
}

fn default_cleanup_rate_per_second() -> u32 {
    5
}

fn default_auto_clean_interval() -> u64 {
    100
}

/// Cleanup policy for completed/terminal task records in the state store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CleanupConfig {
    /// Keep at most this many records, sorted by creation time descending.
    pub max_record_count: usize,
    /// Delete records older than this once `max_record_count` is exceeded.
    #[serde(with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_age: Duration,
    /// When true, cleanup also runs automatically every `auto_clean_interval`
    /// record updates, not just on explicit request.
    pub auto_clean: bool,
    /// Record-update interval that triggers an automatic cleanup pass.
    pub auto_clean_interval: u64,
    /// Deletions are paced to roughly this many per second.
    pub rate_per_second: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_record_count: default_max_record_count(),
            max_age: default_max_age(),
            auto_clean: default_auto_clean(),
            auto_clean_interval: default_auto_clean_interval(),
            rate_per_second: default_cleanup_rate_per_second(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// Retry/backoff tuning for ambient (non-task) retryable operations, such as
/// establishing the state-store connection pool. Task-level retries use the
/// deterministic `retries`/`retries_remaining` scheme on `TaskMeta` instead,
/// see [`crate::retry::task_backoff`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "duration_serde")]
    #[schema(value_type = u64)]
    pub initial_delay: Duration,
    #[serde(with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Simulated network connectivity, exposed through `GET /network-status` and
/// mutated through `PATCH /config/network-status` so test harnesses can
/// exercise `requiresWiFi` admission without real network hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum NetworkStatus {
    Unmetered,
    Metered,
    Unknown,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        NetworkStatus::Unmetered
    }
}

impl NetworkStatus {
    /// Whether a task whose `requiresWiFi` is set may run under this status.
    pub fn satisfies_wifi_requirement(self) -> bool {
        matches!(self, NetworkStatus::Unmetered)
    }
}

fn default_database_path() -> String {
    "transferd.db".to_string()
}

/// Durable state-store location.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PersistenceConfig {
    pub database_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_cors_enabled() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_swagger_ui() -> bool {
    true
}

fn default_api_key() -> Option<String> {
    None
}

/// REST command-surface bind and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
    /// If set, all requests must carry this value in an `X-Api-Key` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub swagger_ui: bool,
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: default_api_key(),
            cors_enabled: default_cors_enabled(),
            cors_origins: default_cors_origins(),
            swagger_ui: default_swagger_ui(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    false
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst_size() -> u32 {
    20
}

fn default_exempt_paths() -> Vec<String> {
    vec!["/health".to_string(), "/swagger-ui".to_string()]
}

/// Token-bucket rate limiting applied in front of the REST command surface.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub exempt_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
            exempt_paths: default_exempt_paths(),
        }
    }
}

/// Top-level configuration for the transfer engine and its REST surface.
///
/// Sub-configs are flattened into a single JSON object so a config file reads
/// as one flat document while the Rust types stay decomposed by concern.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct Config {
    #[serde(flatten)]
    pub concurrency: ConcurrencyConfig,
    #[serde(flatten)]
    pub storage: StorageConfig,
    #[serde(flatten)]
    pub timeouts: TimeoutConfig,
    #[serde(flatten)]
    pub cleanup: CleanupConfig,
    #[serde(flatten)]
    pub retry: RetryConfig,
    pub network_status: NetworkStatus,
    pub persistence: PersistenceConfig,
    pub api: ApiConfig,
}

impl Config {
    pub fn database_path(&self) -> &str {
        &self.persistence.database_path
    }

    pub fn base_directory(&self) -> &str {
        &self.storage.base_directory
    }

    pub fn temp_dir(&self) -> &str {
        &self.storage.temp_dir
    }

    pub fn max_concurrent_for_group(&self, group: &str) -> usize {
        self.concurrency
            .max_concurrent_by_group
            .get(group)
            .copied()
            .unwrap_or(self.concurrency.max_concurrent)
    }
}

/// Partial update for runtime-changeable settings via `PATCH
/// /config/network-status`.
///
/// `max_concurrent` uses the `Option<Option<T>>` idiom: `None` (field
/// omitted) means no change, `Some(None)` means explicit `null`, `Some(Some(v))`
/// means set to `v`. As with plain `serde_json`, the distinction between
/// "omitted" and "explicit null" only survives on the serialization side
/// (`skip_serializing_if`) — deserializing treats both as `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_status: Option<NetworkStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<Option<usize>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_spec_constants() {
        let config = Config::default();
        assert_eq!(config.cleanup.max_record_count, 500);
        assert_eq!(config.cleanup.max_age, Duration::from_secs(10 * 24 * 60 * 60));
        assert!(!config.cleanup.auto_clean);
        assert_eq!(config.timeouts.soft_timeout, Duration::from_secs(9 * 60));
        assert_eq!(config.timeouts.hard_timeout, Duration::from_secs(4 * 60 * 60));
        assert_eq!(config.network_status, NetworkStatus::Unmetered);
    }

    #[test]
    fn network_status_satisfies_wifi_requirement() {
        assert!(NetworkStatus::Unmetered.satisfies_wifi_requirement());
        assert!(!NetworkStatus::Metered.satisfies_wifi_requirement());
        assert!(!NetworkStatus::Unknown.satisfies_wifi_requirement());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("max_concurrent").is_some());
        assert!(json.get("max_record_count").is_some());
        assert!(json.get("soft_timeout").is_some());
        assert!(json.get("persistence").is_some());
        assert!(json.get("api").is_some());

        let round_tripped: Config = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped.concurrency.max_concurrent, config.concurrency.max_concurrent);
        assert_eq!(round_tripped.persistence.database_path, config.persistence.database_path);
    }

    #[test]
    fn duration_serde_round_trips_as_seconds() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(with = "duration_serde")]
            d: Duration,
        }
        let wrapper = Wrapper { d: Duration::from_secs(42) };
        let json = serde_json::to_string(&wrapper).unwrap();
        assert_eq!(json, r#"{"d":42}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.d, Duration::from_secs(42));
    }

    #[test]
    fn optional_duration_serde_round_trips_none_and_some() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(with = "optional_duration_serde")]
            d: Option<Duration>,
        }
        let some = Wrapper { d: Some(Duration::from_secs(7)) };
        let json = serde_json::to_string(&some).unwrap();
        assert_eq!(json, r#"{"d":7}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.d, Some(Duration::from_secs(7)));

        let none = Wrapper { d: None };
        let json = serde_json::to_string(&none).unwrap();
        assert_eq!(json, r#"{"d":null}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.d, None);
    }

    #[test]
    fn config_update_none_omits_fields_entirely() {
        let update = ConfigUpdate::default();
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.as_object().unwrap().is_empty());
    }

    #[test]
    fn config_update_some_none_serializes_as_null() {
        let update = ConfigUpdate {
            max_concurrent: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert!(json["max_concurrent"].is_null());
    }

    #[test]
    fn config_update_some_some_serializes_as_number() {
        let update = ConfigUpdate {
            max_concurrent: Some(Some(8)),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["max_concurrent"], 8);
    }

    #[test]
    fn config_update_deserializes_missing_field_as_none() {
        let update: ConfigUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.network_status.is_none());
        assert!(update.max_concurrent.is_none());
    }

    #[test]
    fn config_update_deserializes_explicit_value() {
        let update: ConfigUpdate = serde_json::from_str(r#"{"max_concurrent": 8}"#).unwrap();
        assert_eq!(update.max_concurrent, Some(Some(8)));
    }

    #[test]
    fn config_update_sets_network_status() {
        let update: ConfigUpdate =
            serde_json::from_str(r#"{"network_status": "metered"}"#).unwrap();
        assert_eq!(update.network_status, Some(NetworkStatus::Metered));
    }

    #[test]
    fn max_concurrent_for_group_falls_back_to_global_default() {
        let mut config = Config::default();
        config.concurrency.max_concurrent = 4;
        config.concurrency.max_concurrent_by_group.insert("videos".to_string(), 1);
        assert_eq!(config.max_concurrent_for_group("videos"), 1);
        assert_eq!(config.max_concurrent_for_group("other"), 4);
    }

    #[test]
    fn rejects_invalid_duration_json() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(with = "duration_serde")]
            #[allow(dead_code)]
            d: Duration,
        }
        let err = serde_json::from_str::<Wrapper>(r#"{"d": "not-a-number"}"#);
        assert!(err.is_err());
    }
}
