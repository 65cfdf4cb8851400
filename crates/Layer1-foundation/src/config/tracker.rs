//! Tracker Config - unified settings
//!
//! Loaded by layering the project file over the global file over defaults.
//! Layers merge key by key, so a later file may set any value, including one
//! equal to its default. Every section falls back to its defaults when absent.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Config file name
pub const TRACKER_CONFIG_FILE: &str = "config.json";

// ============================================================================
// Tracker Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Version (for migration)
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            scheduler: SchedulerConfig::default(),
            hub: HubConfig::default(),
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Global + project merged load
    pub fn load() -> Result<Self> {
        let mut layers = Vec::new();

        // 1. Global
        if let Ok(global) = JsonStore::global() {
            layers.extend(global.load_optional::<Value>(TRACKER_CONFIG_FILE)?);
        }

        // 2. Project
        if let Ok(project) = JsonStore::current_project() {
            layers.extend(project.load_optional::<Value>(TRACKER_CONFIG_FILE)?);
        }

        Self::from_layers(layers)
    }

    /// Load a single explicit file over the defaults
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Self::from_layers(store.load_optional::<Value>(TRACKER_CONFIG_FILE)?)
    }

    /// Merge raw JSON layers in order, later keys winning, then validate
    pub fn from_layers(layers: impl IntoIterator<Item = Value>) -> Result<Self> {
        let mut merged = Value::Object(Default::default());
        for layer in layers {
            merge_value(&mut merged, layer);
        }

        let config: TrackerConfig = serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_global(&self) -> Result<()> {
        let store = JsonStore::global()?;
        store.save(TRACKER_CONFIG_FILE, self)
    }

    pub fn save_project(&self) -> Result<()> {
        let store = JsonStore::current_project()?;
        store.save(TRACKER_CONFIG_FILE, self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.execution_timeout_ms == 0 {
            return Err(Error::Config("scheduler.executionTimeoutMs must be > 0".into()));
        }
        if self.hub.send_timeout_ms == 0 {
            return Err(Error::Config("hub.sendTimeoutMs must be > 0".into()));
        }
        if self.hub.observer_queue_capacity == 0 {
            return Err(Error::Config("hub.observerQueueCapacity must be > 0".into()));
        }
        if self.storage.default_list_limit == 0 {
            return Err(Error::Config("storage.defaultListLimit must be > 0".into()));
        }
        if self.logging.source.trim().is_empty() {
            return Err(Error::Config("logging.source must not be empty".into()));
        }
        Ok(())
    }

    /// Data directory, defaulting to the platform's local data dir
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tasktrack")
        })
    }
}

// ============================================================================
// Scheduler Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Simulated work time per task
    #[serde(default = "default_processing_delay_ms")]
    pub processing_delay_ms: u64,

    /// Upper bound on one unit of work; exceeding it fails the task
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            processing_delay_ms: default_processing_delay_ms(),
            execution_timeout_ms: default_execution_timeout_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }
}

// ============================================================================
// Hub Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConfig {
    /// A send slower than this counts as a delivery failure
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Outbound messages buffered per observer
    #[serde(default = "default_observer_queue_capacity")]
    pub observer_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            observer_queue_capacity: default_observer_queue_capacity(),
        }
    }
}

impl HubConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

// ============================================================================
// Logging Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `source` column written by the event correlator
    #[serde(default = "default_log_source")]
    pub source: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            source: default_log_source(),
        }
    }
}

// ============================================================================
// Storage Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Page size when a listing request gives none
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_list_limit: default_list_limit(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Deep-merge `overlay` into `base`; non-object values replace wholesale
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_value(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn default_version() -> u32 {
    1
}

fn default_processing_delay_ms() -> u64 {
    1000
}

fn default_execution_timeout_ms() -> u64 {
    30_000
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_observer_queue_capacity() -> usize {
    256
}

fn default_log_source() -> String {
    "task_executor".to_string()
}

fn default_list_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::new();
        assert_eq!(config.scheduler.processing_delay(), Duration::from_secs(1));
        assert_eq!(config.hub.observer_queue_capacity, 256);
        assert_eq!(config.logging.source, "task_executor");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"scheduler": {"processingDelayMs": 50}}"#).unwrap();
        assert_eq!(config.scheduler.processing_delay_ms, 50);
        assert_eq!(config.scheduler.execution_timeout_ms, 30_000);
        assert_eq!(config.hub, HubConfig::default());
    }

    #[test]
    fn test_layers_override_key_by_key() {
        let global = serde_json::json!({
            "hub": {"sendTimeoutMs": 900},
            "scheduler": {"processingDelayMs": 50}
        });
        let project = serde_json::json!({
            "scheduler": {"executionTimeoutMs": 10},
            "storage": {"dataDir": "/tmp/tt"}
        });

        let config = TrackerConfig::from_layers([global, project]).unwrap();

        assert_eq!(config.hub.send_timeout_ms, 900);
        assert_eq!(config.scheduler.processing_delay_ms, 50);
        assert_eq!(config.scheduler.execution_timeout_ms, 10);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/tt"));
    }

    #[test]
    fn test_project_can_restore_a_default() {
        let global = serde_json::json!({"scheduler": {"processingDelayMs": 50}});
        let project = serde_json::json!({"scheduler": {"processingDelayMs": 1000}});

        let config = TrackerConfig::from_layers([global, project]).unwrap();
        assert_eq!(config.scheduler.processing_delay_ms, 1000);
    }

    #[test]
    fn test_default_matches_new() {
        assert_eq!(TrackerConfig::default(), TrackerConfig::new());
        assert_eq!(TrackerConfig::default().version, 1);
        assert_eq!(TrackerConfig::from_layers(Vec::<Value>::new()).unwrap(), TrackerConfig::new());
    }

    #[test]
    fn test_invalid_layer_is_config_error() {
        let bad = serde_json::json!({"hub": {"sendTimeoutMs": "soon"}});
        assert!(matches!(
            TrackerConfig::from_layers([bad]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = TrackerConfig::new();
        config.hub.observer_queue_capacity = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = std::env::temp_dir().join(format!("tasktrack-cfg-{}", uuid::Uuid::new_v4()));
        let store = JsonStore::new(&dir);

        let mut saved = TrackerConfig::new();
        saved.logging.source = "api".to_string();
        store.save(TRACKER_CONFIG_FILE, &saved).unwrap();

        let loaded = TrackerConfig::load_from(&store).unwrap();
        assert_eq!(loaded.logging.source, "api");

        let _ = std::fs::remove_dir_all(dir);
    }
}
