//! Config - unified settings management
//!
//! - `tracker.rs` - TrackerConfig (scheduler, hub, logging, storage)

mod tracker;

pub use tracker::{
    HubConfig, LoggingConfig, SchedulerConfig, StorageConfig, TrackerConfig, TRACKER_CONFIG_FILE,
};
