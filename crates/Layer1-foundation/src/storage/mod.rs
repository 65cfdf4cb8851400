//! Storage module for tasktrack
//!
//! - `memory`: in-process tasks and logs (tests, one-shot runs)
//! - `db`: SQLite - tasks and logs persisted across runs
//! - `json`: JSON - configuration files

mod db;
mod json;
mod memory;

// SQLite Storage (runtime data)
pub use db::{SqliteStore, DB_FILE};

// In-memory Storage
pub use memory::MemoryStore;

// JSON Storage (config)
pub use json::JsonStore;
