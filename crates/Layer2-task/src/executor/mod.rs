//! Task executors
//!
//! - `Executor` - backend seam, one call per task
//! - `SimulatedExecutor` - default backend, echoes the command
//! - `Delay` - processing pause before execution (`SleepDelay`, `NoDelay`)
//! - `Outcome` - tagged success/fault of one execution

pub mod delay;
pub mod outcome;
pub mod simulated;
pub mod r#trait;

pub use delay::{Delay, NoDelay, SleepDelay};
pub use outcome::{ExecutionFault, FaultKind, Outcome};
pub use r#trait::Executor;
pub use simulated::SimulatedExecutor;
