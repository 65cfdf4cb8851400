//! # tasktrack-task
//!
//! Task lifecycle tracking for tasktrack.
//! Accepts command submissions, runs each one as an independent unit of work,
//! and fans status changes out to live observers while correlating log lines
//! with the tasks that produced them.
//!
//! ## Components
//!
//! - **Registry** - task records and atomic lifecycle transitions
//! - **Scheduler** - spawned units of work (start, delay, execute, finish)
//! - **Hub** - live observer set with per-observer ordered delivery
//! - **Correlator** - durable log lines tied to tasks and agents
//! - **Agents** - directory of registered agents and their heartbeats
//! - **Manager** - the facade that wires them together

pub mod agents;
pub mod correlator;
pub mod event;
pub mod executor;
pub mod hub;
pub mod manager;
pub mod registry;
pub mod scheduler;
pub mod state;

// Task lifecycle
pub use registry::TaskRegistry;
pub use state::{apply_transition, TransitionFields};

// Execution
pub use executor::{
    Delay, ExecutionFault, Executor, FaultKind, NoDelay, Outcome, SimulatedExecutor, SleepDelay,
};
pub use scheduler::{ExecutionScheduler, ScheduleHandle};

// Live delivery
pub use event::{EventKind, LifecycleEvent};
pub use hub::{BroadcastHub, BroadcastReport, ChannelSink, ObserverId, ObserverSink};

// Agents
pub use agents::{AgentRegistry, MAX_AGENT_NAME};

// Logs
pub use correlator::EventCorrelator;

// Facade
pub use manager::{TaskManager, TaskManagerBuilder, MAX_LIST_LIMIT};
