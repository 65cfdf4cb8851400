//! Broadcast Hub
//!
//! - `BroadcastHub` - live observer set with per-observer ordered delivery
//! - `ObserverSink` - transport seam for one observer
//! - `ChannelSink` - in-process sink backed by a channel

pub mod broadcast;
pub mod sink;

pub use broadcast::{BroadcastHub, BroadcastReport, ObserverId};
pub use sink::{ChannelSink, ObserverSink};
