//! The discovery-and-dedup supervision loop.
//!
//! - [`registry::WatchedSet`]: who owns which allocation, exactly once
//! - [`poller::DiscoveryPoller`]: lists allocations and claims new ones
//! - [`worker::StreamWorker`]: streams one allocation until it ends
//! - [`sink::LineSink`]: single fan-in consumer for all workers' lines
//! - [`supervisor::Supervisor`]: runs it all, all-or-nothing

pub mod poller;
pub mod registry;
pub mod sink;
pub mod supervisor;
pub mod worker;

pub use poller::DiscoveryPoller;
pub use registry::WatchedSet;
pub use sink::{LineSink, LogLine};
pub use supervisor::Supervisor;
pub use worker::StreamWorker;
