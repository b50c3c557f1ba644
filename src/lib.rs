//! Live log tailer for running Nomad job allocations.
//!
//! Discovers the running allocations of a configured set of jobs, opens a
//! follow-mode log stream (stdout and stderr) for each one, and funnels every
//! decoded line into a single output sink. The watched-set registry
//! guarantees no allocation is ever streamed by more than one worker at a
//! time; worker termination always releases the slot so the next discovery
//! poll can pick the allocation up again if it is still running.

pub mod api;
pub mod config;
pub mod error;
pub mod shutdown;
pub mod watch;
