//! Broadcasting modules for real-time event streaming.
//!
//! Job updates are pushed per transition; stats snapshots are pushed on a
//! fixed interval.

pub mod job_events;
pub mod job_store;
pub mod stats;

pub use job_events::{ItemError, JobEvent, JobEventBroadcaster};
pub use job_store::JobStore;
pub use stats::{QueueLoad, QueueStats, StatsBroadcaster, StatsSnapshot, SystemStats};
