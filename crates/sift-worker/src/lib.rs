//! # sift-worker
//!
//! Wires the sift crates into a running service: configuration from the
//! environment, tracing setup, the [`SiftService`] facade callers use, and the
//! periodic knowledge graph scheduler. The `sift-worker` binary runs the job
//! worker on top of it.

pub mod config;
pub mod scheduler;
pub mod service;
pub mod telemetry;

pub use config::{LogConfig, LogFormat, SiftConfig};
pub use scheduler::{spawn_graph_scheduler, SchedulerHandle};
pub use service::{Backends, SiftService};
pub use telemetry::init_tracing;
