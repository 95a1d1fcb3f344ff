//! # sift-core
//!
//! Core types, traits, and abstractions for the sift content pipeline.
//!
//! This crate provides the data model (content items, embeddings, topics,
//! decisions, jobs), the processing state machine, and the repository and
//! backend traits the other sift crates implement.

pub mod action_items;
pub mod defaults;
pub mod error;
pub mod events;
pub mod models;
pub mod similarity;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use action_items::{plan_merge, ActionItemMerge};
pub use error::{Error, ErrorClass, Result};
pub use events::{EventBus, EventEnvelope, ServerEvent};
pub use models::*;
pub use similarity::{centroid, cosine_similarity};
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
