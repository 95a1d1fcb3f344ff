//! # sift-graph
//!
//! Light knowledge graph over an organization's content:
//!
//! - **Topics**: items are clustered by the centroid of their transcript
//!   embeddings (union-find over a similarity threshold), matched to existing
//!   topics by name or keyword overlap, named by a model with a keyword
//!   fallback, and scored for trend.
//! - **Decision conflicts**: decisions with similar summaries are compared
//!   heuristically and reported as contradictions, unclear supersessions, or
//!   scope overlaps.
//!
//! Failures here never change item processing state; callers log and move on.

pub mod builder;
pub mod clustering;
pub mod conflicts;
pub mod keywords;
pub mod topics;

pub use builder::{GraphConfig, KnowledgeGraphBuilder, RebuildSummary};
pub use clustering::{cluster_items, item_centroids, Cluster, ClusterConfig, ItemVector};
pub use conflicts::ConflictDetector;
pub use topics::{compute_trend, match_topic, GenerationTopicNamer, TopicNamer};
