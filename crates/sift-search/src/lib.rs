//! # sift-search
//!
//! Semantic search over the sift embedding index.
//!
//! The query is embedded with the same backend as the content, matched
//! against transcript chunks and decision summaries, collapsed to the best
//! hit per owner and filtered by tags.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sift_search::{SearchFilters, SemanticSearch, SemanticSearchEngine};
//!
//! let engine = SemanticSearchEngine::new(embedder, index, items, decisions);
//! let hits = engine
//!     .search("database migration", &SearchFilters::new(org).with_limit(5))
//!     .await?;
//! ```

pub mod dedup;
pub mod engine;
pub mod filters;

pub use dedup::{collapse_by_owner, OwnerHit};
pub use engine::{snippet, SearchHit, SemanticSearch, SemanticSearchEngine};
pub use filters::SearchFilters;
