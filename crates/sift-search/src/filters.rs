//! Search filters.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sift_core::{defaults, EmbeddingQuery, OwnerType, SourceType};

/// Hits fetched from the index per requested result, before collapsing
/// chunks and applying tag filters.
const OVERFETCH_FACTOR: usize = 4;

/// Filters for a semantic search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilters {
    pub organization_id: Uuid,
    /// Hard lower bound on cosine similarity.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub source_types: Vec<SourceType>,
    #[serde(default)]
    pub owner_types: Vec<OwnerType>,
    /// Every listed tag must be present on the hit (case-insensitive).
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub owner_ids: Vec<Uuid>,
}

fn default_threshold() -> f32 {
    defaults::SEARCH_THRESHOLD
}

fn default_limit() -> usize {
    defaults::SEARCH_LIMIT
}

impl SearchFilters {
    pub fn new(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            threshold: default_threshold(),
            limit: default_limit(),
            source_types: Vec::new(),
            owner_types: Vec::new(),
            tags: Vec::new(),
            owner_ids: Vec::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_source_types(mut self, source_types: Vec<SourceType>) -> Self {
        self.source_types = source_types;
        self
    }

    pub fn with_owner_types(mut self, owner_types: Vec<OwnerType>) -> Self {
        self.owner_types = owner_types;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_owner_ids(mut self, owner_ids: Vec<Uuid>) -> Self {
        self.owner_ids = owner_ids;
        self
    }

    /// The index query backing these filters.
    pub fn index_query(&self) -> EmbeddingQuery {
        EmbeddingQuery::new(self.organization_id)
            .with_threshold(self.threshold)
            .with_limit(self.limit.saturating_mul(OVERFETCH_FACTOR).max(self.limit))
            .with_owner_types(self.owner_types.clone())
            .with_source_types(self.source_types.clone())
            .with_owner_ids(self.owner_ids.clone())
    }

    /// Whether `tags` satisfies the tag filter.
    pub fn accepts_tags(&self, tags: &[String]) -> bool {
        self.tags
            .iter()
            .all(|wanted| tags.iter().any(|t| t.eq_ignore_ascii_case(wanted.trim())))
    }
}
