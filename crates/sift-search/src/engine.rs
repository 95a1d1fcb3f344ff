//! Semantic search engine.
//!
//! Embeds the query text, asks the index for the nearest chunks, collapses
//! them to one hit per owner and decorates each hit with its title and tags.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use sift_core::{
    defaults, ContentItemRepository, DecisionRepository, EmbeddingBackend, EmbeddingIndex, Error,
    OwnerType, Result,
};

use crate::dedup::{collapse_by_owner, OwnerHit};
use crate::filters::SearchFilters;

/// One ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
    /// Cosine similarity of the best matching chunk.
    pub score: f32,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Matching chunks of this owner, including the best one.
    pub chunks_matched: usize,
}

/// Query interface over embedded content and decisions.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>>;
}

/// [`SemanticSearch`] over an [`EmbeddingIndex`].
#[derive(Clone)]
pub struct SemanticSearchEngine {
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn EmbeddingIndex>,
    items: Arc<dyn ContentItemRepository>,
    decisions: Arc<dyn DecisionRepository>,
    snippet_length: usize,
}

impl SemanticSearchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        index: Arc<dyn EmbeddingIndex>,
        items: Arc<dyn ContentItemRepository>,
        decisions: Arc<dyn DecisionRepository>,
    ) -> Self {
        Self {
            embedder,
            index,
            items,
            decisions,
            snippet_length: defaults::SNIPPET_LENGTH,
        }
    }

    pub fn with_snippet_length(mut self, snippet_length: usize) -> Self {
        self.snippet_length = snippet_length;
        self
    }

    /// Titles and tags for every owner in `hits`.
    async fn resolve_owners(
        &self,
        organization_id: Uuid,
        hits: &[OwnerHit],
    ) -> Result<HashMap<(OwnerType, Uuid), (Option<String>, Vec<String>)>> {
        let mut resolved = HashMap::new();

        let item_ids: Vec<Uuid> = hits
            .iter()
            .filter(|h| h.owner().0 == OwnerType::TranscriptChunk)
            .map(|h| h.owner().1)
            .collect();
        if !item_ids.is_empty() {
            for item in self.items.get_many(&item_ids).await? {
                resolved.insert(
                    (OwnerType::TranscriptChunk, item.id),
                    (Some(item.title), item.tags),
                );
            }
        }

        if hits.iter().any(|h| h.owner().0 == OwnerType::Decision) {
            for decision in self.decisions.list_for_organization(organization_id).await? {
                resolved.insert(
                    (OwnerType::Decision, decision.id),
                    (Some(decision.summary), decision.tags),
                );
            }
        }

        Ok(resolved)
    }
}

#[async_trait]
impl SemanticSearch for SemanticSearchEngine {
    #[instrument(
        skip(self, query, filters),
        fields(
            subsystem = "search",
            component = "semantic",
            op = "search",
            organization_id = %filters.organization_id,
            limit = filters.limit,
            result_count = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        )
    )]
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>> {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() || filters.limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed_texts(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no vector returned for query".to_string()))?;

        let matches = self.index.query(&vector, &filters.index_query()).await?;
        let raw_count = matches.len();
        let owners = collapse_by_owner(matches);
        debug!(
            raw_count,
            owner_count = owners.len(),
            threshold = filters.threshold,
            "Index query complete"
        );

        let resolved = self.resolve_owners(filters.organization_id, &owners).await?;
        let mut hits = Vec::with_capacity(owners.len().min(filters.limit));
        for owner in owners {
            let key = owner.owner();
            // Owners deleted since they were embedded.
            let Some((title, tags)) = resolved.get(&key) else {
                trace!(owner_id = %key.1, "Skipping hit without owner");
                continue;
            };
            if !filters.accepts_tags(tags) {
                continue;
            }
            hits.push(SearchHit {
                owner_type: key.0,
                owner_id: key.1,
                score: owner.score(),
                snippet: snippet(&owner.best.embedding.source_text, self.snippet_length),
                title: title.clone(),
                tags: tags.clone(),
                chunks_matched: owner.chunks_matched,
            });
            if hits.len() == filters.limit {
                break;
            }
        }

        let span = tracing::Span::current();
        span.record("result_count", hits.len());
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(hits)
    }
}

/// First `max_chars` characters of `text`, cut back to a word boundary when one is near.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos >= cut.len() / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_short_text_unchanged() {
        assert_eq!(snippet("  hello world ", 50), "hello world");
    }

    #[test]
    fn test_snippet_cuts_at_word_boundary() {
        let s = snippet("the quick brown fox jumps over the lazy dog", 18);
        assert_eq!(s, "the quick brown...");
    }

    #[test]
    fn test_snippet_multibyte() {
        let s = snippet("ééééééééééé", 4);
        assert_eq!(s, "éééé...");
    }
}
