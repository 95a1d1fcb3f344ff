//! Chunk-hit deduplication.
//!
//! Transcripts are embedded chunk by chunk, so one item can match a query
//! several times. Only the best-scoring chunk per owner is kept, with a count
//! of how many of its chunks matched.

use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use sift_core::{EmbeddingMatch, OwnerType};

/// The best chunk hit for one owner.
#[derive(Debug, Clone)]
pub struct OwnerHit {
    pub best: EmbeddingMatch,
    /// How many chunks of this owner matched.
    pub chunks_matched: usize,
}

impl OwnerHit {
    pub fn owner(&self) -> (OwnerType, Uuid) {
        (self.best.embedding.owner_type, self.best.embedding.owner_id)
    }

    pub fn score(&self) -> f32 {
        self.best.score
    }
}

/// Ranking used for hits: score descending, then newer first, then owner id.
pub fn rank(a: &EmbeddingMatch, b: &EmbeddingMatch) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.embedding.created_at.cmp(&a.embedding.created_at))
        .then_with(|| a.embedding.owner_id.cmp(&b.embedding.owner_id))
        .then_with(|| a.embedding.chunk_index.cmp(&b.embedding.chunk_index))
}

/// Group matches by owner, keeping the best chunk of each, re-sorted by [`rank`].
pub fn collapse_by_owner(matches: Vec<EmbeddingMatch>) -> Vec<OwnerHit> {
    let mut groups: HashMap<(OwnerType, Uuid), OwnerHit> = HashMap::new();
    for m in matches {
        let key = (m.embedding.owner_type, m.embedding.owner_id);
        match groups.get_mut(&key) {
            Some(group) => {
                group.chunks_matched += 1;
                if rank(&m, &group.best) == Ordering::Less {
                    group.best = m;
                }
            }
            None => {
                groups.insert(
                    key,
                    OwnerHit {
                        best: m,
                        chunks_matched: 1,
                    },
                );
            }
        }
    }

    let mut hits: Vec<OwnerHit> = groups.into_values().collect();
    hits.sort_by(|a, b| rank(&a.best, &b.best));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sift_core::{Embedding, Vector};

    fn hit(owner: u128, chunk: i32, score: f32, age_days: i64) -> EmbeddingMatch {
        EmbeddingMatch {
            embedding: Embedding {
                id: Uuid::new_v4(),
                organization_id: Uuid::nil(),
                owner_type: OwnerType::TranscriptChunk,
                owner_id: Uuid::from_u128(owner),
                chunk_index: chunk,
                vector: Vector::from(vec![1.0]),
                source_text: format!("chunk {}", chunk),
                source_type: None,
                model: "test".to_string(),
                created_at: Utc::now() - Duration::days(age_days),
            },
            score,
        }
    }

    #[test]
    fn test_keeps_best_chunk_per_owner() {
        let hits = collapse_by_owner(vec![
            hit(1, 0, 0.6, 0),
            hit(1, 3, 0.9, 0),
            hit(2, 0, 0.8, 0),
            hit(1, 4, 0.7, 0),
        ]);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].owner().1, Uuid::from_u128(1));
        assert_eq!(hits[0].best.embedding.chunk_index, 3);
        assert_eq!(hits[0].chunks_matched, 3);
        assert_eq!(hits[1].chunks_matched, 1);
    }

    #[test]
    fn test_equal_scores_prefer_newer() {
        let hits = collapse_by_owner(vec![hit(1, 0, 0.8, 5), hit(2, 0, 0.8, 1)]);
        assert_eq!(hits[0].owner().1, Uuid::from_u128(2));
    }

    #[test]
    fn test_empty() {
        assert!(collapse_by_owner(vec![]).is_empty());
    }
}
