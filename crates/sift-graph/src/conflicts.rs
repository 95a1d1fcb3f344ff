//! Decision conflict detection.
//!
//! Only pairs whose summary embeddings clear the similarity floor are
//! compared. Classification is heuristic and works on the decision text:
//!
//! - the chosen option ("use X", "switch to X", "adopt X", ...)
//! - the scope it applies to ("... for storage", "... as our queue")
//! - negation ("will not use X")
//! - explicit replacement markers ("instead of", "replacing", "supersedes")
//!
//! Results are informational and recomputed on every call.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use sift_core::{
    cosine_similarity, defaults, ConflictType, Decision, DecisionConflict, DecisionStatus,
};

use crate::keywords::{jaccard, tokenize};

static CHOICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:use|using|adopt|adopting|choose|chose|chosen|pick|picked|go with|going with|switch to|switching to|move to|moving to|migrate to|migrating to|standardize on|rely on|keep)\s+((?:[\w.+#-]+\s*){1,4})",
    )
    .expect("valid choice regex")
});

static SCOPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:for|as)\s+(?:the\s+|our\s+|a\s+|an\s+|all\s+)?([\w\s-]+)")
        .expect("valid scope regex")
});

static NEGATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:not|never|won't|don't|do not|will not|avoid|against|stop using|drop)\b")
        .expect("valid negation regex")
});

static SUPERSEDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:instead of|in place of|replac\w*|supersed\w*|no longer|revers\w*|revert\w*|overrid\w*)")
        .expect("valid supersede regex")
});

/// Words that end a chosen option.
const CHOICE_STOP: &[&str] = &[
    "for", "as", "to", "in", "on", "with", "instead", "because", "over", "and", "so", "from",
    "by", "going", "moving", "until", "since", "across",
];

const ARTICLES: &[&str] = &["a", "an", "the", "our"];

/// What a decision chooses and for what.
#[derive(Debug, Clone, Default, PartialEq)]
struct Stance {
    choice: Option<String>,
    scope: Vec<String>,
    negated: bool,
    keywords: Vec<String>,
}

fn text_of(decision: &Decision) -> String {
    match &decision.context {
        Some(context) if !context.trim().is_empty() => format!("{} {}", decision.summary, context),
        _ => decision.summary.clone(),
    }
}

fn stance(decision: &Decision) -> Stance {
    let summary = decision.summary.as_str();

    let choice = CHOICE
        .captures(summary)
        .and_then(|c| c.get(1))
        .and_then(|m| {
            let words: Vec<String> = m
                .as_str()
                .split_whitespace()
                .map(|w| w.trim_matches(|c: char| c == '.' || c == ',').to_lowercase())
                .skip_while(|w| ARTICLES.contains(&w.as_str()))
                .take_while(|w| !CHOICE_STOP.contains(&w.as_str()))
                .filter(|w| !w.is_empty())
                .collect();
            (!words.is_empty()).then(|| words.join(" "))
        });

    let scope = SCOPE
        .captures(summary)
        .and_then(|c| c.get(1))
        .map(|m| tokenize(m.as_str()).into_iter().take(4).collect())
        .unwrap_or_default();

    let choice_words: Vec<String> = choice
        .as_deref()
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let keywords = tokenize(summary)
        .into_iter()
        .filter(|w| !choice_words.contains(w))
        .collect();

    Stance {
        choice,
        scope,
        negated: NEGATION.is_match(summary),
        keywords,
    }
}

/// Scope overlap of two stances: explicit scopes when both have one,
/// otherwise the non-choice keywords.
fn scope_overlap(a: &Stance, b: &Stance) -> f32 {
    if !a.scope.is_empty() && !b.scope.is_empty() {
        jaccard(&a.scope, &b.scope)
    } else {
        jaccard(&a.keywords, &b.keywords)
    }
}

/// True when `later` explicitly replaces `earlier`.
fn supersedes(earlier: &Decision, earlier_stance: &Stance, later: &Decision) -> bool {
    let later_text = text_of(later).to_lowercase();
    if !SUPERSEDE.is_match(&later_text) {
        return false;
    }
    match &earlier_stance.choice {
        Some(choice) => later_text.contains(choice.as_str()),
        None => {
            let earlier_words = tokenize(&earlier.summary);
            let later_words = tokenize(&later_text);
            jaccard(&earlier_words, &later_words) >= 0.5
        }
    }
}

/// Pairwise conflict detector.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    similarity_floor: f32,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(defaults::CONFLICT_SIMILARITY_FLOOR)
    }
}

impl ConflictDetector {
    pub fn new(similarity_floor: f32) -> Self {
        Self { similarity_floor }
    }

    pub fn similarity_floor(&self) -> f32 {
        self.similarity_floor
    }

    /// Compare every pair of decisions with a summary vector.
    ///
    /// Decisions are ordered by effective time, then id; `decision_a` of each
    /// conflict is the earlier one. Output order follows that pair order.
    pub fn detect(
        &self,
        decisions: &[Decision],
        vectors: &HashMap<Uuid, Vec<f32>>,
    ) -> Vec<DecisionConflict> {
        let mut ordered: Vec<&Decision> = decisions
            .iter()
            .filter(|d| vectors.contains_key(&d.id))
            .collect();
        ordered.sort_by(|a, b| a.effective_at().cmp(&b.effective_at()).then(a.id.cmp(&b.id)));
        let stances: Vec<Stance> = ordered.iter().map(|d| stance(d)).collect();

        let mut conflicts = Vec::new();
        for i in 0..ordered.len() {
            for j in (i + 1)..ordered.len() {
                let (a, b) = (ordered[i], ordered[j]);
                let (Some(va), Some(vb)) = (vectors.get(&a.id), vectors.get(&b.id)) else {
                    continue;
                };
                let similarity = cosine_similarity(va, vb);
                if similarity < self.similarity_floor {
                    continue;
                }
                if let Some(conflict) = self.classify(a, &stances[i], b, &stances[j], similarity) {
                    conflicts.push(conflict);
                }
            }
        }
        conflicts
    }

    fn classify(
        &self,
        a: &Decision,
        sa: &Stance,
        b: &Decision,
        sb: &Stance,
        similarity: f32,
    ) -> Option<DecisionConflict> {
        if matches!(a.status, DecisionStatus::Superseded | DecisionStatus::Reverted)
            || supersedes(a, sa, b)
        {
            return None;
        }

        // How far above the floor the pair sits, in [0, 1].
        let strength = if self.similarity_floor < 1.0 {
            ((similarity - self.similarity_floor) / (1.0 - self.similarity_floor)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let overlap = scope_overlap(sa, sb);

        let (conflict_type, confidence, explanation) = match (&sa.choice, &sb.choice) {
            (Some(ca), Some(cb)) if ca != cb && overlap > 0.0 && !sa.negated && !sb.negated => (
                ConflictType::DirectContradiction,
                0.55 + 0.25 * strength + 0.2 * overlap,
                format!(
                    "Chose \"{}\" and later \"{}\" for the same purpose without recording a change.",
                    ca, cb
                ),
            ),
            (Some(ca), Some(cb)) if ca == cb && sa.negated != sb.negated => (
                ConflictType::DirectContradiction,
                0.55 + 0.25 * strength + 0.2 * overlap,
                format!("One decision adopts \"{}\" and the other rejects it.", ca),
            ),
            _ if overlap >= 0.5 && b.status == DecisionStatus::Decided => (
                ConflictType::SupersessionUnclear,
                0.35 + 0.25 * strength + 0.15 * overlap,
                "A later decision covers the same scope but does not say whether it replaces the earlier one."
                    .to_string(),
            ),
            _ => (
                ConflictType::ScopeOverlap,
                0.15 + 0.25 * strength + 0.1 * overlap,
                "Both decisions address closely related scope.".to_string(),
            ),
        };

        Some(DecisionConflict {
            decision_a: a.id,
            decision_b: b.id,
            conflict_type,
            confidence: confidence.clamp(0.0, 1.0),
            similarity,
            explanation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn decision(n: u128, summary: &str, days_ago: i64) -> Decision {
        let at = Utc::now() - Duration::days(days_ago);
        Decision {
            id: Uuid::from_u128(n),
            organization_id: Uuid::nil(),
            content_item_id: None,
            summary: summary.to_string(),
            context: None,
            status: DecisionStatus::Decided,
            decided_at: Some(at),
            tags: vec![],
            created_at: at,
        }
    }

    fn vectors(pairs: &[(u128, Vec<f32>)]) -> HashMap<Uuid, Vec<f32>> {
        pairs
            .iter()
            .map(|(n, v)| (Uuid::from_u128(*n), v.clone()))
            .collect()
    }

    #[test]
    fn test_stance_extraction() {
        let s = stance(&decision(1, "We decided to use Postgres for storage", 0));
        assert_eq!(s.choice.as_deref(), Some("postgres"));
        assert_eq!(s.scope, vec!["storage"]);
        assert!(!s.negated);

        let s = stance(&decision(2, "We will not switch to the new CI runner.", 0));
        assert_eq!(s.choice.as_deref(), Some("new ci runner"));
        assert!(s.negated);
    }

    #[test]
    fn test_different_choice_same_scope_is_contradiction() {
        // d2 is listed first to show ordering comes from time, not input.
        let d1 = decision(1, "We decided to use Postgres for storage", 10);
        let d2 = decision(2, "We will use MongoDB for storage", 2);
        let v = vectors(&[(1, vec![1.0, 0.2]), (2, vec![1.0, 0.25])]);

        let conflicts = ConflictDetector::default().detect(&[d2, d1], &v);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.conflict_type, ConflictType::DirectContradiction);
        assert_eq!(c.decision_a, Uuid::from_u128(1));
        assert_eq!(c.decision_b, Uuid::from_u128(2));
        assert!(c.confidence > 0.5);
    }

    #[test]
    fn test_below_floor_not_compared() {
        let d1 = decision(1, "Use Postgres for storage", 3);
        let d2 = decision(2, "Use MongoDB for storage", 1);
        let v = vectors(&[(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0])]);
        assert!(ConflictDetector::default().detect(&[d1, d2], &v).is_empty());
    }

    #[test]
    fn test_explicit_replacement_not_reported() {
        let d1 = decision(1, "Use Postgres for storage", 3);
        let d2 = decision(2, "Use MongoDB for storage, replacing Postgres", 1);
        let v = vectors(&[(1, vec![1.0, 0.0]), (2, vec![1.0, 0.0])]);
        assert!(ConflictDetector::default().detect(&[d1, d2], &v).is_empty());
    }

    #[test]
    fn test_negation_of_same_choice() {
        let d1 = decision(1, "Adopt Kubernetes for deployments", 3);
        let d2 = decision(2, "We will not adopt Kubernetes for deployments", 1);
        let v = vectors(&[(1, vec![1.0, 0.0]), (2, vec![1.0, 0.0])]);
        let conflicts = ConflictDetector::default().detect(&[d1, d2], &v);
        assert_eq!(conflicts[0].conflict_type, ConflictType::DirectContradiction);
    }

    #[test]
    fn test_related_scope_without_choice_is_overlap() {
        let d1 = decision(1, "Quarterly planning happens in the first week", 3);
        let d2 = decision(2, "Roadmap reviews move to monthly cadence", 1);
        let v = vectors(&[(1, vec![1.0, 0.1]), (2, vec![1.0, 0.0])]);
        let conflicts = ConflictDetector::default().detect(&[d1, d2], &v);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::ScopeOverlap);
        assert!(conflicts[0].confidence < 0.5);
    }

    #[test]
    fn test_same_scope_unclear_supersession() {
        let d1 = decision(1, "Release notes are written by the product team for customers", 3);
        let d2 = decision(2, "Release notes are written by engineering for customers", 1);
        let v = vectors(&[(1, vec![1.0, 0.0]), (2, vec![1.0, 0.05])]);
        let conflicts = ConflictDetector::default().detect(&[d1, d2], &v);
        assert_eq!(conflicts[0].conflict_type, ConflictType::SupersessionUnclear);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let ds = vec![
            decision(1, "Use Postgres for storage", 5),
            decision(2, "Use MongoDB for storage", 3),
            decision(3, "Use DynamoDB for storage", 1),
        ];
        let v = vectors(&[(1, vec![1.0, 0.0]), (2, vec![1.0, 0.01]), (3, vec![1.0, 0.02])]);
        let detector = ConflictDetector::default();
        let first = detector.detect(&ds, &v);
        let mut shuffled = ds.clone();
        shuffled.rotate_left(1);
        assert_eq!(first, detector.detect(&shuffled, &v));
        assert_eq!(first.len(), 3);
    }
}
