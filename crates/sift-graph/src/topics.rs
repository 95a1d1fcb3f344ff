//! Topic naming, matching and trend scoring.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use sift_core::{defaults, normalize_name, Error, GenerationBackend, Result, Topic, TopicTrend};
use sift_inference::{parse_topic_name, topic_naming_prompt, TOPIC_NAMING_SYSTEM_PROMPT};

use crate::keywords::jaccard;

/// Names a cluster from its keywords and a few member titles.
#[async_trait]
pub trait TopicNamer: Send + Sync {
    async fn name(&self, keywords: &[String], sample_titles: &[String]) -> Result<String>;
}

/// [`TopicNamer`] backed by a generation model.
pub struct GenerationTopicNamer {
    backend: Arc<dyn GenerationBackend>,
}

impl GenerationTopicNamer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TopicNamer for GenerationTopicNamer {
    async fn name(&self, keywords: &[String], sample_titles: &[String]) -> Result<String> {
        let prompt = topic_naming_prompt(keywords, sample_titles);
        let raw = self
            .backend
            .generate_json(TOPIC_NAMING_SYSTEM_PROMPT, &prompt)
            .await?;
        parse_topic_name(&raw)
            .ok_or_else(|| Error::Inference(format!("unusable topic name: {}", raw.trim())))
    }
}

/// Trend from item creation times: the last window against the one before.
///
/// The score is `(recent - previous) / (recent + previous)`, in [-1, 1].
pub fn compute_trend(created: &[DateTime<Utc>], now: DateTime<Utc>) -> (TopicTrend, f32) {
    let window = Duration::days(defaults::TREND_WINDOW_DAYS);
    let recent_start = now - window;
    let previous_start = recent_start - window;

    let recent = created.iter().filter(|t| **t > recent_start && **t <= now).count();
    let previous = created
        .iter()
        .filter(|t| **t > previous_start && **t <= recent_start)
        .count();

    let total = recent + previous;
    if total == 0 {
        return (TopicTrend::Stable, 0.0);
    }
    let score = (recent as f32 - previous as f32) / total as f32;
    let trend = if score > 0.2 {
        TopicTrend::Rising
    } else if score < -0.2 {
        TopicTrend::Declining
    } else {
        TopicTrend::Stable
    };
    (trend, score)
}

/// Find the existing topic a cluster continues.
///
/// An exact normalized-name match wins. Otherwise the topic with the highest
/// keyword overlap at or above `min_overlap`, ties going to the older topic.
/// Topics listed in `claimed` are skipped.
pub fn match_topic<'a>(
    candidate_name: &str,
    keywords: &[String],
    existing: &'a [Topic],
    claimed: &[Uuid],
    min_overlap: f32,
) -> Option<&'a Topic> {
    let normalized = normalize_name(candidate_name);
    let open = existing.iter().filter(|t| !claimed.contains(&t.id));

    if let Some(topic) = open.clone().find(|t| t.normalized_name == normalized) {
        return Some(topic);
    }

    open.map(|t| (t, jaccard(keywords, &t.keywords)))
        .filter(|(_, overlap)| *overlap >= min_overlap)
        .max_by(|(ta, a), (tb, b)| {
            a.total_cmp(b)
                .then_with(|| tb.created_at.cmp(&ta.created_at))
                .then_with(|| tb.id.cmp(&ta.id))
        })
        .map(|(t, _)| t)
}
