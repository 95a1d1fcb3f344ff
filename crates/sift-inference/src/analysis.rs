//! Prompt and response handling for content analysis.
//!
//! The model is asked for one JSON object. Parsing is lenient about the
//! wrapping (code fences, leading prose) and about unknown enum values, but
//! a response without a JSON object is an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use sift_core::{
    ActionPriority, AnalysisOutput, Chapter, DecisionStatus, Error, ExtractedActionItem,
    ExtractedDecision, Result, SourceType, TranscriptSegment,
};

/// Tags kept per item.
const MAX_TAGS: usize = 10;

pub const ANALYSIS_SYSTEM_PROMPT: &str = "You analyze workplace content such as meeting \
recordings, chat threads, wiki pages and code reviews. Respond with a single JSON object and \
nothing else. Only report action items and decisions that are stated in the content.";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid code fence regex")
});

/// Build the analysis prompt for an item.
///
/// When timed segments are available the transcript is rendered line by line
/// with `[mm:ss]` stamps so the model can place chapters and action items.
pub fn analysis_prompt(
    title: &str,
    source_type: SourceType,
    transcript: &str,
    segments: Option<&[TranscriptSegment]>,
    max_chars: usize,
) -> String {
    let body = match segments {
        Some(segments) if !segments.is_empty() => segments
            .iter()
            .map(|s| match &s.speaker {
                Some(speaker) => format!("[{}] {}: {}", clock(s.start_secs), speaker, s.text),
                None => format!("[{}] {}", clock(s.start_secs), s.text),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => transcript.to_string(),
    };
    let body = truncate_chars(&body, max_chars);

    format!(
        "Title: {title}\nSource: {source}\n\nContent:\n{body}\n\n\
Return JSON with these fields:\n\
- \"summary\": 2-4 sentence summary\n\
- \"tags\": up to {MAX_TAGS} short lowercase topic tags\n\
- \"action_items\": [{{\"title\", \"assignee\" (or null), \"priority\" (low|medium|high|urgent), \
\"due_date\" (or null), \"timestamp_start\" (seconds or null), \"confidence\" (0-1)}}]\n\
- \"chapters\": [{{\"title\", \"start_secs\", \"end_secs\", \"summary\"}}] (empty for untimed content)\n\
- \"decisions\": [{{\"summary\", \"context\", \"status\" (proposed|decided|superseded|reverted), \"tags\"}}]",
        source = source_type.as_str(),
    )
}

fn clock(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => format!("{}\n[truncated]", &text[..byte]),
        None => text.to_string(),
    }
}

/// Extract the JSON object from a model response.
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let inner = CODE_FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);
    let start = inner.find('{')?;
    let end = inner.rfind('}')?;
    (end > start).then(|| &inner[start..=end])
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawAnalysis {
    summary: String,
    tags: Vec<String>,
    action_items: Vec<RawActionItem>,
    chapters: Vec<RawChapter>,
    decisions: Vec<RawDecision>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawActionItem {
    title: String,
    assignee: Option<String>,
    priority: Option<String>,
    due_date: Option<String>,
    timestamp_start: Option<f64>,
    confidence: Option<f32>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawChapter {
    title: String,
    start_secs: Option<f64>,
    end_secs: Option<f64>,
    summary: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawDecision {
    summary: String,
    context: Option<String>,
    status: Option<String>,
    tags: Vec<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

/// Parse a model response into an [`AnalysisOutput`].
///
/// Malformed output is reported as transient: a second generation usually
/// produces valid JSON.
pub fn parse_analysis_response(raw: &str) -> Result<AnalysisOutput> {
    let json = extract_json_object(raw)
        .ok_or_else(|| Error::Transient("analysis response contained no JSON object".into()))?;
    let parsed: RawAnalysis = serde_json::from_str(json)
        .map_err(|e| Error::Transient(format!("malformed analysis JSON: {}", e)))?;

    let action_items = parsed
        .action_items
        .into_iter()
        .filter(|a| !a.title.trim().is_empty())
        .map(|a| ExtractedActionItem {
            title: a.title.trim().to_string(),
            assignee: clean(a.assignee),
            priority: a
                .priority
                .and_then(|p| p.trim().to_lowercase().parse::<ActionPriority>().ok()),
            due_date: clean(a.due_date),
            timestamp_start: a.timestamp_start.filter(|t| t.is_finite() && *t >= 0.0),
            confidence: a.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        })
        .collect();

    let chapters = parsed
        .chapters
        .into_iter()
        .filter(|c| !c.title.trim().is_empty())
        .map(|c| Chapter {
            title: c.title.trim().to_string(),
            start_secs: c.start_secs.unwrap_or(0.0).max(0.0),
            end_secs: c.end_secs,
            summary: clean(c.summary),
        })
        .collect();

    let decisions = parsed
        .decisions
        .into_iter()
        .filter(|d| !d.summary.trim().is_empty())
        .map(|d| ExtractedDecision {
            summary: d.summary.trim().to_string(),
            context: clean(d.context),
            status: d
                .status
                .and_then(|s| s.trim().to_lowercase().parse::<DecisionStatus>().ok()),
            tags: clean_tags(d.tags),
        })
        .collect();

    Ok(AnalysisOutput {
        summary: parsed.summary.trim().to_string(),
        tags: clean_tags(parsed.tags),
        action_items,
        chapters,
        decisions,
    })
}
