//! Topic naming prompt.

use serde::Deserialize;

use crate::analysis::extract_json_object;

pub const TOPIC_NAMING_SYSTEM_PROMPT: &str = "You name recurring themes in an organization's \
content. Respond with JSON of the form {\"name\": \"...\"}. The name is 2-5 words in title case.";

/// Longest name accepted from the model.
const MAX_NAME_CHARS: usize = 60;

pub fn topic_naming_prompt(keywords: &[String], sample_titles: &[String]) -> String {
    format!(
        "Keywords: {}\nExample items:\n{}\n\nName the shared theme.",
        keywords.join(", "),
        sample_titles
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

#[derive(Deserialize)]
struct NameResponse {
    name: String,
}

/// Extract a usable topic name, or None when the response is unusable.
pub fn parse_topic_name(raw: &str) -> Option<String> {
    let name = match extract_json_object(raw) {
        Some(json) => serde_json::from_str::<NameResponse>(json).ok()?.name,
        None => raw.lines().next().unwrap_or_default().to_string(),
    };
    let name = name.trim().trim_matches('"').trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    Some(name.to_string())
}
