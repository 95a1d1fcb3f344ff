//! Keyword extraction and set overlap.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as", "at",
        "be", "because", "been", "before", "being", "both", "but", "by", "can", "could", "did",
        "do", "does", "doing", "don", "down", "during", "each", "few", "for", "from", "get",
        "got", "had", "has", "have", "having", "he", "her", "here", "him", "his", "how", "i",
        "if", "in", "into", "is", "it", "its", "just", "let", "like", "me", "more", "most", "my",
        "need", "no", "nor", "not", "now", "of", "off", "ok", "okay", "on", "once", "only", "or",
        "other", "our", "out", "over", "own", "really", "same", "she", "should", "so", "some",
        "such", "than", "that", "the", "their", "them", "then", "there", "these", "they",
        "thing", "things", "think", "this", "those", "through", "to", "too", "under", "until",
        "up", "us", "very", "was", "we", "were", "what", "when", "where", "which", "while",
        "who", "why", "will", "with", "would", "yeah", "yes", "you", "your", "going", "want",
        "know", "right", "well", "one", "two", "new", "use", "used", "using", "make", "made",
        "decided", "decide", "discussed", "meeting", "team",
    ]
    .into_iter()
    .collect()
});

/// Lowercased content words of `text`, in order, stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .map(|w| w.trim_matches(|c| c == '+' || c == '#').to_lowercase())
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w.as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// The `limit` most frequent content words across `texts`.
///
/// Ties break alphabetically so the result is stable across runs.
pub fn top_keywords<'a, I>(texts: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in tokenize(text) {
            *counts.entry(word).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

/// Title-cased name from the leading keywords.
pub fn keyword_name(keywords: &[String]) -> String {
    let name = keywords
        .iter()
        .take(3)
        .map(|k| {
            let mut chars = k.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        "Untitled Topic".to_string()
    } else {
        name
    }
}

/// Jaccard similarity of two word sets.
pub fn jaccard<S: AsRef<str>>(a: &[S], b: &[S]) -> f32 {
    let set_a: HashSet<&str> = a.iter().map(|s| s.as_ref()).collect();
    let set_b: HashSet<&str> = b.iter().map(|s| s.as_ref()).collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f32 / union as f32
}
