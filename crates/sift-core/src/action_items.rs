//! Merging re-extracted action items into stored ones.
//!
//! Analysis can run many times for the same content item. Rows are matched
//! on their natural key so that user edits (status, assignee) survive.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ActionItem, ExtractedActionItem};

/// Writes needed to bring stored action items in line with a new extraction.
#[derive(Debug, Clone, Default)]
pub struct ActionItemMerge {
    pub content_item_id: Uuid,
    /// Rows to insert or update, keyed by id.
    pub upserts: Vec<ActionItem>,
    /// Rows to delete.
    pub deletes: Vec<Uuid>,
}

impl ActionItemMerge {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Plan the merge of `extracted` into `existing`.
///
/// - a matching natural key refreshes AI fields and keeps user-modified ones
/// - unmatched extractions become new rows
/// - stored rows no longer extracted are deleted unless a user touched them
///
/// Duplicate natural keys within one extraction collapse to the first.
pub fn plan_merge(
    content_item_id: Uuid,
    organization_id: Uuid,
    existing: &[ActionItem],
    extracted: &[ExtractedActionItem],
    now: DateTime<Utc>,
) -> ActionItemMerge {
    let mut by_key: HashMap<&str, &ActionItem> = existing
        .iter()
        .map(|item| (item.natural_key.as_str(), item))
        .collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut upserts = Vec::new();

    for candidate in extracted {
        if candidate.title.trim().is_empty() {
            continue;
        }
        let key = ActionItem::natural_key(&candidate.title, candidate.timestamp_start);
        if !seen.insert(key.clone()) {
            continue;
        }
        match by_key.remove(key.as_str()) {
            Some(stored) => {
                let mut updated = stored.clone();
                updated.merge_extracted(candidate, now);
                upserts.push(updated);
            }
            None => upserts.push(ActionItem::from_extracted(
                candidate,
                content_item_id,
                organization_id,
                now,
            )),
        }
    }

    let mut deletes: Vec<Uuid> = by_key
        .into_values()
        .filter(|item| item.user_modified_fields.is_empty())
        .map(|item| item.id)
        .collect();
    deletes.sort();

    ActionItemMerge {
        content_item_id,
        upserts,
        deletes,
    }
}
