//! Content source adapters.
//!
//! Connected systems are opaque producers of [`RawContentItem`]s. The
//! registry maps each source type to the adapter that can pull items of
//! that type by their external identifier.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use sift_core::{ContentSource, Error, RawContentItem, Result, SourceType};

/// Maps source types to their adapters.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<SourceType, Arc<dyn ContentSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for its source type.
    pub fn register(&mut self, source: Arc<dyn ContentSource>) {
        self.sources.insert(source.source_type(), source);
    }

    pub fn with_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, source_type: SourceType) -> Result<Arc<dyn ContentSource>> {
        self.sources
            .get(&source_type)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no content source registered for {}", source_type)))
    }

    /// Registered source types, sorted by wire name.
    pub fn source_types(&self) -> Vec<SourceType> {
        let mut types: Vec<SourceType> = self.sources.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

/// Source for items handed over directly, such as completed uploads or
/// webhook deliveries staged under an external id until ingested.
pub struct StagedSource {
    source_type: SourceType,
    staged: RwLock<HashMap<String, RawContentItem>>,
}

impl StagedSource {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            staged: RwLock::new(HashMap::new()),
        }
    }

    /// Stage `item` under `external_id`.
    pub async fn stage(&self, external_id: impl Into<String>, item: RawContentItem) -> Result<()> {
        if item.source_type != self.source_type {
            return Err(Error::InvalidInput(format!(
                "{} item staged on {} source",
                item.source_type, self.source_type
            )));
        }
        self.staged.write().await.insert(external_id.into(), item);
        Ok(())
    }
}

#[async_trait]
impl ContentSource for StagedSource {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn fetch_raw_item(&self, external_id: &str) -> Result<RawContentItem> {
        self.staged
            .read()
            .await
            .get(external_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} item {}", self.source_type, external_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::RawBody;
    use uuid::Uuid;

    fn raw(source_type: SourceType) -> RawContentItem {
        RawContentItem {
            organization_id: Uuid::new_v4(),
            source_type,
            title: "Thread".to_string(),
            body: RawBody::Text("hi".to_string()),
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let chat = Arc::new(StagedSource::new(SourceType::ChatThread));
        chat.stage("C1/123", raw(SourceType::ChatThread)).await.unwrap();
        let registry = SourceRegistry::new().with_source(chat);

        let source = registry.get(SourceType::ChatThread).unwrap();
        assert_eq!(source.fetch_raw_item("C1/123").await.unwrap().title, "Thread");
        assert!(matches!(
            source.fetch_raw_item("missing").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(registry.get(SourceType::WikiPage), Err(Error::Config(_))));
        assert_eq!(registry.source_types(), vec![SourceType::ChatThread]);
    }

    #[tokio::test]
    async fn test_stage_rejects_wrong_source_type() {
        let wiki = StagedSource::new(SourceType::WikiPage);
        assert!(wiki.stage("p1", raw(SourceType::Video)).await.is_err());
    }
}
