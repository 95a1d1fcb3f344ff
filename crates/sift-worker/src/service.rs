//! The outbound API of a sift deployment.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use sift_core::{
    defaults, ActionItem, ActionItemRepository, ActionItemUpdate, ContentItem,
    ContentItemRepository, DecisionConflict, EmbeddingBackend, EventBus, EventEnvelope,
    GenerationBackend, OrgSettings, OrgSettingsRepository, RawContentItem, Result, SourceType,
    StatusView, Topic, TriggerOutcome,
};
use sift_db::{Database, Stores};
use sift_graph::{GenerationTopicNamer, KnowledgeGraphBuilder, RebuildSummary};
use sift_inference::{
    DiarizationBackend, HttpDiarizationBackend, HttpMediaFetcher, MediaFetcher, OllamaBackend,
    TranscriptionBackend, WhisperBackend,
};
use sift_jobs::{
    AnalysisExecutor, DiarizationExecutor, EmbeddingExecutor, Orchestrator, PipelineStages,
    ProcessContentHandler, RebuildGraphHandler, SourceRegistry, TranscriptionExecutor,
    WorkerBuilder, WorkerHandle,
};
use sift_search::{SearchFilters, SearchHit, SemanticSearch, SemanticSearchEngine};

use crate::config::SiftConfig;

/// Model backends the pipeline calls out to.
#[derive(Clone)]
pub struct Backends {
    pub embedding: Arc<dyn EmbeddingBackend>,
    pub generation: Arc<dyn GenerationBackend>,
    /// Without one, media items fail at transcription.
    pub transcription: Option<Arc<dyn TranscriptionBackend>>,
    /// Without one, diarization is skipped.
    pub diarization: Option<Arc<dyn DiarizationBackend>>,
    pub media: Arc<dyn MediaFetcher>,
}

impl Backends {
    /// Ollama for embeddings and generation, Whisper and the diarization
    /// service when their URLs are set.
    pub fn from_env() -> Self {
        let ollama = Arc::new(OllamaBackend::from_env());
        let transcription = WhisperBackend::from_env()
            .map(|w| Arc::new(w) as Arc<dyn TranscriptionBackend>);
        let diarization = HttpDiarizationBackend::from_env()
            .map(|d| Arc::new(d) as Arc<dyn DiarizationBackend>);
        if transcription.is_none() {
            warn!("WHISPER_BASE_URL not set, media items cannot be transcribed");
        }
        Self {
            embedding: ollama.clone(),
            generation: ollama,
            transcription,
            diarization,
            media: Arc::new(HttpMediaFetcher::new()),
        }
    }
}

/// Entry point for callers: ingestion, run control, search and the
/// knowledge graph over one set of stores.
#[derive(Clone)]
pub struct SiftService {
    stores: Stores,
    orchestrator: Arc<Orchestrator>,
    search: Arc<dyn SemanticSearch>,
    graph: Arc<KnowledgeGraphBuilder>,
    events: Arc<EventBus>,
    config: SiftConfig,
}

impl SiftService {
    pub fn new(stores: Stores, backends: Backends, config: SiftConfig) -> Self {
        Self::with_sources(stores, backends, config, SourceRegistry::new())
    }

    pub fn with_sources(
        stores: Stores,
        backends: Backends,
        config: SiftConfig,
        sources: SourceRegistry,
    ) -> Self {
        let events = Arc::new(EventBus::new(defaults::EVENT_BUS_CAPACITY));

        let mut stages = PipelineStages::new(
            Arc::new(EmbeddingExecutor::new(backends.embedding.clone())),
            Arc::new(AnalysisExecutor::new(backends.generation.clone())),
        );
        if let Some(transcription) = backends.transcription {
            stages = stages.with_transcription(Arc::new(TranscriptionExecutor::new(
                backends.media.clone(),
                transcription,
            )));
        }
        if let Some(diarization) = backends.diarization {
            stages = stages.with_diarization(Arc::new(DiarizationExecutor::new(
                backends.media.clone(),
                diarization,
                stores.settings.clone(),
            )));
        }

        let orchestrator = Arc::new(
            Orchestrator::new(&stores, stages)
                .with_events(events.clone())
                .with_retry_policy(config.retry.clone())
                .with_sources(sources),
        );
        let search = Arc::new(SemanticSearchEngine::new(
            backends.embedding,
            stores.embeddings.clone(),
            stores.items.clone(),
            stores.decisions.clone(),
        ));
        let graph = Arc::new(
            KnowledgeGraphBuilder::new(
                stores.items.clone(),
                stores.embeddings.clone(),
                stores.topics.clone(),
                stores.decisions.clone(),
            )
            .with_namer(Arc::new(GenerationTopicNamer::new(backends.generation)))
            .with_events(events.clone())
            .with_config(config.graph.clone()),
        );

        Self {
            stores,
            orchestrator,
            search,
            graph,
            events,
            config,
        }
    }

    /// Connect to Postgres (running migrations) or fall back to memory.
    pub async fn connect(backends: Backends, config: SiftConfig) -> Result<Self> {
        let stores = match &config.database_url {
            Some(url) => {
                info!("Connecting to database...");
                let db = Database::connect_with_config(url, config.pool.clone()).await?;
                info!("Running database migrations...");
                db.migrate().await?;
                Stores::from_database(&db)
            }
            None => {
                warn!("No DATABASE_URL configured, using the in-memory store");
                Stores::in_memory()
            }
        };
        Ok(Self::new(stores, backends, config))
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Subscribe to item, job and graph events.
    pub fn events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Start the job worker with the pipeline and graph handlers.
    pub async fn start_worker(&self) -> WorkerHandle {
        WorkerBuilder::from_stores(&self.stores)
            .with_config(self.config.worker.clone())
            .with_events(self.events.clone())
            .with_handler(Arc::new(ProcessContentHandler::new(
                self.orchestrator.clone(),
            )))
            .with_handler(Arc::new(RebuildGraphHandler::new(self.graph.clone())))
            .build()
            .await
            .start()
    }

    // =========================================================================
    // INGESTION AND RUN CONTROL
    // =========================================================================

    pub async fn ingest(&self, raw: RawContentItem) -> Result<ContentItem> {
        self.orchestrator.ingest(raw).await
    }

    pub async fn ingest_from_source(
        &self,
        source_type: SourceType,
        external_id: &str,
    ) -> Result<ContentItem> {
        self.orchestrator
            .ingest_from_source(source_type, external_id)
            .await
    }

    /// Start processing an item. Repeated calls while a run is in flight are no-ops.
    pub async fn trigger_processing(&self, item_id: Uuid) -> Result<TriggerOutcome> {
        self.orchestrator.trigger(item_id).await
    }

    pub async fn trigger_processing_many(
        &self,
        item_ids: &[Uuid],
    ) -> Vec<(Uuid, Result<TriggerOutcome>)> {
        self.orchestrator.trigger_many(item_ids).await
    }

    pub async fn get_processing_status(&self, item_id: Uuid) -> Result<StatusView> {
        self.orchestrator.get_status(item_id).await
    }

    pub async fn retry(&self, item_id: Uuid) -> Result<TriggerOutcome> {
        self.orchestrator.retry(item_id).await
    }

    pub async fn reprocess(&self, item_id: Uuid) -> Result<TriggerOutcome> {
        self.orchestrator.reprocess(item_id).await
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub async fn semantic_search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>> {
        self.search.search(query, filters).await
    }

    pub async fn list_topics(&self, organization_id: Uuid) -> Result<Vec<Topic>> {
        self.graph.list_topics(organization_id).await
    }

    /// Compare the organization's decisions; recomputed on every call.
    pub async fn detect_conflicts(&self, organization_id: Uuid) -> Result<Vec<DecisionConflict>> {
        self.graph.detect_conflicts(organization_id).await
    }

    pub async fn list_action_items(&self, item_id: Uuid) -> Result<Vec<ActionItem>> {
        self.stores.action_items.list_for_item(item_id).await
    }

    /// Apply a user edit. Edited fields survive later re-analysis.
    pub async fn update_action_item(
        &self,
        action_item_id: Uuid,
        update: &ActionItemUpdate,
    ) -> Result<ActionItem> {
        self.stores
            .action_items
            .update_by_user(action_item_id, update)
            .await
    }

    pub async fn update_org_settings(&self, settings: &OrgSettings) -> Result<()> {
        self.stores.settings.upsert(settings).await
    }

    // =========================================================================
    // KNOWLEDGE GRAPH
    // =========================================================================

    /// Recluster the organization's topics now.
    pub async fn rebuild_knowledge_graph(&self, organization_id: Uuid) -> Result<RebuildSummary> {
        self.graph.rebuild_topics(organization_id).await
    }

    /// Queue a rebuild for the worker.
    pub async fn schedule_knowledge_graph_rebuild(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Uuid>> {
        self.orchestrator
            .schedule_graph_rebuild(organization_id)
            .await
    }

    /// Queue a rebuild for every organization with content. Returns how many were queued.
    #[instrument(skip(self), fields(subsystem = "graph", component = "scheduler"))]
    pub async fn schedule_all_graph_rebuilds(&self) -> Result<usize> {
        let organizations = self.stores.items.list_organization_ids().await?;
        let mut queued = 0;
        for organization_id in organizations {
            match self.schedule_knowledge_graph_rebuild(organization_id).await {
                Ok(Some(_)) => queued += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(%organization_id, error = %e, "Failed to queue graph rebuild")
                }
            }
        }
        info!(queued, "Scheduled graph rebuilds");
        Ok(queued)
    }
}
