use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::db::MetaStore;
use crate::events::EventBus;
use crate::gateway::ModelGateway;
use crate::pipeline::{ChunkPipeline, TagPipeline};
use crate::retrieval::Retriever;
use crate::services::{ChatService, SessionService};
use crate::vector::VectorStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn MetaStore>,
    pub vectors: VectorStore,
    pub gateway: ModelGateway,
    pub events: EventBus,
    pub retriever: Arc<Retriever>,
    pub chat: ChatService,
    pub sessions: SessionService,
    pub tagging: Arc<TagPipeline>,
    pub chunking: Arc<ChunkPipeline>,
    /// Memoized `/config/all` and folder-hierarchy payloads.
    pub config_cache: Arc<TtlCache<String, serde_json::Value>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn MetaStore>,
        vectors: VectorStore,
        gateway: ModelGateway,
        events: EventBus,
    ) -> Self {
        let config = Arc::new(config);
        let retriever = Arc::new(Retriever::new(
            store.clone(),
            vectors.clone(),
            gateway.clone(),
            events.clone(),
            &config,
        ));
        let chat = ChatService::new(store.clone(), gateway.clone(), retriever.clone());
        let sessions = SessionService::new(store.clone(), gateway.clone());
        let tagging = Arc::new(TagPipeline::new(
            store.clone(),
            gateway.clone(),
            events.clone(),
            &config,
        ));
        let chunking = Arc::new(ChunkPipeline::new(
            store.clone(),
            vectors.clone(),
            gateway.clone(),
            events.clone(),
            &config,
        ));
        let config_cache = Arc::new(TtlCache::new(
            16,
            Duration::from_secs(config.cache.config_ttl_secs),
        ));

        Self {
            config,
            store,
            vectors,
            gateway,
            events,
            retriever,
            chat,
            sessions,
            tagging,
            chunking,
            config_cache,
        }
    }
}
