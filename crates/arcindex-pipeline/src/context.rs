//! Shared handles passed to every pipeline component.

use std::sync::Arc;

use arcindex_core::document::RecordKind;
use arcindex_core::error::IndexerError;
use arcindex_core::indexer::IndexerConfig;
use arcindex_core::store::{DocumentStore, IndexNames, Query};
use arcindex_core::{NodeClient, ResolutionCache};

/// Node, store, cache, index names, and configuration of one indexer run.
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct PipelineContext {
    pub node: Arc<dyn NodeClient>,
    pub store: Arc<dyn DocumentStore>,
    pub cache: Arc<ResolutionCache>,
    pub names: Arc<IndexNames>,
    pub config: Arc<IndexerConfig>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("cache", &self.cache)
            .field("names", &self.names)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    pub fn new(
        node: Arc<dyn NodeClient>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<ResolutionCache>,
        names: IndexNames,
        config: IndexerConfig,
    ) -> Self {
        Self {
            node,
            store,
            cache,
            names: Arc::new(names),
            config: Arc::new(config),
        }
    }

    /// Same collaborators, different target indices.
    pub fn with_names(&self, names: IndexNames) -> Self {
        Self {
            names: Arc::new(names),
            ..self.clone()
        }
    }

    pub fn index(&self, kind: RecordKind) -> &str {
        self.names.index(kind)
    }

    /// Highest block height present in the block index.
    pub async fn best_stored_height(&self) -> Result<Option<u64>, IndexerError> {
        let best = self
            .store
            .select_one(
                self.index(RecordKind::Block),
                &Query::all().sorted_by("no", false),
            )
            .await?;
        Ok(best.and_then(|doc| doc.u64_field("no")))
    }
}
