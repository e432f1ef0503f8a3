use anyhow::Context;
use extract::RetryCoordinator;
use index::{SearchRequest, SearchResponse, TripleStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use crate::error::PipelineError;
use crate::resolver::{EntityResolver, ResolvedEntity, subject_map};
use crate::substitute::substitute;

/// Result of one text-to-graph run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Final Turtle fragment with every placeholder replaced.
    pub graph: String,
    /// One entry per extracted variable, in generator order.
    pub entities: Vec<ResolvedEntity>,
    /// Generation attempts used.
    pub attempts: usize,
    /// Triples merged into the store.
    pub inserted: usize,
}

/// Generate → resolve → substitute → merge.
///
/// The store is written only once the fragment is valid and fully resolved;
/// any earlier failure leaves it untouched.
pub struct Pipeline {
    retry: RetryCoordinator,
    resolver: EntityResolver,
    store: Arc<dyn TripleStore>,
}

impl Pipeline {
    pub fn new(retry: RetryCoordinator, resolver: EntityResolver, store: Arc<dyn TripleStore>) -> Self {
        Self {
            retry,
            resolver,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn TripleStore> {
        &self.store
    }

    #[instrument(skip(self, text, shapes), fields(text_len = text.len(), shapes = shapes.is_some()))]
    pub async fn run(&self, text: &str, shapes: Option<&str>) -> Result<PipelineOutput, PipelineError> {
        let start = Instant::now();

        let accepted = self.retry.generate_for_text(text, shapes).await?;
        let draft = accepted.draft;

        let entities = self.resolver.resolve_all(&draft.variables).await?;
        let graph = substitute(&draft.content, &subject_map(&entities))?;

        let inserted = self
            .store
            .insert(&graph)
            .await
            .context("Failed to merge graph into store")
            .map_err(PipelineError::Store)?;

        info!(
            attempts = accepted.attempts,
            entities = entities.len(),
            minted = entities.iter().filter(|e| e.minted).count(),
            inserted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );

        Ok(PipelineOutput {
            graph,
            entities,
            attempts: accepted.attempts,
            inserted,
        })
    }

    /// Run the configured search service directly.
    pub async fn search(&self, text: &str) -> anyhow::Result<SearchResponse> {
        self.resolver
            .search_service()
            .search(&SearchRequest::new(text))
            .await
    }
}
