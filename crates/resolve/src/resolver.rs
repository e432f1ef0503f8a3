use extract::ExtractedVariable;
use futures::stream::{self, StreamExt, TryStreamExt};
use index::{SearchRequest, SearchService};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::disambiguate::{DEFAULT_MINT_NAMESPACE, Disambiguator, Greedy, uuid_minter};
use crate::error::ResolveError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Searches in flight at once for one batch.
    pub max_concurrent_searches: usize,
    /// Namespace for minted subjects. `None` disables minting, so unmatched
    /// entities fail with `NoCandidate`.
    pub mint_namespace: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_searches: 8,
            mint_namespace: Some(DEFAULT_MINT_NAMESPACE.to_string()),
        }
    }
}

impl ResolverConfig {
    /// The greedy disambiguator this configuration describes.
    pub fn disambiguator(&self) -> Greedy {
        match &self.mint_namespace {
            Some(namespace) => Greedy::with_minter(uuid_minter(namespace.clone())),
            None => Greedy::strict(),
        }
    }
}

/// A placeholder bound to its canonical subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub entity: ExtractedVariable,
    pub subject: String,
    /// True when no existing subject matched and a new one was minted.
    pub minted: bool,
}

/// Placeholder id → subject, the input of substitution.
pub fn subject_map(resolved: &[ResolvedEntity]) -> HashMap<String, String> {
    resolved
        .iter()
        .map(|r| (r.entity.id.clone(), r.subject.clone()))
        .collect()
}

pub struct EntityResolver {
    search: Arc<dyn SearchService>,
    disambiguator: Arc<dyn Disambiguator>,
    max_concurrent: usize,
}

impl EntityResolver {
    pub fn new(
        search: Arc<dyn SearchService>,
        disambiguator: Arc<dyn Disambiguator>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            search,
            disambiguator,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn from_config(search: Arc<dyn SearchService>, config: &ResolverConfig) -> Self {
        Self::new(
            search,
            Arc::new(config.disambiguator()),
            config.max_concurrent_searches,
        )
    }

    pub fn search_service(&self) -> &Arc<dyn SearchService> {
        &self.search
    }

    /// Resolve every variable independently; the output follows input order
    /// whatever order the searches complete in.
    pub async fn resolve_all(
        &self,
        variables: &[ExtractedVariable],
    ) -> Result<Vec<ResolvedEntity>, ResolveError> {
        // owned items: a closure over `&ExtractedVariable` makes the future non-Send
        stream::iter(variables.iter().cloned())
            .map(|variable| async move { self.resolve_one(&variable).await })
            .buffered(self.max_concurrent)
            .try_collect()
            .await
    }

    pub async fn resolve_one(
        &self,
        variable: &ExtractedVariable,
    ) -> Result<ResolvedEntity, ResolveError> {
        let request = SearchRequest::new(variable.search_text());
        let response = self.search.search(&request).await?;
        let subject = self.disambiguator.choose(&response)?;

        debug!(
            id = %variable.id,
            query = %request.text,
            candidates = response.hits.len(),
            subject = %subject,
            minted = subject.is_minted(),
            "Resolved entity"
        );

        Ok(ResolvedEntity {
            entity: variable.clone(),
            minted: subject.is_minted(),
            subject: subject.into_string(),
        })
    }
}
