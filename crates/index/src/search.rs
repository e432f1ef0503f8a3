//! Candidate search over subjects already in the knowledge graph.
//!
//! Two scoring strategies sit behind [`SearchService`]:
//!
//! - [`OccurrenceSearch`] counts literal values containing the query,
//!   case-insensitively, per subject. This is the default strategy.
//! - [`RankedSearch`] delegates to an external [`RankedIndex`] and sums the
//!   scores of every indexed document that belongs to the same subject.
//!   Documents below the configured similarity floor are not evidence of a
//!   match, so a query with only weak neighbours returns no hits.
//!
//! The two produce scores on different scales and are never mixed.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::rdf::{Term, Triple};
use crate::store::TripleStore;

pub const DEFAULT_LIMIT: usize = 10;

/// Cosine similarity below which a ranked document does not count.
pub const DEFAULT_MIN_SCORE: f64 = 0.7;

/// Documents fetched from a ranked index per requested subject, since one
/// subject usually owns several documents.
const DOCUMENTS_PER_SUBJECT: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub text: String,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub subject: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query exactly as it was asked.
    pub text: String,
    /// Sorted by descending score.
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn empty(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hits: Vec::new(),
        }
    }

    pub fn best(&self) -> Option<&SearchHit> {
        self.hits.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Occurrence,
    Ranked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: SearchStrategy,
    /// Maximum number of hits per response.
    pub limit: usize,
    /// Ranked strategy only: per-document score a document needs to count.
    pub min_score: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Occurrence,
            limit: DEFAULT_LIMIT,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}

#[async_trait]
impl<T: SearchService + ?Sized> SearchService for Arc<T> {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        (**self).search(request).await
    }
}

/// Descending score, then ascending subject so equal scores come back in a
/// stable order.
fn rank(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.subject.cmp(&b.subject))
    });
}

/// Score subjects by how many of their literal values contain `query`.
///
/// Every matching triple counts once, so a subject with the query in two
/// literals of the same predicate scores 2.
pub fn score_occurrences<'a>(
    triples: impl IntoIterator<Item = &'a Triple>,
    query: &str,
    limit: usize,
) -> Vec<SearchHit> {
    let needle = query.to_lowercase();
    if needle.trim().is_empty() {
        return Vec::new();
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for triple in triples {
        let Term::Literal(literal) = &triple.object else {
            continue;
        };
        if literal.lexical.to_lowercase().contains(&needle) {
            *counts.entry(triple.subject.key()).or_insert(0) += 1;
        }
    }

    let mut hits: Vec<SearchHit> = counts
        .into_iter()
        .map(|(subject, count)| SearchHit {
            subject,
            score: count as f64,
        })
        .collect();
    rank(&mut hits);
    hits.truncate(limit);
    hits
}

/// Occurrence-count search over the current contents of a triple store.
pub struct OccurrenceSearch {
    store: Arc<dyn TripleStore>,
    limit: usize,
}

impl OccurrenceSearch {
    pub fn new(store: Arc<dyn TripleStore>, limit: usize) -> Self {
        Self { store, limit }
    }
}

#[async_trait]
impl SearchService for OccurrenceSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let triples = self.store.triples().await?;
        let hits = score_occurrences(&triples, &request.text, self.limit);
        debug!(query = %request.text, hits = hits.len(), "Occurrence search");
        Ok(SearchResponse {
            text: request.text.clone(),
            hits,
        })
    }
}

/// One scored document returned by a ranked index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDocument {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub score: f64,
}

#[async_trait]
pub trait RankedIndex: Send + Sync {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RankedDocument>>;
}

#[async_trait]
impl<T: RankedIndex + ?Sized> RankedIndex for Arc<T> {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RankedDocument>> {
        (**self).query(text, limit).await
    }
}

/// Merge per-document scores into per-subject hits by summing.
///
/// Documents scoring below `min_score` are dropped before summing, as are
/// non-positive scores whatever the floor.
pub fn merge_ranked(documents: Vec<RankedDocument>, limit: usize, min_score: f64) -> Vec<SearchHit> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for doc in documents {
        if doc.score > 0.0 && doc.score >= min_score {
            *totals.entry(doc.subject).or_insert(0.0) += doc.score;
        }
    }

    let mut hits: Vec<SearchHit> = totals
        .into_iter()
        .map(|(subject, score)| SearchHit { subject, score })
        .collect();
    rank(&mut hits);
    hits.truncate(limit);
    hits
}

pub struct RankedSearch<I> {
    index: I,
    limit: usize,
    min_score: f64,
}

impl<I: RankedIndex> RankedSearch<I> {
    pub fn new(index: I, limit: usize, min_score: f64) -> Self {
        Self {
            index,
            limit,
            min_score,
        }
    }
}

#[async_trait]
impl<I: RankedIndex> SearchService for RankedSearch<I> {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        if request.text.trim().is_empty() {
            return Ok(SearchResponse::empty(request.text.clone()));
        }
        let documents = self
            .index
            .query(&request.text, self.limit * DOCUMENTS_PER_SUBJECT)
            .await?;
        let fetched = documents.len();
        let hits = merge_ranked(documents, self.limit, self.min_score);
        debug!(query = %request.text, documents = fetched, hits = hits.len(), "Ranked search");
        Ok(SearchResponse {
            text: request.text.clone(),
            hits,
        })
    }
}
