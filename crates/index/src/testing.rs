//! Test doubles for the search collaborator.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::search::{SearchHit, SearchRequest, SearchResponse, SearchService};

/// Search service answering from a fixed table of hits per query.
///
/// Unknown queries get an empty response. A per-query delay lets tests make
/// calls complete out of order, and every query is recorded.
#[derive(Default)]
pub struct StaticSearch {
    hits: HashMap<String, Vec<SearchHit>>,
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, query: impl Into<String>, hits: &[(&str, f64)]) -> Self {
        let hits = hits
            .iter()
            .map(|(subject, score)| SearchHit {
                subject: subject.to_string(),
                score: *score,
            })
            .collect();
        self.hits.insert(query.into(), hits);
        self
    }

    pub fn with_delay(mut self, query: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(query.into(), delay);
        self
    }

    pub fn failing_on(mut self, query: impl Into<String>) -> Self {
        self.failing.push(query.into());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("query log poisoned").clone()
    }
}

#[async_trait]
impl SearchService for StaticSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.queries
            .lock()
            .expect("query log poisoned")
            .push(request.text.clone());

        if let Some(delay) = self.delays.get(&request.text) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&request.text) {
            anyhow::bail!("search backend unavailable");
        }

        Ok(SearchResponse {
            text: request.text.clone(),
            hits: self.hits.get(&request.text).cloned().unwrap_or_default(),
        })
    }
}
