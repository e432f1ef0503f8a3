use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::embeddings::{EmbeddingClient, literal_documents};
use crate::rdf::Triple;
use crate::search::{RankedDocument, RankedIndex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub base_url: String,
    pub collection: String,
    /// Ollama instance serving the embedding model.
    pub embedding_url: String,
    pub embedding_model: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6333".to_string(),
            collection: "kg_literals".to_string(),
            embedding_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

/// Ranked index over literal-valued triples, one Qdrant point per triple.
pub struct QdrantIndex {
    base_url: String,
    collection: String,
    client: reqwest::Client,
    embedding_client: EmbeddingClient,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Serialize)]
struct UpsertPoints {
    points: Vec<Point>,
}

#[derive(Serialize)]
struct DeletePoints {
    points: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    subject: String,
    predicate: String,
    object: String,
}

#[derive(Serialize)]
struct Point {
    id: u64,
    vector: Vec<f32>,
    payload: Payload,
}

#[derive(Serialize)]
struct SearchPoints {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResult {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f64,
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    result: CollectionResult,
}

#[derive(Deserialize)]
struct CollectionResult {
    collections: Vec<Collection>,
}

#[derive(Deserialize)]
struct Collection {
    name: String,
}

/// Stable point id: first eight bytes of the SHA-256 of the N-Triples line.
fn point_id(triple: &Triple) -> u64 {
    let digest = Sha256::digest(triple.to_string().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

impl QdrantIndex {
    pub fn new(config: &QdrantConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            collection: config.collection.clone(),
            client: reqwest::Client::new(),
            embedding_client: EmbeddingClient::new(
                config.embedding_url.clone(),
                config.embedding_model.clone(),
            ),
        }
    }

    /// Create the collection if it does not exist yet.
    pub async fn init_collection(&self) -> Result<()> {
        let url = format!("{}/collections", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to list collections: {}", response.status());
        }

        let info: CollectionInfo = response.json().await?;
        if info.result.collections.iter().any(|c| c.name == self.collection) {
            debug!(collection = %self.collection, "Collection already exists");
            return Ok(());
        }

        let dimension = self.embedding_client.dimension().await?;

        let url = format!("{}/collections/{}", self.base_url, self.collection);
        let create_req = CreateCollection {
            vectors: VectorParams {
                size: dimension,
                distance: "Cosine".to_string(),
            },
        };

        let response = self.client.put(&url).json(&create_req).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to create collection: {}", error_text);
        }

        info!(collection = %self.collection, dimension, "Created collection");
        Ok(())
    }

    /// Embed and upsert every literal-valued triple. Returns the number indexed.
    pub async fn index_triples(&self, triples: &[Triple]) -> Result<usize> {
        let points: Vec<Point> = self
            .embedding_client
            .embed_literals(triples)
            .await
            .context("Failed to generate embeddings")?
            .into_iter()
            .map(|embedded| Point {
                id: point_id(embedded.triple),
                vector: embedded.vector,
                payload: Payload {
                    subject: embedded.triple.subject.key(),
                    predicate: embedded.triple.predicate.clone(),
                    object: embedded.text.to_string(),
                },
            })
            .collect();

        if points.is_empty() {
            return Ok(0);
        }
        let count = points.len();

        let url = format!("{}/collections/{}/points", self.base_url, self.collection);
        let response = self
            .client
            .put(&url)
            .json(&UpsertPoints { points })
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to upsert points: {}", error_text);
        }

        debug!(count, "Indexed literal triples");
        Ok(count)
    }

    pub async fn remove_triples(&self, triples: &[Triple]) -> Result<usize> {
        let ids: Vec<u64> = literal_documents(triples)
            .into_iter()
            .map(|(t, _)| point_id(t))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let count = ids.len();

        let url = format!(
            "{}/collections/{}/points/delete",
            self.base_url, self.collection
        );
        let response = self
            .client
            .post(&url)
            .json(&DeletePoints { points: ids })
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to delete points: {}", error_text);
        }

        Ok(count)
    }
}

#[async_trait]
impl RankedIndex for QdrantIndex {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RankedDocument>> {
        let vector = self
            .embedding_client
            .embed_query(text)
            .await
            .context("Failed to embed query")?;

        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );
        let response = self
            .client
            .post(&url)
            .json(&SearchPoints {
                vector,
                limit,
                with_payload: true,
            })
            .send()
            .await
            .context("Failed to send search request to Qdrant")?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Qdrant search failed: {}", error_text);
        }

        let result: SearchResult = response
            .json()
            .await
            .context("Failed to parse Qdrant response")?;

        Ok(result
            .result
            .into_iter()
            .filter_map(|point| {
                point.payload.map(|payload| RankedDocument {
                    subject: payload.subject,
                    predicate: payload.predicate,
                    object: payload.object,
                    score: point.score,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::Term;

    #[test]
    fn test_point_id_is_stable() {
        let t = Triple::new(
            Term::iri("http://example.org/a"),
            "http://example.org/name",
            Term::literal("Alice"),
        );
        assert_eq!(point_id(&t), point_id(&t.clone()));

        let other = Triple::new(
            Term::iri("http://example.org/b"),
            "http://example.org/name",
            Term::literal("Alice"),
        );
        assert_ne!(point_id(&t), point_id(&other));
    }
}
