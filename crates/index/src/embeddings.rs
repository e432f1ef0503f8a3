//! Vectors for literal values, from Ollama's batch `/api/embed` endpoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rdf::{Term, Triple};

/// Literals sent per embedding request.
const BATCH_SIZE: usize = 64;

#[derive(Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// A literal-valued triple together with the vector of its lexical form.
#[derive(Debug)]
pub struct EmbeddedLiteral<'a> {
    pub triple: &'a Triple,
    pub text: &'a str,
    pub vector: Vec<f32>,
}

/// The triples worth embedding, with the text each one is embedded as.
/// IRI and blank-node objects carry no searchable text.
pub fn literal_documents(triples: &[Triple]) -> Vec<(&Triple, &str)> {
    triples
        .iter()
        .filter_map(|t| match &t.object {
            Term::Literal(lit) => Some((t, lit.lexical.as_str())),
            _ => None,
        })
        .collect()
}

fn pair_embeddings<'a>(
    documents: &[(&'a Triple, &'a str)],
    embeddings: Vec<Vec<f32>>,
) -> Result<Vec<EmbeddedLiteral<'a>>> {
    if embeddings.len() != documents.len() {
        anyhow::bail!(
            "Embedding response has {} vectors for {} inputs",
            embeddings.len(),
            documents.len()
        );
    }
    Ok(documents
        .iter()
        .zip(embeddings)
        .map(|(&(triple, text), vector)| EmbeddedLiteral {
            triple,
            text,
            vector,
        })
        .collect())
}

impl EmbeddingClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    async fn embed_batch(&self, input: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input,
            })
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Embedding request failed: {}", response.status());
        }

        let body: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;
        Ok(body.embeddings)
    }

    /// Vector for a search query.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .context("Embedding response was empty")
    }

    /// Embed every literal-valued triple, one request per batch of literals.
    pub async fn embed_literals<'a>(&self, triples: &'a [Triple]) -> Result<Vec<EmbeddedLiteral<'a>>> {
        let documents = literal_documents(triples);
        let mut out = Vec::with_capacity(documents.len());

        for chunk in documents.chunks(BATCH_SIZE) {
            let input: Vec<&str> = chunk.iter().map(|(_, text)| *text).collect();
            let embeddings = self.embed_batch(&input).await?;
            out.extend(pair_embeddings(chunk, embeddings)?);
        }

        debug!(literals = out.len(), "Embedded literals");
        Ok(out)
    }

    /// Embedding dimension of the configured model.
    pub async fn dimension(&self) -> Result<usize> {
        Ok(self.embed_query("dimension").await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triples() -> Vec<Triple> {
        vec![
            Triple::new(
                Term::iri("http://example.org/a"),
                "http://example.org/name",
                Term::literal("Alice"),
            ),
            Triple::new(
                Term::iri("http://example.org/a"),
                "http://example.org/knows",
                Term::iri("http://example.org/b"),
            ),
            Triple::new(
                Term::BlankNode("b0".to_string()),
                "http://example.org/note",
                Term::literal("met once"),
            ),
        ]
    }

    #[test]
    fn test_only_literals_are_documents() {
        let triples = triples();
        let texts: Vec<&str> = literal_documents(&triples)
            .into_iter()
            .map(|(_, text)| text)
            .collect();
        assert_eq!(texts, vec!["Alice", "met once"]);
    }

    #[test]
    fn test_vectors_pair_with_their_literal() {
        let triples = triples();
        let documents = literal_documents(&triples);
        let embedded = pair_embeddings(&documents, vec![vec![1.0], vec![2.0]]).unwrap();
        assert_eq!(embedded[1].text, "met once");
        assert_eq!(embedded[1].triple.subject, Term::BlankNode("b0".to_string()));
        assert_eq!(embedded[1].vector, vec![2.0]);
    }

    #[test]
    fn test_short_response_is_an_error() {
        let triples = triples();
        let documents = literal_documents(&triples);
        assert!(pair_embeddings(&documents, vec![vec![1.0]]).is_err());
    }
}
