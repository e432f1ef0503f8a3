use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{Graph, Query};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::rdf::{Literal, Term, Triple, parse_turtle};
use crate::store::{Listeners, StoreListener, TripleStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
        }
    }
}

/// Triple store on Neo4j.
///
/// Resources are `(:Resource {iri})` nodes (blank nodes keep their `_:` key),
/// literal objects are `(:Literal {value, datatype, language})` nodes with
/// empty strings for absent datatype/language, and each triple is a
/// `[:TRIPLE {predicate}]` relationship. Everything is written with MERGE.
///
/// MERGE does not report whether a triple was new, so listeners receive every
/// triple of a successful insert or remove.
pub struct Neo4jStore {
    graph: Graph,
    listeners: Listeners,
}

impl Neo4jStore {
    pub async fn connect(config: &Neo4jConfig) -> Result<Self> {
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .context("Failed to connect to Neo4j")?;
        Ok(Self::new(graph))
    }

    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            listeners: Listeners::default(),
        }
    }

    pub fn subscribe(&mut self, listener: Arc<dyn StoreListener>) {
        self.listeners.push(listener);
    }

    pub async fn init_schema(&self) -> Result<()> {
        let query = Query::new(
            "CREATE INDEX resource_iri_index IF NOT EXISTS FOR (r:Resource) ON (r.iri)".to_string(),
        );
        self.graph
            .run(query)
            .await
            .context("Failed to create index on Resource.iri")?;

        let query = Query::new(
            "CREATE INDEX literal_value_index IF NOT EXISTS FOR (l:Literal) ON (l.value)"
                .to_string(),
        );
        self.graph
            .run(query)
            .await
            .context("Failed to create index on Literal.value")?;

        info!("Neo4j indexes created");
        Ok(())
    }

    async fn merge_triple(&self, triple: &Triple) -> Result<()> {
        let query = match &triple.object {
            Term::Literal(lit) => Query::new(
                r#"
                MERGE (s:Resource {iri: $subject})
                MERGE (o:Literal {value: $value, datatype: $datatype, language: $language})
                MERGE (s)-[:TRIPLE {predicate: $predicate}]->(o)
                "#
                .to_string(),
            )
            .param("value", lit.lexical.clone())
            .param("datatype", lit.datatype.clone().unwrap_or_default())
            .param("language", lit.language.clone().unwrap_or_default()),
            object => Query::new(
                r#"
                MERGE (s:Resource {iri: $subject})
                MERGE (o:Resource {iri: $object})
                MERGE (s)-[:TRIPLE {predicate: $predicate}]->(o)
                "#
                .to_string(),
            )
            .param("object", object.key()),
        }
        .param("subject", triple.subject.key())
        .param("predicate", triple.predicate.clone());

        self.graph
            .run(query)
            .await
            .context("Failed to merge triple")?;
        Ok(())
    }

    async fn delete_triple(&self, triple: &Triple) -> Result<()> {
        let query = match &triple.object {
            Term::Literal(lit) => Query::new(
                r#"
                MATCH (:Resource {iri: $subject})-[r:TRIPLE {predicate: $predicate}]->
                      (:Literal {value: $value, datatype: $datatype, language: $language})
                DELETE r
                "#
                .to_string(),
            )
            .param("value", lit.lexical.clone())
            .param("datatype", lit.datatype.clone().unwrap_or_default())
            .param("language", lit.language.clone().unwrap_or_default()),
            object => Query::new(
                r#"
                MATCH (:Resource {iri: $subject})-[r:TRIPLE {predicate: $predicate}]->
                      (:Resource {iri: $object})
                DELETE r
                "#
                .to_string(),
            )
            .param("object", object.key()),
        }
        .param("subject", triple.subject.key())
        .param("predicate", triple.predicate.clone());

        self.graph
            .run(query)
            .await
            .context("Failed to delete triple")?;
        Ok(())
    }
}

fn resource(key: String) -> Term {
    match key.strip_prefix("_:") {
        Some(id) => Term::BlankNode(id.to_string()),
        None => Term::Iri(key),
    }
}

#[async_trait]
impl TripleStore for Neo4jStore {
    async fn insert(&self, graph: &str) -> Result<usize> {
        let triples = parse_turtle(graph).context("Failed to parse graph for insert")?;
        for triple in &triples {
            self.merge_triple(triple).await?;
        }
        debug!(merged = triples.len(), "Merged triples into Neo4j");
        self.listeners.inserted(&triples);
        Ok(triples.len())
    }

    async fn remove(&self, graph: &str) -> Result<usize> {
        let triples = parse_turtle(graph).context("Failed to parse graph for remove")?;
        for triple in &triples {
            self.delete_triple(triple).await?;
        }
        self.listeners.removed(&triples);
        Ok(triples.len())
    }

    async fn triples(&self) -> Result<Vec<Triple>> {
        let query = Query::new(
            r#"
            MATCH (s:Resource)-[r:TRIPLE]->(o)
            RETURN s.iri AS subject,
                   r.predicate AS predicate,
                   'Literal' IN labels(o) AS is_literal,
                   coalesce(o.iri, '') AS object_iri,
                   coalesce(o.value, '') AS value,
                   coalesce(o.datatype, '') AS datatype,
                   coalesce(o.language, '') AS language
            "#
            .to_string(),
        );
        let mut result = self.graph.execute(query).await?;

        let mut triples = Vec::new();
        while let Some(row) = result.next().await? {
            let subject: String = row.get("subject").unwrap_or_default();
            let predicate: String = row.get("predicate").unwrap_or_default();
            let is_literal: bool = row.get("is_literal").unwrap_or_default();

            let object = if is_literal {
                let datatype: String = row.get("datatype").unwrap_or_default();
                let language: String = row.get("language").unwrap_or_default();
                Term::Literal(Literal {
                    lexical: row.get("value").unwrap_or_default(),
                    datatype: (!datatype.is_empty()).then_some(datatype),
                    language: (!language.is_empty()).then_some(language),
                })
            } else {
                resource(row.get("object_iri").unwrap_or_default())
            };

            triples.push(Triple::new(resource(subject), predicate, object));
        }

        Ok(triples)
    }

    async fn health(&self) -> Result<()> {
        self.graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .context("Neo4j is unreachable")?;
        Ok(())
    }
}
