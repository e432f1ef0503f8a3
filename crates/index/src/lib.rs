//! Graph storage and candidate search for the knowledge graph.

pub mod embeddings;
pub mod neo4j_store;
pub mod qdrant_index;
pub mod rdf;
pub mod search;
pub mod store;
pub mod testing;

pub use embeddings::{EmbeddedLiteral, EmbeddingClient};
pub use neo4j_store::{Neo4jConfig, Neo4jStore};
pub use qdrant_index::{QdrantConfig, QdrantIndex};
pub use rdf::{Literal, RdfError, Term, Triple, parse_turtle, to_ntriples};
pub use search::{
    DEFAULT_MIN_SCORE, OccurrenceSearch, RankedDocument, RankedIndex, RankedSearch, SearchConfig,
    SearchHit, SearchRequest, SearchResponse, SearchService, SearchStrategy,
};
pub use store::{ChannelListener, Listeners, MemoryStore, StoreEvent, StoreListener, TripleStore};
