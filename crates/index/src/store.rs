//! Triple stores the pipeline merges its output into.
//!
//! The pipeline treats a store as an append-only merge target: it inserts the
//! final graph fragment and exports everything for callers, but never reads it
//! back to make validation decisions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::rdf::{Triple, parse_turtle, to_ntriples};

#[async_trait]
pub trait TripleStore: Send + Sync {
    /// Merge a Turtle document into the store. Returns the number of triples merged.
    async fn insert(&self, graph: &str) -> Result<usize>;

    /// Remove every triple of a Turtle document. Returns the number of triples removed.
    async fn remove(&self, graph: &str) -> Result<usize>;

    async fn triples(&self) -> Result<Vec<Triple>>;

    async fn export_all(&self) -> Result<String> {
        Ok(to_ntriples(&self.triples().await?))
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// Observer notified after a store mutation succeeded.
///
/// Both hooks default to a no-op, so a listener only implements the
/// notifications it cares about.
pub trait StoreListener: Send + Sync {
    fn on_insert(&self, _triples: &[Triple]) -> Result<()> {
        Ok(())
    }

    fn on_remove(&self, _triples: &[Triple]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Inserted(Vec<Triple>),
    Removed(Vec<Triple>),
}

/// Forwards store events to an async consumer.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<StoreEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: StoreEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("store event receiver was dropped"))
    }
}

impl StoreListener for ChannelListener {
    fn on_insert(&self, triples: &[Triple]) -> Result<()> {
        self.forward(StoreEvent::Inserted(triples.to_vec()))
    }

    fn on_remove(&self, triples: &[Triple]) -> Result<()> {
        self.forward(StoreEvent::Removed(triples.to_vec()))
    }
}

/// Registered store listeners.
///
/// Listeners run synchronously, in registration order, after a mutation has
/// been applied. A failing or panicking listener is logged and skipped; it
/// never aborts the mutation or the remaining listeners.
#[derive(Default, Clone)]
pub struct Listeners {
    listeners: Vec<Arc<dyn StoreListener>>,
}

impl Listeners {
    pub fn push(&mut self, listener: Arc<dyn StoreListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn inserted(&self, triples: &[Triple]) {
        self.notify(triples, |listener| listener.on_insert(triples));
    }

    pub fn removed(&self, triples: &[Triple]) {
        self.notify(triples, |listener| listener.on_remove(triples));
    }

    fn notify(&self, changed: &[Triple], call: impl Fn(&dyn StoreListener) -> Result<()>) {
        if changed.is_empty() {
            return;
        }
        for (index, listener) in self.listeners.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(listener = index, error = %e, "Store listener failed"),
                Err(_) => warn!(listener = index, "Store listener panicked"),
            }
        }
    }
}

/// In-memory set of triples with a listener registry.
#[derive(Default)]
pub struct MemoryStore {
    triples: RwLock<BTreeSet<Triple>>,
    listeners: Listeners,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn StoreListener>) {
        self.listeners.push(listener);
    }

    pub async fn len(&self) -> usize {
        self.triples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.triples.read().await.is_empty()
    }
}

#[async_trait]
impl TripleStore for MemoryStore {
    async fn insert(&self, graph: &str) -> Result<usize> {
        let parsed = parse_turtle(graph).context("Failed to parse graph for insert")?;
        let added: Vec<Triple> = {
            let mut triples = self.triples.write().await;
            parsed
                .into_iter()
                .filter(|t| triples.insert(t.clone()))
                .collect()
        };
        debug!(added = added.len(), "Inserted triples");
        self.listeners.inserted(&added);
        Ok(added.len())
    }

    async fn remove(&self, graph: &str) -> Result<usize> {
        let parsed = parse_turtle(graph).context("Failed to parse graph for remove")?;
        let removed: Vec<Triple> = {
            let mut triples = self.triples.write().await;
            parsed.into_iter().filter(|t| triples.remove(t)).collect()
        };
        debug!(removed = removed.len(), "Removed triples");
        self.listeners.removed(&removed);
        Ok(removed.len())
    }

    async fn triples(&self) -> Result<Vec<Triple>> {
        Ok(self.triples.read().await.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const ALICE: &str = r#"
        @prefix ex: <http://example.org/> .
        ex:alice ex:name "Alice" ; ex:age 30 .
    "#;

    #[derive(Default)]
    struct Recorder {
        inserted: Mutex<Vec<usize>>,
        removed: Mutex<Vec<usize>>,
    }

    impl StoreListener for Recorder {
        fn on_insert(&self, triples: &[Triple]) -> Result<()> {
            self.inserted.lock().unwrap().push(triples.len());
            Ok(())
        }

        fn on_remove(&self, triples: &[Triple]) -> Result<()> {
            self.removed.lock().unwrap().push(triples.len());
            Ok(())
        }
    }

    struct Failing;

    impl StoreListener for Failing {
        fn on_insert(&self, _triples: &[Triple]) -> Result<()> {
            anyhow::bail!("listener is broken")
        }
    }

    struct Panicking;

    impl StoreListener for Panicking {
        fn on_insert(&self, _triples: &[Triple]) -> Result<()> {
            panic!("listener exploded")
        }
    }

    #[tokio::test]
    async fn test_insert_merges_duplicates() {
        let store = MemoryStore::new();
        assert_eq!(store.insert(ALICE).await.unwrap(), 2);
        assert_eq!(store.insert(ALICE).await.unwrap(), 0);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_export_is_reparseable() {
        let store = MemoryStore::new();
        store.insert(ALICE).await.unwrap();
        let exported = store.export_all().await.unwrap();
        assert_eq!(parse_turtle(&exported).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_insert_leaves_store_untouched() {
        let store = MemoryStore::new();
        assert!(store.insert("this is not turtle").await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_listeners_see_only_changes() {
        let recorder = Arc::new(Recorder::default());
        let mut store = MemoryStore::new();
        store.subscribe(recorder.clone());

        store.insert(ALICE).await.unwrap();
        store.insert(ALICE).await.unwrap();
        store.remove(ALICE).await.unwrap();

        assert_eq!(*recorder.inserted.lock().unwrap(), vec![2]);
        assert_eq!(*recorder.removed.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_listener_failure_is_isolated() {
        let recorder = Arc::new(Recorder::default());
        let mut store = MemoryStore::new();
        store.subscribe(Arc::new(Failing));
        store.subscribe(Arc::new(Panicking));
        store.subscribe(recorder.clone());

        assert_eq!(store.insert(ALICE).await.unwrap(), 2);
        assert_eq!(store.len().await, 2);
        assert_eq!(*recorder.inserted.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_channel_listener_forwards_events() {
        let (listener, mut rx) = ChannelListener::new();
        let mut store = MemoryStore::new();
        store.subscribe(Arc::new(listener));

        store.insert(ALICE).await.unwrap();
        match rx.recv().await {
            Some(StoreEvent::Inserted(triples)) => assert_eq!(triples.len(), 2),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
