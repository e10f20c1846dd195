//! In-memory document store.
//!
//! Keeps every index in RAM. Useful for tests, dry runs, and short-lived
//! indexers that don't need persistence. Writes to an index that was never
//! created create it on the fly.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::RwLock;

use arcindex_core::document::{Document, RecordKind};
use arcindex_core::error::IndexerError;
use arcindex_core::store::{compare_on, DocumentStore, DocumentStream, Query, StoredDocument};

#[derive(Default)]
struct State {
    /// index name → (id → body)
    indices: HashMap<String, BTreeMap<String, Value>>,
    /// alias → index name
    aliases: HashMap<String, String>,
}

impl State {
    fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    fn matching(&self, name: &str, query: &Query) -> Vec<StoredDocument> {
        let Some(docs) = self.indices.get(self.resolve(name)) else {
            return Vec::new();
        };
        let mut out: Vec<StoredDocument> = docs
            .iter()
            .map(|(id, body)| StoredDocument {
                id: id.clone(),
                body: body.clone(),
            })
            .filter(|d| query.matches(d))
            .collect();
        if let Some(sort) = &query.sort {
            out.sort_by(|a, b| {
                let ord = compare_on(&sort.field, a, b);
                if sort.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        out
    }
}

/// In-memory document store. All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids stored in an index (or alias), sorted.
    pub async fn ids(&self, index: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .indices
            .get(state.resolve(index))
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of all created indices, sorted.
    pub async fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.indices.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get(&self, index: &str, id: &str) -> Option<StoredDocument> {
        let state = self.state.read().await;
        state
            .indices
            .get(state.resolve(index))
            .and_then(|docs| docs.get(id))
            .map(|body| StoredDocument {
                id: id.to_string(),
                body: body.clone(),
            })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn existing_index(&self, alias: &str) -> Result<Option<String>, IndexerError> {
        Ok(self.state.read().await.aliases.get(alias).cloned())
    }

    async fn create_index(&self, index: &str, _kind: RecordKind) -> Result<(), IndexerError> {
        self.state
            .write()
            .await
            .indices
            .entry(index.to_string())
            .or_default();
        Ok(())
    }

    async fn update_alias(&self, alias: &str, index: &str) -> Result<(), IndexerError> {
        let mut state = self.state.write().await;
        if !state.indices.contains_key(index) {
            return Err(IndexerError::Storage(format!(
                "cannot alias '{alias}' to missing index '{index}'"
            )));
        }
        state.aliases.insert(alias.to_string(), index.to_string());
        Ok(())
    }

    async fn insert(&self, index: &str, doc: &Document) -> Result<(), IndexerError> {
        let body = doc.body()?;
        let mut state = self.state.write().await;
        let name = state.resolve(index).to_string();
        state
            .indices
            .entry(name)
            .or_default()
            .insert(doc.id().to_string(), body);
        Ok(())
    }

    async fn update(&self, index: &str, id: &str, partial: Value) -> Result<(), IndexerError> {
        let mut state = self.state.write().await;
        let name = state.resolve(index).to_string();
        let body = state
            .indices
            .get_mut(&name)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| IndexerError::Storage(format!("document '{id}' not found in '{name}'")))?;
        let mut doc = StoredDocument {
            id: id.to_string(),
            body: body.take(),
        };
        doc.merge(&partial);
        *body = doc.body;
        Ok(())
    }

    async fn delete(&self, index: &str, query: &Query) -> Result<u64, IndexerError> {
        let mut state = self.state.write().await;
        let doomed: Vec<String> = state.matching(index, query).into_iter().map(|d| d.id).collect();
        let name = state.resolve(index).to_string();
        if let Some(docs) = state.indices.get_mut(&name) {
            for id in &doomed {
                docs.remove(id);
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn count(&self, index: &str, query: &Query) -> Result<u64, IndexerError> {
        Ok(self.state.read().await.matching(index, query).len() as u64)
    }

    async fn select_one(
        &self,
        index: &str,
        query: &Query,
    ) -> Result<Option<StoredDocument>, IndexerError> {
        Ok(self
            .state
            .read()
            .await
            .matching(index, query)
            .into_iter()
            .next())
    }

    fn scroll<'a>(&'a self, index: &'a str, query: Query) -> DocumentStream<'a> {
        futures::stream::once(async move { self.state.read().await.matching(index, &query) })
            .flat_map(|docs| futures::stream::iter(docs.into_iter().map(Ok)))
            .boxed()
    }

    async fn bulk_commit(&self, index: &str, docs: &[Document]) -> Result<(), IndexerError> {
        let mut bodies = Vec::with_capacity(docs.len());
        for doc in docs {
            bodies.push((doc.id().to_string(), doc.body()?));
        }
        let mut state = self.state.write().await;
        let name = state.resolve(index).to_string();
        state.indices.entry(name).or_default().extend(bodies);
        Ok(())
    }
}
