//! In-process remote store.
//!
//! Shared between clones, so a test (or a second simulated client) can keep a
//! handle while the engine owns another. Failures can be injected per call
//! kind, collection and document id.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{RemoteDocument, RemoteStore};
use crate::models::Fields;
use crate::{Error, Result};

/// Kind of remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    ListAll,
    Create,
    Update,
    Delete,
}

/// Matches calls that should fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRule {
    op: RemoteOp,
    collection: Option<String>,
    id: Option<String>,
    remaining: Option<usize>,
}

impl FailureRule {
    /// Fail every call of this kind until cleared.
    pub const fn new(op: RemoteOp) -> Self {
        Self {
            op,
            collection: None,
            id: None,
            remaining: None,
        }
    }

    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Fail only the next `count` matching calls.
    #[must_use]
    pub const fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    fn matches(&self, op: RemoteOp, collection: &str, id: Option<&str>) -> bool {
        self.op == op
            && self.remaining != Some(0)
            && self.collection.as_deref().map_or(true, |c| c == collection)
            && self.id.as_deref().map_or(true, |expected| Some(expected) == id)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    failures: Vec<FailureRule>,
    calls: HashMap<RemoteOp, usize>,
    latency: Option<Duration>,
}

impl MemoryState {
    fn enter(&mut self, op: RemoteOp, collection: &str, id: Option<&str>) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;

        if let Some(rule) = self
            .failures
            .iter_mut()
            .find(|rule| rule.matches(op, collection, id))
        {
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(Error::Remote(format!(
                "injected {op:?} failure on {collection}/{}",
                id.unwrap_or("*")
            )));
        }
        Ok(())
    }
}

/// Remote store kept in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make matching calls fail.
    pub fn inject_failure(&self, rule: FailureRule) {
        self.lock().failures.push(rule);
    }

    /// Delay every call, simulating a slow link.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Number of calls of a kind made so far, failed ones included.
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or_default()
    }

    /// Fields of one document.
    pub fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    /// Every document of a collection, ordered by id.
    pub fn documents(&self, collection: &str) -> Vec<RemoteDocument> {
        self.lock()
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, fields)| RemoteDocument::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Write a document directly, as another client would.
    pub fn put_document(&self, collection: &str, document: RemoteDocument) {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(document.id, document.fields);
    }

    /// Delete a document directly, as another client would.
    pub fn remove_document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.lock()
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id))
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<RemoteDocument>> {
        self.delay().await;
        self.lock().enter(RemoteOp::ListAll, collection, None)?;
        Ok(self.documents(collection))
    }

    async fn create_with_id(&self, collection: &str, id: &str, fields: &Fields) -> Result<()> {
        self.delay().await;
        let mut state = self.lock();
        state.enter(RemoteOp::Create, collection, Some(id))?;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields.clone());
        Ok(())
    }

    async fn update_fields(&self, collection: &str, id: &str, fields: &Fields) -> Result<()> {
        self.delay().await;
        let mut state = self.lock();
        state.enter(RemoteOp::Update, collection, Some(id))?;
        let document = state
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| Error::Remote(format!("no document {collection}/{id}")))?;
        for (name, value) in fields {
            document.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<()> {
        self.delay().await;
        let mut state = self.lock();
        state.enter(RemoteOp::Delete, collection, Some(id))?;
        if let Some(documents) = state.collections.get_mut(collection) {
            documents.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_is_create_or_replace() {
        let remote = MemoryRemoteStore::new();
        remote
            .create_with_id("medications", "m1", &fields(json!({"name": "A"})))
            .await
            .unwrap();
        remote
            .create_with_id("medications", "m1", &fields(json!({"name": "B"})))
            .await
            .unwrap();

        let documents = remote.list_all("medications").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].fields["name"], json!("B"));
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let remote = MemoryRemoteStore::new();
        let err = remote
            .update_fields("medications", "missing", &fields(json!({"name": "A"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
    }

    #[tokio::test]
    async fn delete_of_missing_document_succeeds() {
        let remote = MemoryRemoteStore::new();
        remote.delete_by_id("medications", "missing").await.unwrap();
        assert_eq!(remote.calls(RemoteOp::Delete), 1);
    }

    #[tokio::test]
    async fn injected_failures_match_and_expire() {
        let remote = MemoryRemoteStore::new();
        remote.inject_failure(
            FailureRule::new(RemoteOp::Create)
                .collection("medications")
                .id("m2")
                .times(1),
        );

        let values = fields(json!({"name": "A"}));
        remote.create_with_id("medications", "m1", &values).await.unwrap();
        assert!(remote.create_with_id("medications", "m2", &values).await.is_err());
        remote.create_with_id("medications", "m2", &values).await.unwrap();
        remote.create_with_id("patients", "m2", &values).await.unwrap();

        assert_eq!(remote.calls(RemoteOp::Create), 4);
        assert_eq!(remote.documents("medications").len(), 2);
    }

    #[tokio::test]
    async fn latency_delays_calls() {
        let remote = MemoryRemoteStore::new();
        remote.set_latency(Some(Duration::from_millis(20)));
        let started = std::time::Instant::now();
        remote.list_all("patients").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let remote = MemoryRemoteStore::new();
        let other = remote.clone();
        other.put_document("patients", RemoteDocument::new("p1", Fields::new()));
        assert!(remote.document("patients", "p1").is_some());
        assert!(remote.remove_document("patients", "p1").is_some());
        assert!(other.documents("patients").is_empty());
    }
}
