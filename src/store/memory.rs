//! In-process document store.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{merge_patch, Callback, Direction, Document, DocumentStore, Query, Subscription};
use crate::error::StoreError;

// ---

/// Cheap to clone; clones share the same documents.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    /// Carries the name of each collection that changed.
    changes: broadcast::Sender<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        MemoryStore {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    fn notify(&self, collection: &str) {
        // No receivers is fine
        let _ = self.inner.changes.send(collection.to_string());
    }

    fn run_query(docs: Option<&BTreeMap<String, Document>>, query: &Query) -> Vec<Document> {
        // ---
        let Some(docs) = docs else {
            return Vec::new();
        };

        let mut matched: Vec<Document> = docs
            .values()
            .filter(|doc| {
                query
                    .filters
                    .iter()
                    .all(|(field, value)| doc.data.get(field) == Some(value))
            })
            .cloned()
            .collect();

        match &query.order_by {
            Some((field, direction)) => {
                matched.sort_by(|a, b| {
                    let ord = compare_field(a, b, field);
                    match direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                });
            }
            None => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    match field {
        "created_at" => a.created_at.cmp(&b.created_at),
        "updated_at" => a.updated_at.cmp(&b.updated_at),
        _ => compare_values(a.data.get(field), b.data.get(field)),
    }
}

/// Missing sorts first, then numbers, then strings, then everything else.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(_) => 3,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, data: Value) -> Result<Document, StoreError> {
        // ---
        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            data,
            created_at: now,
            updated_at: now,
        };

        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id.clone(), doc.clone());

        self.notify(collection);
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collections = self.inner.collections.read().await;
        Ok(Self::run_query(collections.get(&query.collection), query))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<Document, StoreError> {
        // ---
        let updated = {
            let mut collections = self.inner.collections.write().await;
            let doc = collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            merge_patch(&mut doc.data, patch);
            doc.updated_at = Utc::now();
            doc.clone()
        };

        self.notify(collection);
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        // ---
        let removed = self
            .inner
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));

        if removed.is_none() {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        self.notify(collection);
        Ok(())
    }

    async fn subscribe(
        &self,
        query: Query,
        callback: Callback,
    ) -> Result<Subscription, StoreError> {
        // ---
        // Subscribe before the first snapshot so no change slips between them
        let mut changes = self.inner.changes.subscribe();
        let store = self.clone();

        let task = tokio::spawn(async move {
            let snapshot = |store: MemoryStore, query: Query| async move {
                let collections = store.inner.collections.read().await;
                let docs = MemoryStore::run_query(collections.get(&query.collection), &query);
                docs
            };

            callback(snapshot(store.clone(), query.clone()).await);

            loop {
                match changes.recv().await {
                    Ok(changed) if changed == query.collection => {
                        callback(snapshot(store.clone(), query.clone()).await);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("memory store subscriber lagged by {} changes", skipped);
                        callback(snapshot(store.clone(), query.clone()).await);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(task))
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let store = MemoryStore::new();

        let doc = store
            .create("sensors", json!({ "name": "Well 4", "status": "active" }))
            .await
            .unwrap();
        assert_eq!(doc.created_at, doc.updated_at);

        let fetched = store.get("sensors", &doc.id).await.unwrap().unwrap();
        assert_eq!(fetched, doc);

        let updated = store
            .update("sensors", &doc.id, json!({ "status": "maintenance" }))
            .await
            .unwrap();
        assert_eq!(updated.data, json!({ "name": "Well 4", "status": "maintenance" }));
        assert!(updated.updated_at >= updated.created_at);

        store.delete("sensors", &doc.id).await.unwrap();
        assert!(store.get("sensors", &doc.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete("sensors", &doc.id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.update("sensors", &doc.id, json!({})).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (sensor, ts) in [("S1", 3), ("S2", 1), ("S1", 1), ("S1", 2)] {
            store
                .create("readings", json!({ "sensor_id": sensor, "ts": ts }))
                .await
                .unwrap();
        }

        let query = Query::collection("readings")
            .where_eq("sensor_id", "S1")
            .order_by("ts", Direction::Desc)
            .limit(2);
        let docs = store.query(&query).await.unwrap();

        let ts: Vec<_> = docs.iter().map(|d| d.data["ts"].clone()).collect();
        assert_eq!(ts, vec![json!(3), json!(2)]);

        let empty = store.query(&Query::collection("missing")).await.unwrap();
        assert!(empty.is_empty());
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<usize>) -> Option<usize> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("subscription callback timed out")
    }

    #[tokio::test]
    async fn test_subscription_delivers_until_unsubscribed() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = store
            .subscribe(
                Query::collection("alerts").where_eq("user_id", "u1"),
                Box::new(move |docs| {
                    let _ = tx.send(docs.len());
                }),
            )
            .await
            .unwrap();

        assert_eq!(recv(&mut rx).await, Some(0));

        store
            .create("alerts", json!({ "user_id": "u1" }))
            .await
            .unwrap();
        assert_eq!(recv(&mut rx).await, Some(1));

        // Changes to other collections do not trigger the callback
        store.create("readings", json!({})).await.unwrap();
        store
            .create("alerts", json!({ "user_id": "u1" }))
            .await
            .unwrap();
        assert_eq!(recv(&mut rx).await, Some(2));

        sub.unsubscribe();
        // Sender lives inside the aborted task, so the channel closes
        assert_eq!(recv(&mut rx).await, None);
    }
}
