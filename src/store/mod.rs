//! Document store boundary.
//!
//! The dashboard treats persistence as a collection-keyed document store:
//! create, get, equality query with ordering and limit, partial update,
//! delete, and live subscriptions. The store assigns ids and the
//! `created_at`/`updated_at` timestamps.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: process-local, used by tests and demos.
//! - [`PgStore`]: a JSONB table in PostgreSQL with `LISTEN/NOTIFY` driven
//!   subscriptions.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::StoreError;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

/// A raw document as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Equality filters on top-level fields, an optional ordering and a limit.
///
/// Ordering by `created_at` or `updated_at` uses the store timestamps; any
/// other name orders by that field of the document body.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Query {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filters as a single JSON object, the shape used for containment checks.
    pub(crate) fn filter_object(&self) -> Value {
        Value::Object(self.filters.iter().cloned().collect())
    }
}

/// Callback invoked with the full result set every time it may have changed.
pub type Callback = Box<dyn Fn(Vec<Document>) + Send + Sync + 'static>;

/// Handle to a live query. Delivery stops on [`Subscription::unsubscribe`]
/// or when the handle is dropped.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Subscription { task }
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Operations the dashboard needs from a document database.
pub trait DocumentStore: Send + Sync + 'static {
    fn create(
        &self,
        collection: &str,
        data: Value,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    fn query(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Merge `patch` (a JSON object) into the document body.
    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Run `query` now and again after every change to its collection,
    /// handing each result set to `callback`.
    fn subscribe(
        &self,
        query: Query,
        callback: Callback,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Release backend resources. Further calls may fail.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Shallow merge of a JSON object patch into a document body.
pub(crate) fn merge_patch(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}
