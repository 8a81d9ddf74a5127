//! PostgreSQL-backed document store.
//!
//! All collections share the `documents` table created by
//! [`schema::create_schema`](crate::schema::create_schema). Document bodies
//! live in a JSONB column; equality filters use JSONB containment so the GIN
//! index applies. Every write issues `pg_notify` inside its transaction, and
//! subscriptions re-run their query when their collection is named.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgExecutor, PgListener, PgPool};
use uuid::Uuid;

use super::{Callback, Direction, Document, DocumentStore, Query, Subscription};
use crate::error::StoreError;

/// Channel used for change notifications; the payload is the collection name.
pub const CHANGE_CHANNEL: &str = "document_changes";

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ---

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    async fn notify<'c, E>(executor: E, collection: &str) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'c>,
    {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(collection)
            .execute(executor)
            .await?;
        Ok(())
    }

    async fn run_query(pool: &PgPool, query: &Query) -> Result<Vec<Document>, StoreError> {
        // ---
        let direction = match query.order_by.as_ref().map(|(_, d)| *d) {
            Some(Direction::Desc) => "DESC",
            _ => "ASC",
        };
        // Field names are bound, never interpolated; only fixed SQL is formatted in
        let (order_expr, order_field) = match query.order_by.as_ref().map(|(f, _)| f.as_str()) {
            None | Some("created_at") => ("created_at", None),
            Some("updated_at") => ("updated_at", None),
            Some(field) => ("data -> $4", Some(field)),
        };

        let sql = format!(
            r#"
            SELECT id, data, created_at, updated_at
              FROM documents
             WHERE collection = $1
               AND data @> $2
             ORDER BY {order_expr} {direction}, id
             LIMIT $3
            "#
        );

        let limit = query.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let mut q = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(&query.collection)
            .bind(query.filter_object())
            .bind(limit);
        if let Some(field) = order_field {
            q = q.bind(field);
        }

        let rows = q.fetch_all(pool).await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }
}

impl DocumentStore for PgStore {
    async fn create(&self, collection: &str, data: Value) -> Result<Document, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            RETURNING id, data, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(Uuid::new_v4().to_string())
        .bind(&data)
        .fetch_one(&mut *tx)
        .await?;

        Self::notify(&mut *tx, collection).await?;
        tx.commit().await?;

        Ok(row.into())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        // ---
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, data, created_at, updated_at
              FROM documents
             WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Document::from))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        Self::run_query(&self.pool, query).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<Document, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            UPDATE documents
               SET data = data || $3, updated_at = now()
             WHERE collection = $1 AND id = $2
            RETURNING id, data, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&patch)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        Self::notify(&mut *tx, collection).await?;
        tx.commit().await?;

        Ok(row.into())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        Self::notify(&mut *tx, collection).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        query: Query,
        callback: Callback,
    ) -> Result<Subscription, StoreError> {
        // ---
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        let pool = self.pool.clone();

        let task = tokio::spawn(async move {
            match Self::run_query(&pool, &query).await {
                Ok(docs) => callback(docs),
                Err(e) => tracing::warn!("initial snapshot for {} failed: {}", query.collection, e),
            }

            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::error!("change listener for {} stopped: {}", query.collection, e);
                        break;
                    }
                };
                if notification.payload() != query.collection {
                    continue;
                }
                match Self::run_query(&pool, &query).await {
                    Ok(docs) => callback(docs),
                    Err(e) => tracing::warn!("refresh of {} failed: {}", query.collection, e),
                }
            }
        });

        Ok(Subscription::new(task))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
