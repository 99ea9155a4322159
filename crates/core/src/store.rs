//! Hosted Store Seam
//!
//! The companion catalogue lives in a hosted relational store. This module
//! defines the operations the query service consumes and an in-memory
//! implementation used for development and tests.

use crate::{
    companion::{CompanionInsert, CompanionRecord},
    listing::{Column, CompanionFilter, RowRange},
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Errors reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No rows returned")]
    NotFound,
    #[error("Constraint violated: {0}")]
    Constraint(String),
    #[error("Store error: {0}")]
    Backend(String),
}

/// The operations the query service issues against the hosted store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompanionStore: Send + Sync {
    /// Inserts one row and returns the rows the store reports as created.
    async fn insert(&self, row: CompanionInsert) -> Result<Vec<CompanionRecord>, StoreError>;

    /// Reads the rows matching `filter`, restricted to `range`.
    async fn select(
        &self,
        filter: &CompanionFilter,
        range: RowRange,
    ) -> Result<Vec<CompanionRecord>, StoreError>;

    /// Reads exactly one row by id, undecoded.
    ///
    /// Fails with [`StoreError::NotFound`] when no row matches.
    async fn select_single(&self, id: &str) -> Result<Value, StoreError>;
}

/// A [`CompanionStore`] holding rows in process memory, in insertion order.
///
/// Rows are kept as raw JSON so that malformed rows can be seeded and observed
/// through [`CompanionStore::select_single`].
#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<Vec<Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw row without any checks.
    pub async fn seed_raw(&self, row: Value) {
        self.rows.write().await.push(row);
    }

    /// Appends a well-formed record.
    pub async fn seed(&self, record: &CompanionRecord) -> Result<(), StoreError> {
        let row = serde_json::to_value(record).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.seed_raw(row).await;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn row_matches(row: &Value, filter: &CompanionFilter) -> bool {
    match filter {
        CompanionFilter::Unfiltered => true,
        CompanionFilter::All(conditions) => {
            let lookup = |column: Column| row.get(column.as_str()).and_then(Value::as_str);
            conditions.iter().all(|c| c.matches(&lookup))
        }
    }
}

#[async_trait]
impl CompanionStore for InMemoryStore {
    async fn insert(&self, row: CompanionInsert) -> Result<Vec<CompanionRecord>, StoreError> {
        let author = row.author.ok_or_else(|| {
            StoreError::Constraint(
                "null value in column \"author\" violates not-null constraint".to_string(),
            )
        })?;

        let record = CompanionRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            name: row.fields.name,
            subject: row.fields.subject,
            topic: row.fields.topic,
            style: row.fields.style,
            duration: row.fields.duration,
            author,
        };

        let mut stored =
            serde_json::to_value(&record).map_err(|e| StoreError::Backend(e.to_string()))?;
        if let Some(object) = stored.as_object_mut() {
            object.insert("voice".to_string(), Value::String(row.fields.voice));
        }
        self.rows.write().await.push(stored);
        Ok(vec![record])
    }

    async fn select(
        &self,
        filter: &CompanionFilter,
        range: RowRange,
    ) -> Result<Vec<CompanionRecord>, StoreError> {
        let rows = self.rows.read().await;
        let skip = usize::try_from(range.from).unwrap_or(usize::MAX);
        let take = usize::try_from(range.len()).unwrap_or(usize::MAX);

        // Undecodable rows are skipped and logged.
        Ok(rows
            .iter()
            .filter(|row| row_matches(row, filter))
            .skip(skip)
            .take(take)
            .filter_map(|row| match serde_json::from_value::<CompanionRecord>(row.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(id = ?row.get("id"), error = %e, "Skipping undecodable companion row");
                    None
                }
            })
            .collect())
    }

    async fn select_single(&self, id: &str) -> Result<Value, StoreError> {
        let rows = self.rows.read().await;
        let mut matching = rows
            .iter()
            .filter(|row| row.get("id").and_then(Value::as_str) == Some(id));

        match (matching.next(), matching.next()) {
            (Some(row), None) => Ok(row.clone()),
            (None, _) => Err(StoreError::NotFound),
            (Some(_), Some(_)) => Err(StoreError::Backend(
                "multiple rows returned for a single-row read".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{companion::NewCompanion, listing::ListingQuery};
    use serde_json::json;

    fn insert_row(name: &str, subject: &str, topic: &str, author: Option<&str>) -> CompanionInsert {
        CompanionInsert {
            fields: NewCompanion {
                name: name.to_string(),
                subject: subject.to_string(),
                topic: topic.to_string(),
                voice: "male".to_string(),
                style: "casual".to_string(),
                duration: 15,
            },
            author: author.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_keeps_voice() {
        let store = InMemoryStore::new();
        let created = store
            .insert(insert_row("Neura", "science", "Brain", Some("user_1")))
            .await
            .unwrap();
        assert_eq!(created.len(), 1);

        let raw = store
            .select_single(&created[0].id.to_string())
            .await
            .unwrap();
        assert_eq!(raw["voice"], "male");
        assert_eq!(raw["author"], "user_1");
    }

    #[tokio::test]
    async fn test_insert_without_author_violates_constraint() {
        let store = InMemoryStore::new();
        let err = store
            .insert(insert_row("Neura", "science", "Brain", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_select_applies_filter_then_range() {
        let store = InMemoryStore::new();
        for i in 0..4 {
            store
                .insert(insert_row(&format!("M{i}"), "maths", "Algebra", Some("u")))
                .await
                .unwrap();
            store
                .insert(insert_row(&format!("S{i}"), "science", "Cells", Some("u")))
                .await
                .unwrap();
        }

        let query = ListingQuery::new(2, 2, Some("MATH".into()), None).unwrap();
        let rows = store.select(&query.filter(), query.range()).await.unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["M2", "M3"]);
    }

    #[tokio::test]
    async fn test_select_skips_corrupt_rows() {
        let store = InMemoryStore::new();
        store
            .insert(insert_row("Neura", "science", "Brain", Some("u")))
            .await
            .unwrap();
        store
            .seed_raw(json!({ "id": "corrupt-1", "name": "Broken", "subject": "science" }))
            .await;
        store
            .insert(insert_row("Verba", "language", "Poetry", Some("u")))
            .await
            .unwrap();

        let query = ListingQuery::default();
        let rows = store.select(&query.filter(), query.range()).await.unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Neura", "Verba"]);
    }

    #[tokio::test]
    async fn test_select_single_missing_row() {
        let store = InMemoryStore::new();
        store.seed_raw(json!({ "id": "a" })).await;
        assert!(matches!(
            store.select_single("b").await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(store.select_single("a").await.unwrap()["id"], "a");
    }
}
