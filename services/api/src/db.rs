//! Data Access Layer
//!
//! This module contains all the functions for interacting with the PostgreSQL database.
//! It uses `sqlx` for connection pooling and builds the listing filters at runtime
//! with `QueryBuilder`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use companion_core::{
    companion::{CompanionInsert, CompanionRecord},
    listing::{CompanionFilter, Condition, RowRange, like_pattern},
    store::{CompanionStore, StoreError},
};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{history::HistoryStore, models::SessionHistoryEntry};

const COMPANION_COLUMNS: &str = "id, created_at, name, subject, topic, style, duration, author";

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

#[derive(FromRow)]
struct CompanionRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    name: String,
    subject: String,
    topic: String,
    style: String,
    duration: i32,
    author: String,
}

impl From<CompanionRow> for CompanionRecord {
    fn from(row: CompanionRow) -> Self {
        Self {
            id: row.id,
            created_at: row.created_at,
            name: row.name,
            subject: row.subject,
            topic: row.topic,
            style: row.style,
            duration: row.duration,
            author: row.author,
        }
    }
}

/// Maps a driver error onto the store taxonomy.
fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.code().is_some_and(|code| code.starts_with("23")) => {
            StoreError::Constraint(db.message().to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

/// Companion ids are UUIDs; anything else cannot match a row.
fn parse_companion_id(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::NotFound)
}

fn push_condition(builder: &mut QueryBuilder<'_, Postgres>, condition: &Condition) {
    match condition {
        Condition::Contains { column, needle } => {
            builder
                .push(column.as_str())
                .push(" ILIKE ")
                .push_bind(like_pattern(needle));
        }
        Condition::Any(conditions) => {
            builder.push("(");
            for (i, inner) in conditions.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                push_condition(builder, inner);
            }
            builder.push(")");
        }
    }
}

/// Builds the listing query: filter clauses, stable ordering, then the row range.
fn listing_query(filter: &CompanionFilter, range: RowRange) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {COMPANION_COLUMNS} FROM companions"));
    if let CompanionFilter::All(conditions) = filter {
        for (i, condition) in conditions.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            push_condition(&mut builder, condition);
        }
    }
    builder
        .push(" ORDER BY created_at ASC, id ASC LIMIT ")
        .push_bind(i64::try_from(range.len()).unwrap_or(i64::MAX))
        .push(" OFFSET ")
        .push_bind(i64::try_from(range.from).unwrap_or(i64::MAX));
    builder
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CompanionStore for Db {
    async fn insert(&self, row: CompanionInsert) -> Result<Vec<CompanionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, CompanionRow>(&format!(
            r#"
            INSERT INTO companions (name, subject, topic, voice, style, duration, author)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COMPANION_COLUMNS}
            "#
        ))
        .bind(&row.fields.name)
        .bind(&row.fields.subject)
        .bind(&row.fields.topic)
        .bind(&row.fields.voice)
        .bind(&row.fields.style)
        .bind(row.fields.duration)
        .bind(&row.author)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(CompanionRecord::from).collect())
    }

    async fn select(
        &self,
        filter: &CompanionFilter,
        range: RowRange,
    ) -> Result<Vec<CompanionRecord>, StoreError> {
        let rows = listing_query(filter, range)
            .build_query_as::<CompanionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(CompanionRecord::from).collect())
    }

    async fn select_single(&self, id: &str) -> Result<Value, StoreError> {
        let id = parse_companion_id(id)?;
        sqlx::query_scalar::<_, Value>("SELECT to_jsonb(c) FROM companions c WHERE c.id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl HistoryStore for Db {
    async fn add_session(&self, companion_id: Uuid, user_id: Option<&str>) -> Result<()> {
        sqlx::query("INSERT INTO session_history (companion_id, user_id) VALUES ($1, $2)")
            .bind(companion_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent_sessions(&self, user_id: &str, limit: u32) -> Result<Vec<SessionHistoryEntry>> {
        let sessions = sqlx::query_as::<_, SessionHistoryEntry>(
            r#"
            SELECT h.id, h.companion_id, h.user_id, h.created_at,
                   c.name AS companion_name, c.subject, c.topic, c.duration
            FROM session_history h
            JOIN companions c ON c.id = h.companion_id
            WHERE h.user_id = $1
            ORDER BY h.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }
}
