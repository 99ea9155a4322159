//! Companion Query Service
//!
//! Creates companions on behalf of the authenticated caller, lists them with
//! subject/topic filters and pagination, and reads single records through the
//! companion schema.

use crate::{
    auth::AuthProvider,
    companion::{
        CompanionInsert, CompanionRecord, NewCompanion, Subject, ValidationIssue,
        validate_companion_row,
    },
    listing::ListingQuery,
    store::{CompanionStore, StoreError},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

const CREATION_FAILED: &str = "Failed to create a companion";

#[derive(Debug, Error)]
pub enum CompanionError {
    /// The insert failed or returned no row.
    #[error("{0}")]
    Creation(String),
    /// A listing read failed.
    #[error("Failed to query companions: {0}")]
    Query(String),
    /// A stored record does not conform to the companion schema.
    #[error("Companion record failed validation ({} issue(s))", .issues.len())]
    Validation { issues: Vec<ValidationIssue> },
}

/// Reads and writes companions through a [`CompanionStore`].
#[derive(Clone)]
pub struct CompanionService {
    store: Arc<dyn CompanionStore>,
}

impl CompanionService {
    pub fn new(store: Arc<dyn CompanionStore>) -> Self {
        Self { store }
    }

    /// Inserts a companion authored by the current caller.
    ///
    /// A missing identity is passed through as an absent author; rejecting
    /// the row is left to the store.
    pub async fn create_companion(
        &self,
        auth: &dyn AuthProvider,
        fields: NewCompanion,
    ) -> Result<CompanionRecord, CompanionError> {
        let author = auth.current_user_id();
        if author.is_none() {
            warn!("Creating a companion without an authenticated caller");
        }

        let rows = self
            .store
            .insert(CompanionInsert { fields, author })
            .await
            .map_err(|e| CompanionError::Creation(e.to_string()))?;

        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| CompanionError::Creation(CREATION_FAILED.to_string()))?;
        info!(companion_id = %record.id, author = %record.author, "Companion created");
        Ok(record)
    }

    /// Lists companions matching the query's filters within its page.
    pub async fn list_companions(
        &self,
        query: &ListingQuery,
    ) -> Result<Vec<CompanionRecord>, CompanionError> {
        let range = query.range();
        debug!(?query, from = range.from, to = range.to, "Listing companions");
        self.store
            .select(&query.filter(), range)
            .await
            .map_err(|e| CompanionError::Query(e.to_string()))
    }

    /// Reads one companion by id.
    ///
    /// Any store failure, not only a missing row, yields `Ok(None)`. A row
    /// that is found but violates the schema is an error.
    pub async fn get_companion(&self, id: &str) -> Result<Option<CompanionRecord>, CompanionError> {
        let row = match self.store.select_single(id).await {
            Ok(row) => row,
            Err(StoreError::NotFound) => {
                debug!(companion_id = %id, "Companion not found");
                return Ok(None);
            }
            Err(e) => {
                warn!(companion_id = %id, error = %e, "Companion read failed; treating as absent");
                return Ok(None);
            }
        };

        validate_companion_row(&row)
            .map(Some)
            .map_err(|issues| {
                warn!(companion_id = %id, ?issues, "Stored companion failed validation");
                CompanionError::Validation { issues }
            })
    }

    /// The subjects offered by the subject filter.
    pub fn list_subjects(&self) -> &'static [Subject] {
        &Subject::ALL
    }
}
