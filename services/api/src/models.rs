//! API and Database Models
//!
//! This module defines the request and response bodies of the REST API, with
//! `utoipa` schemas for the OpenAPI document, and the session history rows
//! mapped with `sqlx`.

use chrono::{DateTime, Utc};
use companion_core::companion::{
    CompanionRecord, DEFAULT_DURATION_MINUTES, NewCompanion, ValidationIssue,
};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Companion {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    #[schema(example = "maths")]
    pub subject: String,
    pub topic: String,
    #[schema(example = "casual")]
    pub style: String,
    #[schema(example = 15)]
    pub duration: i32,
    pub author: String,
}

impl From<CompanionRecord> for Companion {
    fn from(record: CompanionRecord) -> Self {
        Self {
            id: record.id,
            created_at: record.created_at,
            name: record.name,
            subject: record.subject,
            topic: record.topic,
            style: record.style,
            duration: record.duration,
            author: record.author,
        }
    }
}

/// Accepts a JSON number or a numeric string for `duration`.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Integer(i64),
    Float(f64),
    Text(String),
}

fn coerce_duration<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        NumberOrString::Integer(n) => n.to_string(),
        NumberOrString::Float(n) if n.fract() == 0.0 => format!("{n:.0}"),
        NumberOrString::Float(n) => n.to_string(),
        NumberOrString::Text(s) => s,
    }))
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct CreateCompanionPayload {
    #[serde(default)]
    #[schema(example = "Countsy the Number Wizard")]
    pub name: String,
    #[serde(default)]
    #[schema(example = "maths")]
    pub subject: String,
    #[serde(default)]
    #[schema(example = "Derivatives and Integrals")]
    pub topic: String,
    #[serde(default)]
    #[schema(example = "male")]
    pub voice: String,
    #[serde(default)]
    #[schema(example = "casual")]
    pub style: String,
    /// Session length in minutes; a number or a numeric string. Defaults to 15.
    #[serde(default, deserialize_with = "coerce_duration")]
    #[schema(value_type = Option<i32>, example = 15)]
    pub duration: Option<String>,
}

impl CreateCompanionPayload {
    /// Coerces the payload into form fields and applies the form rules.
    pub fn into_new_companion(self) -> Result<NewCompanion, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let duration = match self.duration.as_deref().map(str::trim) {
            None => DEFAULT_DURATION_MINUTES,
            Some(raw) => raw.parse::<i32>().unwrap_or_else(|_| {
                let message = if raw.parse::<f64>().is_ok() {
                    "Expected integer"
                } else {
                    "Expected number"
                };
                issues.push(ValidationIssue::new("duration", message));
                DEFAULT_DURATION_MINUTES
            }),
        };

        let fields = NewCompanion {
            name: self.name,
            subject: self.subject,
            topic: self.topic,
            voice: self.voice,
            style: self.style,
            duration,
        };
        if let Err(form_issues) = fields.validate() {
            issues.extend(form_issues);
        }

        if issues.is_empty() { Ok(fields) } else { Err(issues) }
    }
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListCompanionsParams {
    /// Case-insensitive substring of the subject; `all` disables the filter.
    pub subject: Option<String>,
    /// Case-insensitive substring of the topic or the name.
    pub topic: Option<String>,
    /// 1-indexed page number.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Maximum number of sessions to return.
    pub limit: Option<u32>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SubjectOption {
    #[schema(example = "maths")]
    pub value: String,
    #[schema(example = "Maths")]
    pub label: String,
}

/// A row of the `session_history` table joined with its companion.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct SessionHistoryEntry {
    pub id: i64,
    #[schema(value_type = String, format = Uuid)]
    pub companion_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub companion_name: String,
    pub subject: String,
    pub topic: String,
    pub duration: i32,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl From<ValidationIssue> for Issue {
    fn from(issue: ValidationIssue) -> Self {
        Self {
            path: issue.path,
            message: issue.message,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            issues: Vec::new(),
        }
    }
}
