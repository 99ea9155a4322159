//! Companion Records and Schema Validation
//!
//! A companion is a configured tutoring persona. This module holds the stored
//! record, the creation form with its field rules, the fixed subject list, and
//! the schema check applied to raw rows read back from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Default session length offered by the creation form, in minutes.
pub const DEFAULT_DURATION_MINUTES: i32 = 15;

/// A companion as stored by the hosted relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub subject: String,
    pub topic: String,
    pub style: String,
    pub duration: i32,
    pub author: String,
}

/// The fields a caller supplies to create a companion.
///
/// `author` is not part of the form; it is attached by the query service from
/// the caller's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompanion {
    pub name: String,
    pub subject: String,
    pub topic: String,
    pub voice: String,
    pub style: String,
    pub duration: i32,
}

impl NewCompanion {
    /// Applies the creation form rules and reports every violated field.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let required = [
            ("name", &self.name, "Companion is required"),
            ("subject", &self.subject, "Subject is required"),
            ("topic", &self.topic, "Topic is required"),
            ("voice", &self.voice, "Voice is required"),
            ("style", &self.style, "Style is required"),
        ];
        for (path, value, message) in required {
            if value.is_empty() {
                issues.push(ValidationIssue::new(path, message));
            }
        }
        if self.duration < 1 {
            issues.push(ValidationIssue::new("duration", "Duration is required"));
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

/// The row handed to the store on insert: the form fields plus the author.
///
/// The author stays optional here; an unauthenticated caller still reaches the
/// store, which is expected to reject the row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanionInsert {
    #[serde(flatten)]
    pub fields: NewCompanion,
    pub author: Option<String>,
}

/// One schema or form violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Subjects a companion can teach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Maths,
    Language,
    Science,
    History,
    Coding,
    Geography,
    Economics,
    Finance,
    Business,
}

impl Subject {
    pub const ALL: [Subject; 9] = [
        Subject::Maths,
        Subject::Language,
        Subject::Science,
        Subject::History,
        Subject::Coding,
        Subject::Geography,
        Subject::Economics,
        Subject::Finance,
        Subject::Business,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Maths => "maths",
            Subject::Language => "language",
            Subject::Science => "science",
            Subject::History => "history",
            Subject::Coding => "coding",
            Subject::Geography => "geography",
            Subject::Economics => "economics",
            Subject::Finance => "finance",
            Subject::Business => "business",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy)]
enum FieldKind {
    Uuid,
    Timestamp,
    Text,
    Integer,
}

const COMPANION_SCHEMA: [(&str, FieldKind); 8] = [
    ("id", FieldKind::Uuid),
    ("created_at", FieldKind::Timestamp),
    ("name", FieldKind::Text),
    ("subject", FieldKind::Text),
    ("topic", FieldKind::Text),
    ("style", FieldKind::Text),
    ("duration", FieldKind::Integer),
    ("author", FieldKind::Text),
];

/// Validates a raw row against the companion schema.
///
/// Every field is checked so the caller receives the full list of violations,
/// not just the first one. Columns outside the schema are ignored.
pub fn validate_companion_row(row: &Value) -> Result<CompanionRecord, Vec<ValidationIssue>> {
    let Some(object) = row.as_object() else {
        return Err(vec![ValidationIssue::new("", "Expected object")]);
    };

    let issues: Vec<ValidationIssue> = COMPANION_SCHEMA
        .iter()
        .filter_map(|(path, kind)| check_field(object, path, *kind).err())
        .collect();
    if !issues.is_empty() {
        return Err(issues);
    }

    let record = CompanionRecord {
        id: object["id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_default(),
        created_at: object["created_at"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
        name: text(object, "name"),
        subject: text(object, "subject"),
        topic: text(object, "topic"),
        style: text(object, "style"),
        duration: object["duration"]
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or_default(),
        author: text(object, "author"),
    };
    Ok(record)
}

fn text(object: &Map<String, Value>, key: &str) -> String {
    object[key].as_str().unwrap_or_default().to_string()
}

fn check_field(
    object: &Map<String, Value>,
    path: &str,
    kind: FieldKind,
) -> Result<(), ValidationIssue> {
    let value = match object.get(path) {
        None | Some(Value::Null) => return Err(ValidationIssue::new(path, "Required")),
        Some(value) => value,
    };

    let ok = match kind {
        FieldKind::Text => value.is_string(),
        FieldKind::Uuid => value.as_str().is_some_and(|s| Uuid::parse_str(s).is_ok()),
        FieldKind::Timestamp => value
            .as_str()
            .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
        FieldKind::Integer => value
            .as_i64()
            .is_some_and(|n| i32::try_from(n).is_ok()),
    };
    if ok {
        return Ok(());
    }

    let expected = match kind {
        FieldKind::Text => "Expected string",
        FieldKind::Uuid => "Expected uuid string",
        FieldKind::Timestamp => "Expected RFC 3339 timestamp",
        FieldKind::Integer => "Expected integer",
    };
    Err(ValidationIssue::new(path, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_row() -> Value {
        json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "created_at": "2024-01-15T10:30:00+00:00",
            "name": "Countsy the Number Wizard",
            "subject": "maths",
            "topic": "Derivatives and Integrals",
            "style": "casual",
            "duration": 30,
            "author": "user_123"
        })
    }

    fn form() -> NewCompanion {
        NewCompanion {
            name: "Neura".to_string(),
            subject: "science".to_string(),
            topic: "Neural networks of the brain".to_string(),
            voice: "female".to_string(),
            style: "formal".to_string(),
            duration: DEFAULT_DURATION_MINUTES,
        }
    }

    #[test]
    fn test_valid_row_passes() {
        let record = validate_companion_row(&valid_row()).expect("row should validate");
        assert_eq!(record.name, "Countsy the Number Wizard");
        assert_eq!(record.duration, 30);
        assert_eq!(record.author, "user_123");
        assert_eq!(
            record.id,
            Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap()
        );
    }

    #[test]
    fn test_missing_field_is_reported() {
        let mut row = valid_row();
        row.as_object_mut().unwrap().remove("topic");

        let issues = validate_companion_row(&row).unwrap_err();
        assert_eq!(issues, vec![ValidationIssue::new("topic", "Required")]);
    }

    #[test]
    fn test_all_violations_are_collected() {
        let mut row = valid_row();
        let object = row.as_object_mut().unwrap();
        object.insert("duration".to_string(), json!("thirty"));
        object.insert("author".to_string(), Value::Null);
        object.insert("id".to_string(), json!("not-a-uuid"));

        let issues = validate_companion_row(&row).unwrap_err();
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["id", "duration", "author"]);
    }

    #[test]
    fn test_non_object_row() {
        let issues = validate_companion_row(&json!([1, 2])).unwrap_err();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let mut row = valid_row();
        row.as_object_mut()
            .unwrap()
            .insert("voice".to_string(), json!("female"));
        assert!(validate_companion_row(&row).is_ok());
    }

    #[test]
    fn test_form_rules() {
        assert!(form().validate().is_ok());

        let mut bad = form();
        bad.name = String::new();
        bad.duration = 0;
        let issues = bad.validate().unwrap_err();
        assert_eq!(
            issues,
            vec![
                ValidationIssue::new("name", "Companion is required"),
                ValidationIssue::new("duration", "Duration is required"),
            ]
        );
    }

    #[test]
    fn test_whitespace_only_fields_are_present() {
        let mut spaced = form();
        spaced.topic = "   ".to_string();
        assert!(spaced.validate().is_ok());
    }

    #[test]
    fn test_insert_row_flattens_fields() {
        let row = CompanionInsert {
            fields: form(),
            author: None,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["name"], "Neura");
        assert_eq!(json["voice"], "female");
        assert!(json["author"].is_null());
    }

    #[test]
    fn test_subject_wire_names() {
        assert_eq!(Subject::ALL.len(), 9);
        assert_eq!(serde_json::to_string(&Subject::Maths).unwrap(), "\"maths\"");
        assert_eq!(Subject::Geography.to_string(), "geography");
    }
}
