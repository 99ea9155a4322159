//! Listing Queries
//!
//! Translates the subject/topic/pagination parameters of a listing page into a
//! store filter and an inclusive row range.

use crate::companion::ValidationIssue;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_PAGE: u32 = 1;

/// The subject filter value that means "every subject".
pub const ALL_SUBJECTS: &str = "all";

/// Filter, range and page parameters for one listing read.
///
/// Constructed per request through [`ListingQuery::new`], which enforces
/// `page >= 1` and `limit >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingQuery {
    limit: u32,
    page: u32,
    subject: Option<String>,
    topic: Option<String>,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            page: DEFAULT_PAGE,
            subject: None,
            topic: None,
        }
    }
}

impl ListingQuery {
    /// Builds a query, rejecting a zero page or limit.
    ///
    /// A blank subject or [`ALL_SUBJECTS`] clears the subject filter; a blank
    /// topic clears the topic filter.
    pub fn new(
        limit: u32,
        page: u32,
        subject: Option<String>,
        topic: Option<String>,
    ) -> Result<Self, ValidationIssue> {
        if limit < 1 {
            return Err(ValidationIssue::new("limit", "Must be at least 1"));
        }
        if page < 1 {
            return Err(ValidationIssue::new("page", "Must be at least 1"));
        }

        let subject = subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(ALL_SUBJECTS));
        let topic = topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            limit,
            page,
            subject,
            topic,
        })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// The rows covered by this page: `[(page-1)*limit, page*limit - 1]`.
    pub fn range(&self) -> RowRange {
        let limit = u64::from(self.limit);
        let from = (u64::from(self.page) - 1) * limit;
        RowRange {
            from,
            to: from + limit - 1,
        }
    }

    /// The filter clauses this query applies.
    pub fn filter(&self) -> CompanionFilter {
        let subject = self.subject.clone().map(Condition::subject);
        let topic = self.topic.clone().map(Condition::topic_or_name);

        match (subject, topic) {
            (Some(subject), Some(topic)) => CompanionFilter::All(vec![subject, topic]),
            (Some(subject), None) => CompanionFilter::All(vec![subject]),
            (None, Some(topic)) => CompanionFilter::All(vec![topic]),
            (None, None) => CompanionFilter::Unfiltered,
        }
    }
}

/// An inclusive range of zero-based row positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub from: u64,
    pub to: u64,
}

impl RowRange {
    /// Number of rows the range spans.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

/// Conjunction of conditions over the companion table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionFilter {
    Unfiltered,
    All(Vec<Condition>),
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Case-insensitive substring match of `needle` in `column`.
    Contains { column: Column, needle: String },
    /// Logical OR of the inner conditions.
    Any(Vec<Condition>),
}

impl Condition {
    pub fn subject(needle: String) -> Self {
        Condition::Contains {
            column: Column::Subject,
            needle,
        }
    }

    /// Topic matched against either the `topic` or the `name` column.
    pub fn topic_or_name(needle: String) -> Self {
        Condition::Any(vec![
            Condition::Contains {
                column: Column::Topic,
                needle: needle.clone(),
            },
            Condition::Contains {
                column: Column::Name,
                needle,
            },
        ])
    }

    /// Evaluates the condition against a column lookup.
    pub fn matches<'a>(&self, lookup: &impl Fn(Column) -> Option<&'a str>) -> bool {
        match self {
            Condition::Contains { column, needle } => lookup(*column)
                .is_some_and(|value| value.to_lowercase().contains(&needle.to_lowercase())),
            Condition::Any(conditions) => conditions.iter().any(|c| c.matches(lookup)),
        }
    }
}

/// Filterable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    Subject,
    Topic,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Subject => "subject",
            Column::Topic => "topic",
        }
    }
}

/// Escapes `%`, `_` and `\` so a needle is matched literally inside an
/// `ILIKE '%…%'` pattern.
pub fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
