use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TodoStatus {
    #[default]
    #[serde(rename = "todo")]
    Todo,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "complete")]
    Complete,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Todo => "todo",
            TodoStatus::InProgress => "in progress",
            TodoStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid todo status `{0}` (expected one of: todo, in progress, complete)")]
pub struct ParseStatusError(pub String);

impl FromStr for TodoStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TodoStatus::Todo),
            "in progress" => Ok(TodoStatus::InProgress),
            "complete" => Ok(TodoStatus::Complete),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// The payload stored for every todo.
///
/// Dates are held at whole-second precision so the persisted form round-trips
/// without loss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub name: String,
    pub status: TodoStatus,
    #[serde(with = "timestamp")]
    pub created_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_date: DateTime<Utc>,
}

/// A todo together with its full store key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoDocument {
    pub id: String,
    pub value: Todo,
}

/// Result envelope for listing and searching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Todos {
    pub total: u64,
    pub documents: Vec<TodoDocument>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreateTodo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTodo {
    pub status: TodoStatus,
}

/// `YYYY-MM-DDTHH:MM:SSZ` (de)serialization for UTC timestamps.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn format(dt: &DateTime<Utc>) -> String { dt.format(FORMAT).to_string() }

    /// Parses the canonical form, falling back to RFC 3339 for documents
    /// written with an explicit offset or fractional seconds.
    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match NaiveDateTime::parse_from_str(s, FORMAT) {
            Ok(naive) => Ok(naive.and_utc()),
            Err(err) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| err),
        }
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
