use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::tags::{extract_tags, strip_tags};

/// Opaque task identity. Fresh ids are v4 UUIDs; ids loaded from storage are
/// kept verbatim whatever their shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// First eight characters, enough to tell tasks apart in a table.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub text: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub pinned: bool,

    #[serde(default)]
    pub due_at: Option<NaiveDate>,
}

/// Older data sometimes stores `null` where a value is expected.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Display text and tags derived from one raw input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub text: String,
    pub tags: Vec<String>,
}

impl ParsedInput {
    /// `None` when nothing but tags (or whitespace) was typed.
    pub fn parse(raw: &str) -> Option<Self> {
        let text = strip_tags(raw);
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text,
            tags: extract_tags(raw),
        })
    }
}

impl Task {
    pub fn from_input(raw: &str, due_at: Option<NaiveDate>) -> Option<Self> {
        let parsed = ParsedInput::parse(raw)?;
        Some(Self {
            id: TaskId::new(),
            text: parsed.text,
            completed: false,
            tags: parsed.tags,
            pinned: false,
            due_at,
        })
    }

    pub fn apply_input(&mut self, parsed: ParsedInput) {
        self.text = parsed.text;
        self.tags = parsed.tags;
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_active(&self) -> bool {
        !self.completed
    }
}
