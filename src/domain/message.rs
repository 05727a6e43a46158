use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier; the only key used to correlate pipeline stages.
pub type MessageId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Fyi,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Fyi => "fyi",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "medium" | "normal" => Ok(Priority::Medium),
            "fyi" | "low" => Ok(Priority::Fyi),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mailbox item as returned by a [`crate::mail::reader::MailboxReader`].
///
/// `date` must carry explicit timezone information (RFC 3339 or RFC 2822).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub id: MessageId,
    pub from: String,
    pub subject: String,
    pub preview: String,
    pub date: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub priority: Priority,
    pub addressed_directly: bool,
    pub requires_action: bool,
}

/// One mailbox item flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub source_folder: String,
    pub sender: String,
    pub subject: String,
    pub preview: String,
    pub received_at: DateTime<Utc>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub classification: Option<Classification>,
}

impl Message {
    pub fn from_raw(raw: RawMessage, folder: &str, received_at: DateTime<Utc>) -> Self {
        Self {
            id: raw.id,
            source_folder: folder.to_string(),
            sender: raw.from,
            subject: raw.subject,
            preview: raw.preview,
            received_at,
            to: raw.to,
            cc: raw.cc,
            classification: None,
        }
    }

    pub fn priority(&self) -> Option<Priority> {
        self.classification.map(|c| c.priority)
    }

    /// `priority in {urgent, high} OR requires_action`. Unclassified messages
    /// are never important.
    pub fn is_important(&self) -> bool {
        match self.classification {
            Some(c) => {
                matches!(c.priority, Priority::Urgent | Priority::High) || c.requires_action
            }
            None => false,
        }
    }
}

/// The model's per-message answer. The `is_to_email` / `needs_response`
/// aliases are accepted for older prompt wording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub id: MessageId,
    pub priority: Priority,
    #[serde(alias = "is_to_email", default)]
    pub addressed_directly: bool,
    #[serde(alias = "needs_response", default)]
    pub requires_action: bool,
}

impl ClassificationResult {
    pub fn classification(&self) -> Classification {
        Classification {
            priority: self.priority,
            addressed_directly: self.addressed_directly,
            requires_action: self.requires_action,
        }
    }
}
