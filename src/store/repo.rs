use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::message::{Message, MessageId, Priority};
use crate::error::Result;
use crate::mail::decoders::truncate_chars;

/// Longest preview written to the store.
pub const STORED_PREVIEW_CHARS: usize = 500;

/// One persisted row of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub email_id: MessageId,
    pub subject: String,
    pub sender: String,
    pub preview: String,
    pub priority: Priority,
    pub addressed_directly: bool,
    pub requires_action: bool,
    pub folder: String,
    pub mailbox: String,
    pub received_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub run_date: NaiveDate,
}

impl SnapshotRecord {
    /// `None` for an unclassified message. Free text is cleaned here so no
    /// store ever sees raw control characters.
    pub fn from_message(
        m: &Message,
        mailbox: &str,
        processed_at: DateTime<Utc>,
        run_date: NaiveDate,
    ) -> Option<Self> {
        let c = m.classification?;
        Some(Self {
            email_id: m.id.clone(),
            subject: clean_text(&m.subject),
            sender: clean_text(&m.sender),
            preview: truncate_chars(&clean_text(&m.preview), STORED_PREVIEW_CHARS),
            priority: c.priority,
            addressed_directly: c.addressed_directly,
            requires_action: c.requires_action,
            folder: m.source_folder.clone(),
            mailbox: mailbox.to_string(),
            received_at: m.received_at,
            processed_at,
            run_date,
        })
    }
}

/// Drops control characters (NUL included) except newline and tab.
pub fn clean_text(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Persistence for snapshots, keyed by run date.
pub trait SnapshotStore {
    /// Removes every record tagged with `run_date`; returns how many went.
    fn delete_date(&self, run_date: NaiveDate) -> Result<usize>;
    /// Writes one record. Failures are per record.
    fn insert(&self, record: &SnapshotRecord) -> Result<()>;
    /// The snapshot for `run_date`, most urgent first.
    fn list_date(&self, run_date: NaiveDate) -> Result<Vec<SnapshotRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Classification;

    #[test]
    fn control_characters_are_removed() {
        assert_eq!(clean_text("a\u{0}b\u{7}c\nd\te"), "abc\nd\te");
        assert_eq!(clean_text("O'Brien \"quoted\""), "O'Brien \"quoted\"");
    }

    #[test]
    fn record_requires_classification_and_caps_preview() {
        let mut m = Message {
            id: "INBOX:1".into(),
            source_folder: "INBOX".into(),
            sender: "a@example.com".into(),
            subject: "hi".into(),
            preview: "x".repeat(800),
            received_at: Utc::now(),
            to: vec![],
            cc: vec![],
            classification: None,
        };
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert!(SnapshotRecord::from_message(&m, "me@example.com", Utc::now(), date).is_none());

        m.classification = Some(Classification {
            priority: Priority::High,
            addressed_directly: false,
            requires_action: true,
        });
        let r = SnapshotRecord::from_message(&m, "me@example.com", Utc::now(), date).unwrap();
        assert_eq!(r.preview.chars().count(), STORED_PREVIEW_CHARS);
        assert_eq!(r.mailbox, "me@example.com");
        assert!(r.requires_action);
    }
}
