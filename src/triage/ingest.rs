use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::domain::message::{Message, RawMessage};
use crate::error::TriageError;
use crate::mail::reader::MailboxReader;

/// What happened to one folder during ingestion.
#[derive(Debug)]
pub enum FolderOutcome {
    Fetched {
        folder: String,
        received: usize,
        kept: usize,
    },
    Failed {
        folder: String,
        error: TriageError,
    },
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub messages: Vec<Message>,
    pub folders: Vec<FolderOutcome>,
}

impl IngestReport {
    pub fn failed_folders(&self) -> usize {
        self.folders
            .iter()
            .filter(|f| matches!(f, FolderOutcome::Failed { .. }))
            .count()
    }

    pub fn all_folders_failed(&self) -> bool {
        !self.folders.is_empty() && self.failed_folders() == self.folders.len()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TimestampError {
    /// Parsed, but carries no offset; comparing it against UTC would be a guess.
    NoTimezone,
    Unparseable,
}

/// Parses a timestamp that carries an explicit zone (`Z` or an offset), in
/// RFC 3339 or RFC 2822 form, and normalizes it to UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimestampError> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Ok(d.with_timezone(&Utc));
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(s) {
        return Ok(d.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok());
    if naive {
        Err(TimestampError::NoTimezone)
    } else {
        Err(TimestampError::Unparseable)
    }
}

/// Inclusive on both ends.
pub fn in_window(t: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    t >= now - window && t <= now
}

pub struct Ingestor<'a> {
    reader: &'a dyn MailboxReader,
    folders: Vec<String>,
    page_size: u32,
    mailbox: String,
    window: Duration,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        reader: &'a dyn MailboxReader,
        folders: Vec<String>,
        page_size: u32,
        mailbox: impl Into<String>,
        window: Duration,
    ) -> Self {
        Self {
            reader,
            folders,
            page_size,
            mailbox: mailbox.into(),
            window,
        }
    }

    /// Reads every folder in order and keeps messages received within the
    /// window ending at `now`. A failing folder is recorded and skipped.
    /// Messages are not deduplicated across folders.
    pub fn fetch(&self, now: DateTime<Utc>) -> IngestReport {
        let mut report = IngestReport::default();

        for folder in &self.folders {
            log::info!("fetching folder '{folder}'");
            match self.reader.read(folder, self.page_size, &self.mailbox) {
                Ok(raws) => {
                    let received = raws.len();
                    let kept = self.keep_recent(folder, raws, now);
                    log::info!("folder '{folder}': {} of {received} within window", kept.len());
                    report.folders.push(FolderOutcome::Fetched {
                        folder: folder.clone(),
                        received,
                        kept: kept.len(),
                    });
                    report.messages.extend(kept);
                }
                Err(error) => {
                    log::warn!("folder '{folder}' skipped: {error}");
                    report.folders.push(FolderOutcome::Failed {
                        folder: folder.clone(),
                        error,
                    });
                }
            }
        }

        report
    }

    fn keep_recent(&self, folder: &str, raws: Vec<RawMessage>, now: DateTime<Utc>) -> Vec<Message> {
        let mut kept = Vec::new();
        for raw in raws {
            match parse_timestamp(&raw.date) {
                Ok(t) if in_window(t, now, self.window) => {
                    kept.push(Message::from_raw(raw, folder, t));
                }
                Ok(t) => log::debug!("{}: received {t} is outside the window", raw.id),
                Err(TimestampError::NoTimezone) => {
                    log::warn!("{}: timestamp '{}' has no timezone; excluded", raw.id, raw.date)
                }
                Err(TimestampError::Unparseable) => {
                    log::warn!("{}: unparseable timestamp '{}'; excluded", raw.id, raw.date)
                }
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeReader {
        folders: HashMap<String, Vec<RawMessage>>,
        calls: RefCell<Vec<(String, u32)>>,
    }

    impl MailboxReader for FakeReader {
        fn read(&self, folder: &str, max_items: u32, _mailbox: &str) -> Result<Vec<RawMessage>> {
            self.calls.borrow_mut().push((folder.to_string(), max_items));
            self.folders
                .get(folder)
                .cloned()
                .ok_or_else(|| TriageError::transport("imap", format!("no folder {folder}")))
        }
    }

    fn raw(id: &str, date: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            from: "a@example.com".to_string(),
            subject: "s".to_string(),
            date: date.to_string(),
            ..RawMessage::default()
        }
    }

    fn now() -> DateTime<Utc> {
        parse_timestamp("2026-10-17T12:00:00Z").unwrap()
    }

    #[test]
    fn timestamps_are_normalized_to_utc() {
        let a = parse_timestamp("2026-10-17T14:00:00+02:00").unwrap();
        let b = parse_timestamp("2026-10-17T12:00:00Z").unwrap();
        let c = parse_timestamp("Sat, 17 Oct 2026 07:00:00 -0500").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn naive_and_garbage_timestamps_are_rejected() {
        assert_eq!(
            parse_timestamp("2026-10-17T12:00:00"),
            Err(TimestampError::NoTimezone)
        );
        assert_eq!(parse_timestamp("yesterday"), Err(TimestampError::Unparseable));
        assert_eq!(parse_timestamp(""), Err(TimestampError::Unparseable));
    }

    #[test]
    fn window_lower_bound_is_inclusive() {
        let window = Duration::hours(24);
        let edge = now() - window;
        assert!(in_window(edge, now(), window));
        assert!(!in_window(edge - Duration::microseconds(1), now(), window));
        assert!(in_window(now(), now(), window));
        assert!(!in_window(now() + Duration::microseconds(1), now(), window));
    }

    #[test]
    fn boundary_message_survives_fetch() {
        let reader = FakeReader {
            folders: HashMap::from([(
                "INBOX".to_string(),
                vec![
                    raw("edge", "2026-10-16T12:00:00.000000Z"),
                    raw("before", "2026-10-16T11:59:59.999999Z"),
                ],
            )]),
            calls: RefCell::new(vec![]),
        };
        let ingestor = Ingestor::new(
            &reader,
            vec!["INBOX".to_string()],
            100,
            "me@example.com",
            Duration::hours(24),
        );
        let report = ingestor.fetch(now());
        let ids: Vec<_> = report.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["edge"]);
    }

    #[test]
    fn failing_folder_is_isolated_and_order_is_kept() {
        let reader = FakeReader {
            folders: HashMap::from([
                (
                    "A".to_string(),
                    vec![
                        raw("a1", "2026-10-17T10:00:00Z"),
                        raw("a2", "2026-10-17T09:00:00Z"),
                        raw("stale", "2026-10-10T09:00:00Z"),
                    ],
                ),
                ("C".to_string(), vec![raw("c1", "2026-10-17T11:00:00Z")]),
            ]),
            calls: RefCell::new(vec![]),
        };
        let ingestor = Ingestor::new(
            &reader,
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            50,
            "me@example.com",
            Duration::hours(24),
        );
        let report = ingestor.fetch(now());

        let ids: Vec<_> = report.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "c1"]);
        assert_eq!(report.messages[2].source_folder, "C");
        assert_eq!(report.failed_folders(), 1);
        assert!(!report.all_folders_failed());
        assert_eq!(
            *reader.calls.borrow(),
            vec![("A".into(), 50), ("B".into(), 50), ("C".into(), 50)]
        );
    }

    #[test]
    fn every_folder_failing_yields_empty_report() {
        let reader = FakeReader {
            folders: HashMap::new(),
            calls: RefCell::new(vec![]),
        };
        let ingestor = Ingestor::new(
            &reader,
            vec!["A".to_string(), "B".to_string()],
            100,
            "me@example.com",
            Duration::hours(24),
        );
        let report = ingestor.fetch(now());
        assert!(report.messages.is_empty());
        assert!(report.all_folders_failed());
    }

    #[test]
    fn same_message_in_two_folders_is_kept_twice() {
        let dup = raw("dup", "2026-10-17T10:00:00Z");
        let reader = FakeReader {
            folders: HashMap::from([
                ("A".to_string(), vec![dup.clone()]),
                ("B".to_string(), vec![dup]),
            ]),
            calls: RefCell::new(vec![]),
        };
        let ingestor = Ingestor::new(
            &reader,
            vec!["A".to_string(), "B".to_string()],
            100,
            "me@example.com",
            Duration::hours(24),
        );
        let report = ingestor.fetch(now());
        let folders: Vec<_> = report
            .messages
            .iter()
            .map(|m| m.source_folder.as_str())
            .collect();
        assert_eq!(folders, vec!["A", "B"]);
    }
}
