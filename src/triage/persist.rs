use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::message::{Message, MessageId};
use crate::store::repo::{SnapshotRecord, SnapshotStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistReport {
    /// Classified messages handed in.
    pub total: usize,
    /// Messages passing the importance predicate.
    pub important: usize,
    pub inserted: usize,
    /// Rows removed from the previous snapshot; `None` when the delete failed.
    pub cleared: Option<usize>,
    pub failed: Vec<MessageId>,
}

pub struct Persister<'a> {
    store: &'a dyn SnapshotStore,
    mailbox: String,
}

impl<'a> Persister<'a> {
    pub fn new(store: &'a dyn SnapshotStore, mailbox: impl Into<String>) -> Self {
        Self {
            store,
            mailbox: mailbox.into(),
        }
    }

    /// Replaces the snapshot for `run_date` with the important subset of
    /// `messages`.
    ///
    /// A failed delete is logged and the inserts still happen; duplicate rows
    /// for the date are preferable to losing the run. Each insert stands alone.
    pub fn persist(
        &self,
        messages: &[Message],
        run_date: NaiveDate,
        processed_at: DateTime<Utc>,
    ) -> PersistReport {
        let important: Vec<&Message> = messages.iter().filter(|m| m.is_important()).collect();
        let mut report = PersistReport {
            total: messages.len(),
            important: important.len(),
            ..PersistReport::default()
        };
        log::info!(
            "persisting {} important of {} classified messages for {run_date}",
            report.important,
            report.total
        );

        match self.store.delete_date(run_date) {
            Ok(n) => {
                log::info!("cleared {n} rows from the previous snapshot");
                report.cleared = Some(n);
            }
            Err(e) => log::warn!("could not clear snapshot for {run_date}: {e}"),
        }

        for m in important {
            let Some(record) =
                SnapshotRecord::from_message(m, &self.mailbox, processed_at, run_date)
            else {
                continue;
            };
            match self.store.insert(&record) {
                Ok(()) => report.inserted += 1,
                Err(e) => {
                    log::warn!("insert skipped: {e}");
                    report.failed.push(m.id.clone());
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{Classification, Priority};
    use crate::error::{Result, TriageError};
    use crate::store::sqlite::SqliteStore;
    use std::cell::{Cell, RefCell};

    fn msg(id: &str, priority: Priority, requires_action: bool) -> Message {
        Message {
            id: id.to_string(),
            source_folder: "INBOX".to_string(),
            sender: "a@example.com".to_string(),
            subject: format!("subject {id}"),
            preview: "preview".to_string(),
            received_at: DateTime::parse_from_rfc3339("2026-10-17T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            to: vec![],
            cc: vec![],
            classification: Some(Classification {
                priority,
                addressed_directly: true,
                requires_action,
            }),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn sample() -> Vec<Message> {
        vec![
            msg("u", Priority::Urgent, false),
            msg("h", Priority::High, false),
            msg("m", Priority::Medium, false),
            msg("f-act", Priority::Fyi, true),
            msg("f", Priority::Fyi, false),
        ]
    }

    /// Store that fails on demand.
    #[derive(Default)]
    struct FlakyStore {
        fail_delete: bool,
        fail_ids: Vec<&'static str>,
        rows: RefCell<Vec<SnapshotRecord>>,
        deletes: Cell<usize>,
    }

    impl SnapshotStore for FlakyStore {
        fn delete_date(&self, run_date: NaiveDate) -> Result<usize> {
            self.deletes.set(self.deletes.get() + 1);
            if self.fail_delete {
                return Err(TriageError::transport("store", "connection reset"));
            }
            let mut rows = self.rows.borrow_mut();
            let before = rows.len();
            rows.retain(|r| r.run_date != run_date);
            Ok(before - rows.len())
        }

        fn insert(&self, record: &SnapshotRecord) -> Result<()> {
            if self.fail_ids.contains(&record.email_id.as_str()) {
                return Err(TriageError::write(record.email_id.clone(), "value too long"));
            }
            self.rows.borrow_mut().push(record.clone());
            Ok(())
        }

        fn list_date(&self, run_date: NaiveDate) -> Result<Vec<SnapshotRecord>> {
            Ok(self
                .rows
                .borrow()
                .iter()
                .filter(|r| r.run_date == run_date)
                .cloned()
                .collect())
        }
    }

    #[test]
    fn only_important_messages_are_written() {
        let store = SqliteStore::open_in_memory().unwrap();
        let persister = Persister::new(&store, "me@example.com");
        let report = persister.persist(&sample(), day(), Utc::now());

        assert_eq!(report.total, 5);
        assert_eq!(report.important, 3);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.cleared, Some(0));

        let mut ids: Vec<_> = store
            .list_date(day())
            .unwrap()
            .into_iter()
            .map(|r| r.email_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["f-act", "h", "u"]);
    }

    #[test]
    fn persisting_twice_gives_the_same_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        let persister = Persister::new(&store, "me@example.com");
        let processed = Utc::now();

        persister.persist(&sample(), day(), processed);
        let first = store.list_date(day()).unwrap();
        let second_report = persister.persist(&sample(), day(), processed);
        let second = store.list_date(day()).unwrap();

        assert_eq!(second_report.cleared, Some(3));
        assert_eq!(first, second);
    }

    #[test]
    fn failed_delete_still_inserts() {
        let store = FlakyStore {
            fail_delete: true,
            ..FlakyStore::default()
        };
        let persister = Persister::new(&store, "me@example.com");
        let report = persister.persist(&sample(), day(), Utc::now());

        assert_eq!(report.cleared, None);
        assert_eq!(report.inserted, 3);
        assert_eq!(store.deletes.get(), 1);
    }

    #[test]
    fn failed_insert_is_skipped() {
        let store = FlakyStore {
            fail_ids: vec!["h"],
            ..FlakyStore::default()
        };
        let persister = Persister::new(&store, "me@example.com");
        let report = persister.persist(&sample(), day(), Utc::now());

        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed, vec!["h".to_string()]);
        assert!(report.inserted <= report.important && report.important <= report.total);
        assert_eq!(store.list_date(day()).unwrap().len(), 2);
    }

    #[test]
    fn unclassified_messages_never_reach_the_store() {
        let mut m = msg("x", Priority::Urgent, true);
        m.classification = None;
        let store = FlakyStore::default();
        let persister = Persister::new(&store, "me@example.com");
        let report = persister.persist(&[m], day(), Utc::now());
        assert_eq!(report.important, 0);
        assert!(store.rows.borrow().is_empty());
    }
}
