use std::time::Duration;

use anyhow::Result as AnyResult;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};

use crate::error::{Result, TriageError};
use crate::store::repo::{SnapshotRecord, SnapshotStore};

const STAGE: &str = "store";
const DATE_FMT: &str = "%Y-%m-%d";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &std::path::Path, busy_timeout: Duration) -> AnyResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> AnyResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> AnyResult<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS briefing_results (
                row_id              INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id            TEXT NOT NULL,
                subject             TEXT NOT NULL,
                sender              TEXT NOT NULL,
                preview             TEXT NOT NULL,
                priority            TEXT NOT NULL,
                addressed_directly  INTEGER NOT NULL,
                requires_action     INTEGER NOT NULL,
                folder              TEXT NOT NULL,
                mailbox             TEXT NOT NULL,
                received_at         TEXT NOT NULL,
                processed_at        TEXT NOT NULL,
                run_date            TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS briefing_results_run_date
                ON briefing_results (run_date);
            "#,
        )?;
        Ok(())
    }
}

fn ts(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into()))
}

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<SnapshotRecord> {
    let priority: String = r.get(4)?;
    let received: String = r.get(9)?;
    let processed: String = r.get(10)?;
    let run_date: String = r.get(11)?;
    Ok(SnapshotRecord {
        email_id: r.get(0)?,
        subject: r.get(1)?,
        sender: r.get(2)?,
        preview: r.get(3)?,
        priority: priority.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?,
        addressed_directly: r.get(5)?,
        requires_action: r.get(6)?,
        folder: r.get(7)?,
        mailbox: r.get(8)?,
        received_at: parse_ts(&received)?,
        processed_at: parse_ts(&processed)?,
        run_date: NaiveDate::parse_from_str(&run_date, DATE_FMT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, e.into())
        })?,
    })
}

impl SnapshotStore for SqliteStore {
    fn delete_date(&self, run_date: NaiveDate) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM briefing_results WHERE run_date = ?1",
                params![run_date.format(DATE_FMT).to_string()],
            )
            .map_err(|e| TriageError::transport(STAGE, e))
    }

    fn insert(&self, rec: &SnapshotRecord) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO briefing_results (
                    email_id, subject, sender, preview, priority,
                    addressed_directly, requires_action, folder, mailbox,
                    received_at, processed_at, run_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    rec.email_id,
                    rec.subject,
                    rec.sender,
                    rec.preview,
                    rec.priority.as_str(),
                    rec.addressed_directly,
                    rec.requires_action,
                    rec.folder,
                    rec.mailbox,
                    ts(&rec.received_at),
                    ts(&rec.processed_at),
                    rec.run_date.format(DATE_FMT).to_string(),
                ],
            )
            .map(|_| ())
            .map_err(|e| TriageError::write(rec.email_id.clone(), e))
    }

    fn list_date(&self, run_date: NaiveDate) -> Result<Vec<SnapshotRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT email_id, subject, sender, preview, priority,
                       addressed_directly, requires_action, folder, mailbox,
                       received_at, processed_at, run_date
                FROM briefing_results
                WHERE run_date = ?1
                ORDER BY CASE priority
                           WHEN 'urgent' THEN 0
                           WHEN 'high' THEN 1
                           WHEN 'medium' THEN 2
                           ELSE 3
                         END,
                         received_at DESC,
                         row_id ASC
                "#,
            )
            .map_err(|e| TriageError::transport(STAGE, e))?;

        let rows = stmt
            .query_map(params![run_date.format(DATE_FMT).to_string()], record_from_row)
            .map_err(|e| TriageError::transport(STAGE, e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| TriageError::transport(STAGE, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Priority;

    fn record(id: &str, priority: Priority, run_date: NaiveDate) -> SnapshotRecord {
        let received = DateTime::parse_from_rfc3339("2026-10-16T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        SnapshotRecord {
            email_id: id.to_string(),
            subject: "Re: O'Brien; DROP TABLE briefing_results; --".to_string(),
            sender: "Ann <ann@example.com>".to_string(),
            preview: "line one\nline two".to_string(),
            priority,
            addressed_directly: true,
            requires_action: false,
            folder: "INBOX".to_string(),
            mailbox: "me@example.com".to_string(),
            received_at: received,
            processed_at: received,
            run_date,
        }
    }

    #[test]
    fn insert_and_list_preserves_text_verbatim() {
        let store = SqliteStore::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let rec = record("INBOX:1", Priority::High, day);
        store.insert(&rec).unwrap();

        let rows = store.list_date(day).unwrap();
        assert_eq!(rows, vec![rec]);
    }

    #[test]
    fn delete_only_touches_its_date() {
        let store = SqliteStore::open_in_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        store.insert(&record("a", Priority::High, today)).unwrap();
        store.insert(&record("b", Priority::Urgent, today)).unwrap();
        store.insert(&record("c", Priority::High, yesterday)).unwrap();

        assert_eq!(store.delete_date(today).unwrap(), 2);
        assert!(store.list_date(today).unwrap().is_empty());
        assert_eq!(store.list_date(yesterday).unwrap().len(), 1);
    }

    #[test]
    fn listing_orders_by_priority() {
        let store = SqliteStore::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        store.insert(&record("fyi", Priority::Fyi, day)).unwrap();
        store.insert(&record("high", Priority::High, day)).unwrap();
        store.insert(&record("urgent", Priority::Urgent, day)).unwrap();

        let ids: Vec<_> = store
            .list_date(day)
            .unwrap()
            .into_iter()
            .map(|r| r.email_id)
            .collect();
        assert_eq!(ids, vec!["urgent", "high", "fyi"]);
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.db");
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        {
            let store = SqliteStore::open(&path, Duration::from_secs(5)).unwrap();
            store.insert(&record("a", Priority::High, day)).unwrap();
        }
        let store = SqliteStore::open(&path, Duration::from_secs(5)).unwrap();
        assert_eq!(store.list_date(day).unwrap().len(), 1);
    }
}
