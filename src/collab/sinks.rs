//! Side-effecting action sinks: notifications, calendar entries, maintenance log.
//!
//! Callers assume at-least-once delivery; the controller never deduplicates.
//! The in-memory sinks ([`Outbox`], [`Calendar`], [`MaintenanceLog`]) keep
//! every accepted entry for inspection and number them `PREFIX-1000`,
//! `PREFIX-1001`, … in acceptance order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorResult;

/// Acknowledgement returned by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub status: String,
    pub id: String,
}

/// Sends notifications (e.g. email) to people.
pub trait NotificationSink: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str, cc: &[String]) -> CollaboratorResult<Receipt>;
}

/// Creates calendar entries.
pub trait SchedulingSink: Send + Sync {
    fn create(&self, subject: &str, when: NaiveDate, details: &str) -> CollaboratorResult<Receipt>;
}

/// Appends to the maintenance log.
pub trait MaintenanceLogSink: Send + Sync {
    fn append(
        &self,
        equipment_id: &str,
        description: &str,
        when: DateTime<Utc>,
    ) -> CollaboratorResult<Receipt>;
}

const FIRST_ID: usize = 1000;

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Outbox ──────────────────────────────────────────────────────────────

/// A notification accepted by the [`Outbox`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentNotification {
    pub id: String,
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Records notifications instead of delivering them.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<SentNotification>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// All accepted notifications.
    pub fn sent(&self) -> Vec<SentNotification> {
        guard(&self.sent).clone()
    }

    pub fn len(&self) -> usize {
        guard(&self.sent).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        guard(&self.sent).clear();
    }
}

impl NotificationSink for Outbox {
    fn send(&self, to: &str, subject: &str, body: &str, cc: &[String]) -> CollaboratorResult<Receipt> {
        let mut sent = guard(&self.sent);
        let id = format!("EMAIL-{}", FIRST_ID + sent.len());
        sent.push(SentNotification {
            id: id.clone(),
            to: to.into(),
            cc: cc.to_vec(),
            subject: subject.into(),
            body: body.into(),
        });
        tracing::info!(%id, to, subject, "notification recorded");
        Ok(Receipt {
            status: "sent".into(),
            id,
        })
    }
}

// ── Calendar ────────────────────────────────────────────────────────────

/// An entry accepted by the [`Calendar`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    pub id: String,
    pub subject: String,
    pub when: NaiveDate,
    pub details: String,
}

/// Records calendar entries.
#[derive(Debug, Default)]
pub struct Calendar {
    entries: Mutex<Vec<ScheduledEntry>>,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ScheduledEntry> {
        guard(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        guard(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        guard(&self.entries).clear();
    }
}

impl SchedulingSink for Calendar {
    fn create(&self, subject: &str, when: NaiveDate, details: &str) -> CollaboratorResult<Receipt> {
        let mut entries = guard(&self.entries);
        let id = format!("CAL-{}", FIRST_ID + entries.len());
        entries.push(ScheduledEntry {
            id: id.clone(),
            subject: subject.into(),
            when,
            details: details.into(),
        });
        tracing::info!(%id, %when, subject, "calendar entry recorded");
        Ok(Receipt {
            status: "scheduled".into(),
            id,
        })
    }
}

// ── MaintenanceLog ──────────────────────────────────────────────────────

/// An entry accepted by the [`MaintenanceLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub equipment_id: String,
    pub description: String,
    pub when: DateTime<Utc>,
}

/// Append-only maintenance log.
///
/// Appends are serialized behind one lock, so concurrent sessions logging
/// against the same equipment never lose an entry.
#[derive(Debug, Default)]
pub struct MaintenanceLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MaintenanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        guard(&self.entries).clone()
    }

    /// Entries for one equipment item, oldest first.
    pub fn for_equipment(&self, equipment_id: &str) -> Vec<LogEntry> {
        guard(&self.entries)
            .iter()
            .filter(|e| e.equipment_id == equipment_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        guard(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        guard(&self.entries).clear();
    }
}

impl MaintenanceLogSink for MaintenanceLog {
    fn append(
        &self,
        equipment_id: &str,
        description: &str,
        when: DateTime<Utc>,
    ) -> CollaboratorResult<Receipt> {
        let mut entries = guard(&self.entries);
        let id = format!("MAINT-{}", FIRST_ID + entries.len());
        entries.push(LogEntry {
            id: id.clone(),
            equipment_id: equipment_id.into(),
            description: description.into(),
            when,
        });
        tracing::info!(%id, equipment_id, "maintenance entry recorded");
        Ok(Receipt {
            status: "logged".into(),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn outbox_numbers_and_resets() {
        let outbox = Outbox::new();
        let r1 = outbox.send("a@example.com", "s1", "b1", &[]).unwrap();
        let r2 = outbox
            .send("b@example.com", "s2", "b2", &["c@example.com".into()])
            .unwrap();
        assert_eq!(r1.id, "EMAIL-1000");
        assert_eq!(r2.id, "EMAIL-1001");
        assert_eq!(r2.status, "sent");
        assert_eq!(outbox.sent()[1].cc, vec!["c@example.com".to_string()]);

        outbox.reset();
        assert!(outbox.is_empty());
        let r3 = outbox.send("a@example.com", "s3", "b3", &[]).unwrap();
        assert_eq!(r3.id, "EMAIL-1000");
    }

    #[test]
    fn calendar_records_date() {
        let cal = Calendar::new();
        let when = NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();
        let r = cal.create("Re-calibrate pump", when, "facility FAC-AB-001").unwrap();
        assert_eq!(r.id, "CAL-1000");
        assert_eq!(cal.entries()[0].when, when);
    }

    #[test]
    fn maintenance_log_concurrent_appends_are_not_lost() {
        let log = Arc::new(MaintenanceLog::new());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    log.append("EQ-PUMP-01", &format!("entry {i}"), Utc::now())
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 32);
        assert_eq!(log.for_equipment("EQ-PUMP-01").len(), 32);
        let mut ids: Vec<String> = log.entries().into_iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
    }
}
