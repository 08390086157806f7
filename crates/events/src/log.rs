//! Risk event log - append-only JSONL storage
//!
//! Each line is one JSON-serialized [`RiskEvent`]. The file is only ever
//! appended to. An in-memory mode keeps events in a vector instead.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::EventLogResult;
use crate::event::RiskEvent;

/// Audit/notification sink for risk events.
///
/// The ledger only produces events; delivery and formatting belong to the
/// collaborator behind the sink.
#[async_trait]
pub trait RiskEventSink: Send + Sync {
    async fn record(&self, event: RiskEvent) -> EventLogResult<()>;
}

enum Backend {
    File { path: PathBuf, file: File },
    Memory(Vec<RiskEvent>),
}

/// Append-only risk event log
pub struct RiskLog {
    backend: Mutex<Backend>,
}

impl RiskLog {
    /// Open (or create) a JSONL log at `path`
    pub fn open(path: impl AsRef<Path>) -> EventLogResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            backend: Mutex::new(Backend::File { path, file }),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Mutex::new(Backend::Memory(Vec::new())),
        }
    }

    pub async fn append(&self, event: &RiskEvent) -> EventLogResult<()> {
        let mut backend = self.backend.lock().await;
        match &mut *backend {
            Backend::File { file, .. } => {
                let json = serde_json::to_string(event)?;
                writeln!(file, "{}", json)?;
                file.flush()?;
            }
            Backend::Memory(events) => {
                // keep the serialization check so memory mode fails like file mode
                let _ = serde_json::to_string(event)?;
                events.push(event.clone());
            }
        }
        Ok(())
    }

    pub async fn read_all(&self) -> EventLogResult<Vec<RiskEvent>> {
        let backend = self.backend.lock().await;
        match &*backend {
            Backend::File { path, .. } => {
                let reader = BufReader::new(File::open(path)?);
                let mut events = Vec::new();
                for line in reader.lines() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    events.push(serde_json::from_str(&line)?);
                }
                Ok(events)
            }
            Backend::Memory(events) => Ok(events.clone()),
        }
    }

    pub async fn len(&self) -> EventLogResult<usize> {
        Ok(self.read_all().await?.len())
    }

    pub async fn is_empty(&self) -> EventLogResult<bool> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl RiskEventSink for RiskLog {
    async fn record(&self, event: RiskEvent) -> EventLogResult<()> {
        self.append(&event).await?;
        tracing::debug!(user_id = %event.user_id, kind = ?event.kind, "Risk event recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RiskEventKind;
    use stash_core::UserId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_log() {
        let log = RiskLog::in_memory();
        assert!(log.is_empty().await.unwrap());

        log.record(RiskEvent::gate_denied(UserId::new("alice"), "ip", "ip_blocked", "denylisted"))
            .await
            .unwrap();

        let events = log.read_all().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RiskEventKind::GateDenied);
    }

    #[tokio::test]
    async fn test_file_log_appends_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("risk").join("events.jsonl");

        {
            let log = RiskLog::open(&path).unwrap();
            log.record(RiskEvent::gate_denied(UserId::new("alice"), "geo", "geo_blocked", "FR"))
                .await
                .unwrap();
            log.record(RiskEvent::operational_error(UserId::new("bob"), "caps", "cap_exceeded", "timeout"))
                .await
                .unwrap();
        }

        let reopened = RiskLog::open(&path).unwrap();
        reopened
            .record(RiskEvent::gate_denied(UserId::new("carol"), "device", "device_blocked", "headless"))
            .await
            .unwrap();

        let events = reopened.read_all().await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].kind, RiskEventKind::OperationalError);
        assert_eq!(events[2].user_id, UserId::new("carol"));
    }
}
