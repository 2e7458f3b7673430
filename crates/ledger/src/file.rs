//! Append-only JSONL file backend.
//!
//! One event per line, written in chain order and flushed per append. The
//! file is the durable encoding: `gavel verify-chain <path>` re-reads it
//! out of process and recomputes every hash with the same canonical
//! serializer used at append time.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use gavel_core::event::Event;

use crate::chain::ChainState;
use crate::error::LedgerError;
use crate::traits::{EscalationPair, LedgerStore};
use crate::verify::{verify_events, ChainReport};

#[derive(Debug)]
struct FileInner {
    chain: ChainState,
    file: File,
}

#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    inner: RwLock<FileInner>,
}

/// Read a persisted chain without constructing a store.
///
/// Used by the out-of-process verifier; tolerates a missing trailing
/// newline but rejects unparseable lines.
pub fn read_chain_file(path: impl AsRef<Path>) -> Result<Vec<Event>, LedgerError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LedgerError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| LedgerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event =
            serde_json::from_str(&line).map_err(|e| LedgerError::Corrupt {
                path: path.display().to_string(),
                line: line_no + 1,
                reason: e.to_string(),
            })?;
        events.push(event);
    }
    Ok(events)
}

impl FileLedger {
    /// Open (or create) a ledger file and load its chain.
    pub fn open(
        path: impl AsRef<Path>,
        policy_version: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let events = if path.exists() {
            read_chain_file(&path)?
        } else {
            Vec::new()
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LedgerError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            inner: RwLock::new(FileInner {
                chain: ChainState::from_events(policy_version.into(), events),
                file,
            }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, inner: &mut FileInner, event: &Event) -> Result<(), LedgerError> {
        let line = serde_json::to_string(event)
            .map_err(|e| LedgerError::Backend(format!("event serialization failed: {}", e)))?;
        writeln!(inner.file, "{}", line).map_err(|source| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        inner.file.flush().map_err(|source| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[async_trait]
impl LedgerStore for FileLedger {
    async fn append(
        &self,
        actor_id: &str,
        action_type: &str,
        payload: Value,
    ) -> Result<String, LedgerError> {
        let mut inner = self.inner.write().await;
        let event = inner.chain.append(actor_id, action_type, payload);
        self.persist(&mut inner, &event)?;
        Ok(event.id)
    }

    async fn get(&self, event_id: &str) -> Result<Option<Event>, LedgerError> {
        Ok(self.inner.read().await.chain.get(event_id).cloned())
    }

    async fn events(&self) -> Result<Vec<Event>, LedgerError> {
        Ok(self.inner.read().await.chain.events().to_vec())
    }

    async fn find_policy_eval_for_intent(
        &self,
        intent_event_id: &str,
    ) -> Result<Option<Event>, LedgerError> {
        Ok(self
            .inner
            .read()
            .await
            .chain
            .find_policy_eval_for_intent(intent_event_id)
            .cloned())
    }

    async fn chain_role(
        &self,
        chain_id: &str,
        actor_id: &str,
    ) -> Result<Option<String>, LedgerError> {
        Ok(self.inner.read().await.chain.chain_role(chain_id, actor_id))
    }

    async fn find_valid_approval(
        &self,
        actor_id: &str,
        action_type: &str,
        content: &str,
        ttl_seconds: i64,
    ) -> Result<Option<Event>, LedgerError> {
        Ok(self
            .inner
            .read()
            .await
            .chain
            .find_valid_approval(actor_id, action_type, content, ttl_seconds)
            .cloned())
    }

    async fn consume_approval(
        &self,
        approval_event_id: &str,
        actor_id: &str,
        payload: Value,
    ) -> Result<String, LedgerError> {
        let mut inner = self.inner.write().await;
        let event = inner
            .chain
            .consume_approval(approval_event_id, actor_id, payload)?;
        self.persist(&mut inner, &event)?;
        Ok(event.id)
    }

    async fn resolution_for_intent(
        &self,
        intent_event_id: &str,
    ) -> Result<Option<Event>, LedgerError> {
        Ok(self
            .inner
            .read()
            .await
            .chain
            .resolution_for_intent(intent_event_id)
            .cloned())
    }

    async fn resolved_intent_ids(
        &self,
        intent_ids: &[String],
    ) -> Result<HashSet<String>, LedgerError> {
        Ok(self.inner.read().await.chain.resolved_intent_ids(intent_ids))
    }

    async fn escalated_with_intents(&self) -> Result<Vec<EscalationPair>, LedgerError> {
        Ok(self.inner.read().await.chain.escalated_with_intents())
    }

    async fn verify_chain(&self) -> Result<ChainReport, LedgerError> {
        Ok(verify_events(self.inner.read().await.chain.events()))
    }
}
