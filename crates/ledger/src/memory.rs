//! In-memory ledger backend.
//!
//! The write half of the `RwLock` is the single-writer serialisation
//! point, so tail races cannot occur; `TailConflict` exists for backends
//! whose writers contend outside the process.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use gavel_core::event::Event;

use crate::chain::ChainState;
use crate::error::LedgerError;
use crate::traits::{EscalationPair, LedgerStore};
use crate::verify::{verify_events, ChainReport};

pub struct MemoryLedger {
    state: RwLock<ChainState>,
}

impl MemoryLedger {
    pub fn new(policy_version: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(ChainState::new(policy_version.into())),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn append(
        &self,
        actor_id: &str,
        action_type: &str,
        payload: Value,
    ) -> Result<String, LedgerError> {
        let mut state = self.state.write().await;
        Ok(state.append(actor_id, action_type, payload).id)
    }

    async fn get(&self, event_id: &str) -> Result<Option<Event>, LedgerError> {
        Ok(self.state.read().await.get(event_id).cloned())
    }

    async fn events(&self) -> Result<Vec<Event>, LedgerError> {
        Ok(self.state.read().await.events().to_vec())
    }

    async fn find_policy_eval_for_intent(
        &self,
        intent_event_id: &str,
    ) -> Result<Option<Event>, LedgerError> {
        Ok(self
            .state
            .read()
            .await
            .find_policy_eval_for_intent(intent_event_id)
            .cloned())
    }

    async fn chain_role(
        &self,
        chain_id: &str,
        actor_id: &str,
    ) -> Result<Option<String>, LedgerError> {
        Ok(self.state.read().await.chain_role(chain_id, actor_id))
    }

    async fn find_valid_approval(
        &self,
        actor_id: &str,
        action_type: &str,
        content: &str,
        ttl_seconds: i64,
    ) -> Result<Option<Event>, LedgerError> {
        Ok(self
            .state
            .read()
            .await
            .find_valid_approval(actor_id, action_type, content, ttl_seconds)
            .cloned())
    }

    async fn consume_approval(
        &self,
        approval_event_id: &str,
        actor_id: &str,
        payload: Value,
    ) -> Result<String, LedgerError> {
        let mut state = self.state.write().await;
        state
            .consume_approval(approval_event_id, actor_id, payload)
            .map(|event| event.id)
    }

    async fn resolution_for_intent(
        &self,
        intent_event_id: &str,
    ) -> Result<Option<Event>, LedgerError> {
        Ok(self
            .state
            .read()
            .await
            .resolution_for_intent(intent_event_id)
            .cloned())
    }

    async fn resolved_intent_ids(
        &self,
        intent_ids: &[String],
    ) -> Result<HashSet<String>, LedgerError> {
        Ok(self.state.read().await.resolved_intent_ids(intent_ids))
    }

    async fn escalated_with_intents(&self) -> Result<Vec<EscalationPair>, LedgerError> {
        Ok(self.state.read().await.escalated_with_intents())
    }

    async fn verify_chain(&self) -> Result<ChainReport, LedgerError> {
        Ok(verify_events(self.state.read().await.events()))
    }
}
