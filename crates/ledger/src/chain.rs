//! Shared chain state and query logic for the built-in backends.
//!
//! Both backends keep the full chain in memory; the file backend
//! additionally mirrors every append to disk. All reads scan the in-memory
//! chain, so query semantics are identical across backends.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use gavel_core::event::{
    is_policy_eval, Event, APPROVAL_CONSUMED, HUMAN_APPROVAL_GRANTED, INBOUND_INTENT,
    RESOLUTION_ACTIONS,
};
use gavel_core::hash::{event_hash, GENESIS_HASH};
use gavel_core::timestamp;

use crate::error::LedgerError;
use crate::traits::EscalationPair;

#[derive(Debug)]
pub(crate) struct ChainState {
    events: Vec<Event>,
    index: HashMap<String, usize>,
    policy_version: String,
}

impl ChainState {
    pub(crate) fn new(policy_version: String) -> Self {
        Self {
            events: Vec::new(),
            index: HashMap::new(),
            policy_version,
        }
    }

    /// Rebuild state from a previously persisted chain.
    pub(crate) fn from_events(policy_version: String, events: Vec<Event>) -> Self {
        let index = events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        Self {
            events,
            index,
            policy_version,
        }
    }

    /// Build the next event and link it to the current tail.
    ///
    /// `created_at` is bumped past the tail when the wall clock has not
    /// advanced, keeping timestamp order equal to chain order.
    pub(crate) fn append(&mut self, actor_id: &str, action_type: &str, payload: Value) -> Event {
        let now = timestamp::now();
        let (previous_event_hash, created_at) = match self.events.last() {
            Some(tail) => {
                let created_at = if now > tail.created_at {
                    now
                } else {
                    timestamp::next_after(&tail.created_at).unwrap_or(now)
                };
                (tail.event_hash.clone(), created_at)
            }
            None => (GENESIS_HASH.to_string(), now),
        };

        let hash = event_hash(
            &previous_event_hash,
            actor_id,
            action_type,
            &payload,
            &self.policy_version,
            &created_at,
        );
        let event = Event {
            id: Uuid::new_v4().to_string(),
            created_at,
            actor_id: actor_id.to_string(),
            action_type: action_type.to_string(),
            intent_payload: payload,
            policy_version: self.policy_version.clone(),
            event_hash: hash,
            previous_event_hash,
        };
        self.index.insert(event.id.clone(), self.events.len());
        self.events.push(event.clone());
        event
    }

    /// Conditional `APPROVAL_CONSUMED` append: refuses when any existing
    /// consumption names the approval. Runs under the caller's write lock,
    /// so the check and the append are atomic.
    pub(crate) fn consume_approval(
        &mut self,
        approval_event_id: &str,
        actor_id: &str,
        mut payload: Value,
    ) -> Result<Event, LedgerError> {
        let already = self.events.iter().any(|e| {
            e.action_type == APPROVAL_CONSUMED
                && e.payload_str("approval_event_id") == Some(approval_event_id)
        });
        if already {
            return Err(LedgerError::AlreadyConsumed {
                approval_event_id: approval_event_id.to_string(),
            });
        }
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                "approval_event_id".to_string(),
                Value::String(approval_event_id.to_string()),
            );
        }
        Ok(self.append(actor_id, APPROVAL_CONSUMED, payload))
    }

    pub(crate) fn get(&self, event_id: &str) -> Option<&Event> {
        self.index.get(event_id).map(|&i| &self.events[i])
    }

    pub(crate) fn events(&self) -> &[Event] {
        &self.events
    }

    pub(crate) fn find_policy_eval_for_intent(&self, intent_event_id: &str) -> Option<&Event> {
        let explicit = self.events.iter().find(|e| {
            is_policy_eval(&e.action_type)
                && e.payload_str("intent_event_id") == Some(intent_event_id)
        });
        if explicit.is_some() {
            return explicit;
        }
        // Legacy pairing: earliest evaluation by the same actor at or
        // after the intent.
        let intent = self.get(intent_event_id)?;
        self.events.iter().find(|e| {
            is_policy_eval(&e.action_type)
                && e.actor_id == intent.actor_id
                && e.created_at >= intent.created_at
        })
    }

    pub(crate) fn chain_role(&self, chain_id: &str, actor_id: &str) -> Option<String> {
        self.events
            .iter()
            .find(|e| {
                e.action_type == INBOUND_INTENT
                    && e.actor_id == actor_id
                    && e.payload_str("chain_id") == Some(chain_id)
            })
            .and_then(|e| e.payload_str("role").map(str::to_string))
    }

    pub(crate) fn find_valid_approval(
        &self,
        actor_id: &str,
        action_type: &str,
        content: &str,
        ttl_seconds: i64,
    ) -> Option<&Event> {
        let now = time::OffsetDateTime::now_utc();
        self.events
            .iter()
            .rev()
            .filter(|e| e.action_type == HUMAN_APPROVAL_GRANTED)
            .find(|approval| {
                let within_ttl = timestamp::age_seconds(&approval.created_at, now)
                    .is_some_and(|age| age <= ttl_seconds);
                if !within_ttl {
                    return false;
                }
                let Some(intent) = approval
                    .payload_str("intent_event_id")
                    .and_then(|id| self.get(id))
                else {
                    return false;
                };
                intent.actor_id == actor_id
                    && intent.payload_str("action_type") == Some(action_type)
                    && intent.payload_str("content") == Some(content)
                    && !self.is_consumed(&approval.id)
            })
    }

    fn is_consumed(&self, approval_event_id: &str) -> bool {
        self.events.iter().any(|e| {
            e.action_type == APPROVAL_CONSUMED
                && e.payload_str("approval_event_id") == Some(approval_event_id)
        })
    }

    pub(crate) fn resolution_for_intent(&self, intent_event_id: &str) -> Option<&Event> {
        self.events.iter().find(|e| {
            RESOLUTION_ACTIONS.contains(&e.action_type.as_str())
                && e.references_intent(intent_event_id)
        })
    }

    pub(crate) fn resolved_intent_ids(&self, intent_ids: &[String]) -> HashSet<String> {
        let wanted: HashSet<&str> = intent_ids.iter().map(String::as_str).collect();
        let mut resolved = HashSet::new();
        for event in &self.events {
            if !RESOLUTION_ACTIONS.contains(&event.action_type.as_str()) {
                continue;
            }
            for key in ["intent_event_id", "current_intent_event_id"] {
                if let Some(id) = event.payload_str(key) {
                    if wanted.contains(id) {
                        resolved.insert(id.to_string());
                    }
                }
            }
        }
        resolved
    }

    pub(crate) fn escalated_with_intents(&self) -> Vec<EscalationPair> {
        let mut pairs: Vec<EscalationPair> = self
            .events
            .iter()
            .filter(|e| {
                is_policy_eval(&e.action_type) && e.payload_str("decision") == Some("ESCALATED")
            })
            .filter_map(|policy| {
                let intent = match policy
                    .payload_str("intent_event_id")
                    .and_then(|id| self.get(id))
                {
                    Some(intent) => intent,
                    // Legacy pairing: most recent intent by the same actor
                    // at or before the evaluation.
                    None => self
                        .events
                        .iter()
                        .rev()
                        .find(|e| {
                            e.action_type == INBOUND_INTENT
                                && e.actor_id == policy.actor_id
                                && e.created_at <= policy.created_at
                        })?,
                };
                Some(EscalationPair {
                    policy_event_id: policy.id.clone(),
                    intent_event_id: intent.id.clone(),
                    actor_id: policy.actor_id.clone(),
                    intent_created_at: intent.created_at.clone(),
                })
            })
            .collect();
        pairs.reverse();
        pairs
    }
}
