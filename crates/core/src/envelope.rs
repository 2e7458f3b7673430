//! Proposal envelope parsing.
//!
//! The gateway accepts two encodings of a proposal. The envelope form
//! carries goal, scope, and chain threading; the legacy form is the flat
//! triple the first agents sent. Both normalize into [`Proposal`].
//!
//! Envelope:
//! `{actor_id, role?, tier_request?, goal?, scope?, expected_outcomes?,
//!   action: {action_type, content}, chain_id?}`
//!
//! Legacy:
//! `{actor_id, action_type, content, target_path?}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declared blast radius of a proposal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub allow_paths: Vec<String>,
    #[serde(default)]
    pub allow_commands: Vec<String>,
    #[serde(default)]
    pub allow_network: bool,
}

/// A normalized proposal, independent of wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub actor_id: String,
    pub role: Option<String>,
    pub tier_request: Option<u8>,
    pub goal: Option<String>,
    pub scope: Option<Scope>,
    pub expected_outcomes: Option<Value>,
    pub action_type: String,
    pub content: String,
    pub target_path: Option<String>,
    pub chain_id: Option<String>,
}

/// Why a request body failed to parse as a proposal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' has the wrong type")]
    InvalidField(&'static str),
}

fn required_str(body: &Value, key: &'static str) -> Result<String, EnvelopeError> {
    match body.get(key) {
        None | Some(Value::Null) => Err(EnvelopeError::MissingField(key)),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(EnvelopeError::MissingField(key)),
        Some(_) => Err(EnvelopeError::InvalidField(key)),
    }
}

fn optional_str(body: &Value, key: &'static str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Content may be a string or a structured document; structured content is
/// normalized to its compact JSON form for evaluation and matching.
fn content_string(value: &Value) -> Result<String, EnvelopeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string(value).map_err(|_| EnvelopeError::InvalidField("content"))
        }
        _ => Err(EnvelopeError::InvalidField("content")),
    }
}

/// Parse either encoding into a [`Proposal`].
pub fn parse_proposal(body: &Value) -> Result<Proposal, EnvelopeError> {
    if !body.is_object() {
        return Err(EnvelopeError::InvalidField("body"));
    }
    let actor_id = required_str(body, "actor_id")?;

    let (action_type, content) = match body.get("action") {
        Some(action @ Value::Object(_)) => {
            let action_type = required_str(action, "action_type")?;
            let content = action
                .get("content")
                .map(content_string)
                .transpose()?
                .ok_or(EnvelopeError::MissingField("content"))?;
            (action_type, content)
        }
        Some(_) => return Err(EnvelopeError::InvalidField("action")),
        None => {
            let action_type = required_str(body, "action_type")?;
            let content = body
                .get("content")
                .map(content_string)
                .transpose()?
                .ok_or(EnvelopeError::MissingField("content"))?;
            (action_type, content)
        }
    };

    let scope = match body.get("scope") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<Scope>(value.clone())
                .map_err(|_| EnvelopeError::InvalidField("scope"))?,
        ),
    };

    let tier_request = match body.get("tier_request") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_u64()
                .and_then(|t| u8::try_from(t).ok())
                .ok_or(EnvelopeError::InvalidField("tier_request"))?,
        ),
    };

    Ok(Proposal {
        actor_id,
        role: optional_str(body, "role"),
        tier_request,
        goal: optional_str(body, "goal"),
        scope,
        expected_outcomes: body.get("expected_outcomes").cloned().filter(|v| !v.is_null()),
        action_type,
        content,
        target_path: optional_str(body, "target_path"),
        chain_id: optional_str(body, "chain_id"),
    })
}

impl Proposal {
    /// The `INBOUND_INTENT` payload: the full envelope as received, with
    /// role and chain id already resolved by the gateway.
    pub fn intent_payload(&self, chain_id: &str, role: &str) -> Value {
        let mut map = Map::new();
        map.insert("action_type".into(), Value::String(self.action_type.clone()));
        map.insert("content".into(), Value::String(self.content.clone()));
        map.insert("chain_id".into(), Value::String(chain_id.to_string()));
        map.insert("role".into(), Value::String(role.to_string()));
        if let Some(goal) = &self.goal {
            map.insert("goal".into(), Value::String(goal.clone()));
        }
        if let Some(scope) = &self.scope {
            if let Ok(scope_value) = serde_json::to_value(scope) {
                map.insert("scope".into(), scope_value);
            }
        }
        if let Some(outcomes) = &self.expected_outcomes {
            map.insert("expected_outcomes".into(), outcomes.clone());
        }
        if let Some(tier) = self.tier_request {
            map.insert("tier_request".into(), Value::from(tier));
        }
        if let Some(target) = &self.target_path {
            map.insert("target_path".into(), Value::String(target.clone()));
        }
        Value::Object(map)
    }

    /// The `proposal` echo embedded in `POLICY_EVAL:*` payloads.
    pub fn evaluation_echo(&self) -> Value {
        let mut map = Map::new();
        map.insert("actor_id".into(), Value::String(self.actor_id.clone()));
        map.insert("action_type".into(), Value::String(self.action_type.clone()));
        map.insert("content".into(), Value::String(self.content.clone()));
        if let Some(target) = &self.target_path {
            map.insert("target_path".into(), Value::String(target.clone()));
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_form_parses() {
        let body = json!({
            "actor_id": "agent:coder",
            "action_type": "bash",
            "content": "echo hello",
        });
        let proposal = parse_proposal(&body).unwrap();
        assert_eq!(proposal.actor_id, "agent:coder");
        assert_eq!(proposal.action_type, "bash");
        assert_eq!(proposal.content, "echo hello");
        assert!(proposal.scope.is_none());
        assert!(proposal.chain_id.is_none());
    }

    #[test]
    fn envelope_form_parses() {
        let body = json!({
            "actor_id": "agent:coder",
            "role": "developer",
            "tier_request": 1,
            "goal": "add greeting",
            "scope": {"allow_paths": ["src/"], "allow_commands": ["echo"], "allow_network": false},
            "expected_outcomes": ["greeting printed"],
            "action": {"action_type": "bash", "content": "echo hello"},
            "chain_id": "chain-7",
        });
        let proposal = parse_proposal(&body).unwrap();
        assert_eq!(proposal.role.as_deref(), Some("developer"));
        assert_eq!(proposal.tier_request, Some(1));
        assert_eq!(proposal.goal.as_deref(), Some("add greeting"));
        assert_eq!(
            proposal.scope.as_ref().unwrap().allow_paths,
            vec!["src/".to_string()]
        );
        assert_eq!(proposal.chain_id.as_deref(), Some("chain-7"));
        assert_eq!(proposal.action_type, "bash");
    }

    #[test]
    fn structured_content_normalizes_to_compact_json() {
        let body = json!({
            "actor_id": "agent:coder",
            "action_type": "file_write",
            "content": {"path": "notes.txt", "text": "hi"},
        });
        let proposal = parse_proposal(&body).unwrap();
        assert_eq!(proposal.content, r#"{"path":"notes.txt","text":"hi"}"#);
    }

    #[test]
    fn missing_fields_are_named() {
        let err = parse_proposal(&json!({"action_type": "bash", "content": "x"})).unwrap_err();
        assert_eq!(err, EnvelopeError::MissingField("actor_id"));

        let err =
            parse_proposal(&json!({"actor_id": "a", "action": {"action_type": "bash"}}))
                .unwrap_err();
        assert_eq!(err, EnvelopeError::MissingField("content"));

        let err = parse_proposal(&json!({"actor_id": "a", "content": "x"})).unwrap_err();
        assert_eq!(err, EnvelopeError::MissingField("action_type"));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = parse_proposal(&json!({
            "actor_id": "a",
            "action_type": "bash",
            "content": 42,
        }))
        .unwrap_err();
        assert_eq!(err, EnvelopeError::InvalidField("content"));

        let err = parse_proposal(&json!({
            "actor_id": "a",
            "action": "not-an-object",
        }))
        .unwrap_err();
        assert_eq!(err, EnvelopeError::InvalidField("action"));
    }

    #[test]
    fn intent_payload_carries_scope_for_later_review() {
        let body = json!({
            "actor_id": "agent:coder",
            "scope": {"allow_paths": ["src/"]},
            "action": {"action_type": "bash", "content": "echo hi"},
        });
        let proposal = parse_proposal(&body).unwrap();
        let payload = proposal.intent_payload("chain-1", "developer");
        assert_eq!(payload["chain_id"], "chain-1");
        assert_eq!(payload["role"], "developer");
        assert_eq!(payload["scope"]["allow_paths"][0], "src/");
        assert_eq!(payload["content"], "echo hi");
    }
}
