//! Thin synchronous client for a running gateway.
//!
//! Backs the operator subcommands (`gavel propose`, `gavel approve`,
//! `gavel deny`, `gavel escalations`). Non-2xx statuses are part of the
//! protocol (202 escalated, 403 denied), so they come back as values,
//! not errors.

use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub(crate) enum ClientError {
    #[error("request to gateway failed: {0}")]
    Transport(#[from] ureq::Error),
}

pub(crate) struct GatewayClient {
    base_url: String,
    agent: ureq::Agent,
}

impl GatewayClient {
    pub(crate) fn new(base_url: &str) -> Self {
        // 202/403/409 are protocol outcomes here, not transport errors.
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: config.into(),
        }
    }

    fn post(
        &self,
        path: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<(u16, Value), ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.agent.post(&url);
        if let Some(token) = bearer {
            request = request.header("authorization", &format!("Bearer {}", token));
        }
        let mut response = request.send_json(body)?;
        let status = response.status().as_u16();
        let value = response
            .body_mut()
            .read_json::<Value>()
            .unwrap_or(Value::Null);
        Ok((status, value))
    }

    fn get(&self, path: &str) -> Result<(u16, Value), ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut response = self.agent.get(&url).call()?;
        let status = response.status().as_u16();
        let value = response
            .body_mut()
            .read_json::<Value>()
            .unwrap_or(Value::Null);
        Ok((status, value))
    }

    pub(crate) fn propose(
        &self,
        actor_id: &str,
        action_type: &str,
        content: &str,
        chain_id: Option<&str>,
    ) -> Result<(u16, Value), ClientError> {
        let mut body = json!({
            "actor_id": actor_id,
            "action_type": action_type,
            "content": content,
        });
        if let Some(chain_id) = chain_id {
            body["chain_id"] = Value::String(chain_id.to_string());
        }
        self.post("/propose", &body, None)
    }

    pub(crate) fn approve(
        &self,
        token: &str,
        intent_event_id: &str,
        policy_event_id: &str,
    ) -> Result<(u16, Value), ClientError> {
        let body = json!({
            "intent_event_id": intent_event_id,
            "policy_event_id": policy_event_id,
        });
        self.post("/approve", &body, Some(token))
    }

    pub(crate) fn deny(
        &self,
        token: &str,
        intent_event_id: &str,
        policy_event_id: &str,
        reason: &str,
    ) -> Result<(u16, Value), ClientError> {
        let body = json!({
            "intent_event_id": intent_event_id,
            "policy_event_id": policy_event_id,
            "reason": reason,
        });
        self.post("/deny", &body, Some(token))
    }

    pub(crate) fn execute(&self, proposal_id: &str) -> Result<(u16, Value), ClientError> {
        self.post("/execute", &json!({"proposal_id": proposal_id}), None)
    }

    pub(crate) fn escalations(&self) -> Result<(u16, Value), ClientError> {
        self.get("/escalations")
    }
}

/// Print a gateway response for an operator: status line plus pretty body.
pub(crate) fn print_response(status: u16, body: &Value) {
    println!("HTTP {}", status);
    println!(
        "{}",
        serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
    );
}
