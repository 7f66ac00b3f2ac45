use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use vigil_common::types::EventRecord;
use vigil_ingest::SourceAdapter;

use crate::config::SourceConfig;

/// JSON-RPC 2.0 client for a Zabbix-compatible monitoring source.
///
/// Authenticates lazily with `user.login` and keeps the session token
/// until a call is rejected as unauthorised, then re-authenticates once
/// and retries. The ingestion core only sees the [`SourceAdapter`] trait;
/// this protocol is a replaceable convenience.
pub struct JsonRpcSource {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
    fetch_limit: u64,
    token: Mutex<Option<String>>,
    request_id: AtomicU64,
}

impl JsonRpcSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("Failed to build source HTTP client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            fetch_limit: config.fetch_limit,
            token: Mutex::new(None),
            request_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value, auth: Option<&str>) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let mut body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        if let Some(token) = auth {
            body["auth"] = Value::String(token.to_string());
        }

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;
        if !resp.status().is_success() {
            bail!("{method} returned HTTP {}", resp.status());
        }
        let envelope: Value = resp
            .json()
            .await
            .with_context(|| format!("{method} returned invalid JSON"))?;

        if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("data")
                .and_then(Value::as_str)
                .or_else(|| error.get("message").and_then(Value::as_str))
                .unwrap_or("unknown error");
            bail!("{method} rejected: {message}");
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow!("{method} response had no result"))
    }

    async fn ensure_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(token) = token.as_ref() {
            return Ok(token.clone());
        }
        let result = self
            .call(
                "user.login",
                json!({ "username": self.username, "password": self.password }),
                None,
            )
            .await?;
        let session = result
            .as_str()
            .ok_or_else(|| anyhow!("user.login returned a non-string session"))?
            .to_string();
        tracing::info!(url = %self.url, "Authenticated with monitoring source");
        *token = Some(session.clone());
        Ok(session)
    }

    async fn drop_token(&self) {
        self.token.lock().await.take();
    }

    /// Run an authenticated call, re-authenticating once if the session
    /// was invalidated on the source side.
    async fn call_authed(&self, method: &str, params: Value) -> Result<Value> {
        let token = self.ensure_token().await?;
        match self.call(method, params.clone(), Some(&token)).await {
            Ok(result) => Ok(result),
            Err(e) if is_auth_error(&e) => {
                tracing::warn!(method, "Session rejected, re-authenticating");
                self.drop_token().await;
                let token = self.ensure_token().await?;
                self.call(method, params, Some(&token)).await
            }
            Err(e) => Err(e),
        }
    }
}

fn is_auth_error(e: &anyhow::Error) -> bool {
    let msg = e.to_string().to_lowercase();
    msg.contains("not authorised")
        || msg.contains("not authorized")
        || msg.contains("session terminated")
}

fn str_field(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric fields arrive as JSON strings from Zabbix-style sources.
fn int_field(obj: &Value, key: &str) -> Option<i64> {
    match obj.get(key) {
        Some(Value::String(s)) => s.parse().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    }
}

fn to_event_record(problem: &Value) -> EventRecord {
    let host = problem
        .get("hosts")
        .and_then(|hosts| hosts.get(0))
        .and_then(|h| str_field(h, "host"))
        .unwrap_or_else(|| "Unknown".to_string());
    EventRecord {
        event_id: str_field(problem, "eventid").unwrap_or_default(),
        problem_id: str_field(problem, "objectid"),
        host,
        name: str_field(problem, "name").unwrap_or_else(|| "Unnamed Problem".to_string()),
        severity: int_field(problem, "severity").unwrap_or(2) as i32,
        clock: int_field(problem, "clock").unwrap_or_else(|| chrono::Utc::now().timestamp()),
        raw: problem.clone(),
    }
}

#[async_trait]
impl SourceAdapter for JsonRpcSource {
    async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
        let result = self
            .call_authed(
                "problem.get",
                json!({
                    "output": ["eventid", "objectid", "clock", "severity", "name"],
                    "selectHosts": ["host", "hostid"],
                    "recent": true,
                    "limit": self.fetch_limit,
                }),
            )
            .await?;
        let problems = result
            .as_array()
            .ok_or_else(|| anyhow!("problem.get returned a non-array result"))?;
        let events: Vec<EventRecord> = problems.iter().map(to_event_record).collect();
        tracing::debug!(count = events.len(), "Fetched problems from source");
        Ok(events)
    }

    async fn acknowledge_upstream(
        &self,
        external_id: &str,
        message: &str,
        actor: Option<&str>,
    ) -> bool {
        let message = match actor {
            Some(actor) => format!("{message} (by {actor})"),
            None => message.to_string(),
        };
        // action 6 = add message + acknowledge
        let result = self
            .call_authed(
                "event.acknowledge",
                json!({
                    "eventids": external_id,
                    "action": 6,
                    "message": message,
                }),
            )
            .await;
        match result {
            Ok(value) => {
                let acked = value
                    .get("eventids")
                    .map(|ids| !ids.is_null())
                    .unwrap_or(false);
                if !acked {
                    tracing::warn!(event_id = %external_id, "Source did not confirm acknowledge");
                }
                acked
            }
            Err(e) => {
                tracing::error!(event_id = %external_id, error = %e, "Upstream acknowledge failed");
                false
            }
        }
    }
}

/// Stand-in adapter used when no source is configured. The poll loop is
/// not started in that case; this only backs operator-driven flows, where
/// upstream sync simply reports unsynced.
pub struct DisabledSource;

#[async_trait]
impl SourceAdapter for DisabledSource {
    async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
        bail!("no monitoring source configured")
    }

    async fn acknowledge_upstream(
        &self,
        external_id: &str,
        _message: &str,
        _actor: Option<&str>,
    ) -> bool {
        tracing::debug!(event_id = %external_id, "No source configured, skipping upstream sync");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problems_map_to_event_records() {
        let problem = json!({
            "eventid": "10052",
            "objectid": "13491",
            "clock": "1724140800",
            "severity": "4",
            "name": "Disk space critically low",
            "hosts": [{ "host": "web-01", "hostid": "10084" }],
        });
        let record = to_event_record(&problem);
        assert_eq!(record.event_id, "10052");
        assert_eq!(record.problem_id.as_deref(), Some("13491"));
        assert_eq!(record.host, "web-01");
        assert_eq!(record.severity, 4);
        assert_eq!(record.clock, 1724140800);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let record = to_event_record(&json!({ "eventid": "7" }));
        assert_eq!(record.host, "Unknown");
        assert_eq!(record.name, "Unnamed Problem");
        assert_eq!(record.severity, 2);
        assert!(record.clock > 0);
    }

    #[test]
    fn auth_errors_are_recognised_case_insensitively() {
        assert!(is_auth_error(&anyhow!("problem.get rejected: Not authorised.")));
        assert!(is_auth_error(&anyhow!("Session terminated, re-login, please.")));
        assert!(!is_auth_error(&anyhow!("connection refused")));
    }
}
