use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use vigil_common::types::AlertStatus;
use vigil_ingest::NotificationHook;
use vigil_storage::AlertRow;

use crate::channels::telegram::parse_chat_ids;
use crate::manager::{MessageFormat, NotificationManager};
use crate::NotificationChannel;

fn make_alert() -> AlertRow {
    let now = Utc::now();
    AlertRow {
        id: "1".into(),
        event_id: "e1".into(),
        problem_id: Some("p1".into()),
        host: "web-01".into(),
        name: "disk full".into(),
        severity: 4,
        status: AlertStatus::New,
        triggered_at: now,
        created_at: now,
        resolved_at: None,
        last_updated_at: now,
        raw_payload: None,
    }
}

struct CollectingChannel {
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NotificationChannel for CollectingChannel {
    async fn send(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "collector"
    }
}

struct BrokenChannel;

#[async_trait]
impl NotificationChannel for BrokenChannel {
    async fn send(&self, _text: &str) -> Result<()> {
        Err(anyhow!("gateway timeout"))
    }

    fn channel_name(&self) -> &str {
        "broken"
    }
}

#[test]
fn chat_id_list_is_trimmed_and_filtered() {
    assert_eq!(
        parse_chat_ids(" 123, 456 ,,789"),
        vec!["123", "456", "789"]
    );
    assert!(parse_chat_ids("").is_empty());
}

#[test]
fn short_format_is_one_line() {
    let manager = NotificationManager::new(vec![], MessageFormat::Short, None);
    let text = manager.format_alert("NEW", &make_alert(), None, None);
    assert_eq!(text, "NEW [HIGH] | Host: web-01 | disk full");
}

#[test]
fn short_format_appends_operator_and_reason() {
    let manager = NotificationManager::new(vec![], MessageFormat::Short, None);
    let text = manager.format_alert(
        "ACKNOWLEDGED",
        &make_alert(),
        Some("alice"),
        Some("known issue"),
    );
    assert!(text.ends_with("By: alice | Reason: known issue"));
}

#[test]
fn detailed_format_includes_ids_and_dashboard_link() {
    let manager = NotificationManager::new(
        vec![],
        MessageFormat::Detailed,
        Some("https://vigil.example".to_string()),
    );
    let text = manager.format_alert("NEW", &make_alert(), None, None);
    assert!(text.contains("Event ID: e1"));
    assert!(text.contains("Problem ID: p1"));
    assert!(text.contains("Severity: HIGH"));
    assert!(text.contains("Dashboard: https://vigil.example/alerts"));
}

#[tokio::test]
async fn broken_channel_does_not_block_others() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let collector = Box::new(CollectingChannel { sent: sent.clone() });
    let manager = NotificationManager::new(
        vec![Box::new(BrokenChannel), collector],
        MessageFormat::Short,
        None,
    );

    manager.alert_created(&make_alert()).await;
    manager
        .alert_acknowledged(&make_alert(), "alice", None)
        .await;

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].starts_with("NEW"));
    assert!(sent[1].starts_with("ACKNOWLEDGED"));
}
