use async_trait::async_trait;
use vigil_ingest::NotificationHook;
use vigil_storage::AlertRow;

use crate::NotificationChannel;

/// Message rendering style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    #[default]
    Short,
    Detailed,
}

impl std::str::FromStr for MessageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(MessageFormat::Short),
            "detailed" => Ok(MessageFormat::Detailed),
            _ => Err(format!("unknown message format: {s}")),
        }
    }
}

/// Renders lifecycle events into text and fans them out to every
/// configured channel. Implements [`NotificationHook`] so the
/// orchestrator and the API layer stay ignorant of delivery details.
pub struct NotificationManager {
    channels: Vec<Box<dyn NotificationChannel>>,
    format: MessageFormat,
    dashboard_url: Option<String>,
}

impl NotificationManager {
    pub fn new(
        channels: Vec<Box<dyn NotificationChannel>>,
        format: MessageFormat,
        dashboard_url: Option<String>,
    ) -> Self {
        Self {
            channels,
            format,
            dashboard_url,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    async fn dispatch(&self, text: &str) {
        for channel in &self.channels {
            if let Err(e) = channel.send(text).await {
                tracing::error!(
                    channel = channel.channel_name(),
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }
    }

    pub(crate) fn format_alert(
        &self,
        status_label: &str,
        alert: &AlertRow,
        operator: Option<&str>,
        reason: Option<&str>,
    ) -> String {
        let severity = severity_label(alert.severity);
        match self.format {
            MessageFormat::Detailed => {
                let mut lines = vec![
                    format!("Status: {status_label}"),
                    format!("Severity: {severity}"),
                    format!("Host: {}", alert.host),
                    format!("Name: {}", alert.name),
                    format!("Time: {}", alert.created_at.to_rfc3339()),
                    format!("Event ID: {}", alert.event_id),
                ];
                if let Some(problem_id) = &alert.problem_id {
                    lines.push(format!("Problem ID: {problem_id}"));
                }
                if let Some(operator) = operator {
                    lines.push(format!("By: {operator}"));
                }
                if let Some(reason) = reason {
                    lines.push(format!("Reason: {reason}"));
                }
                if let Some(base) = &self.dashboard_url {
                    lines.push(format!("Dashboard: {base}/alerts"));
                }
                lines.join("\n")
            }
            MessageFormat::Short => {
                let mut parts = vec![
                    format!("{status_label} [{severity}]"),
                    format!("Host: {}", alert.host),
                    alert.name.clone(),
                ];
                if let Some(operator) = operator {
                    parts.push(format!("By: {operator}"));
                }
                if let Some(reason) = reason {
                    parts.push(format!("Reason: {reason}"));
                }
                parts.join(" | ")
            }
        }
    }
}

fn severity_label(severity: i32) -> &'static str {
    match vigil_common::types::Severity::try_from(severity) {
        Ok(sev) => sev.label(),
        Err(_) => "UNKNOWN",
    }
}

#[async_trait]
impl NotificationHook for NotificationManager {
    async fn alert_created(&self, alert: &AlertRow) {
        let text = self.format_alert("NEW", alert, None, None);
        self.dispatch(&text).await;
    }

    async fn alert_acknowledged(&self, alert: &AlertRow, operator: &str, reason: Option<&str>) {
        let text = self.format_alert("ACKNOWLEDGED", alert, Some(operator), reason);
        self.dispatch(&text).await;
    }

    async fn alert_resolved(&self, alert: &AlertRow) {
        let text = self.format_alert("RESOLVED", alert, None, None);
        self.dispatch(&text).await;
    }
}
