use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity on the monitoring source's 0-5 scale, ordered from
/// least to most severe.
///
/// # Examples
///
/// ```
/// use vigil_common::types::Severity;
///
/// let sev = Severity::try_from(4).unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Disaster > Severity::Warning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    NotClassified,
    Information,
    Warning,
    Average,
    High,
    Disaster,
}

impl Severity {
    /// Numeric value as delivered by the source (0-5).
    pub fn value(self) -> i32 {
        match self {
            Severity::NotClassified => 0,
            Severity::Information => 1,
            Severity::Warning => 2,
            Severity::Average => 3,
            Severity::High => 4,
            Severity::Disaster => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::NotClassified => "not_classified",
            Severity::Information => "information",
            Severity::Warning => "warning",
            Severity::Average => "average",
            Severity::High => "high",
            Severity::Disaster => "disaster",
        }
    }

    /// Upper-case label used in notification messages.
    pub fn label(self) -> &'static str {
        match self {
            Severity::NotClassified => "NOT CLASSIFIED",
            Severity::Information => "INFORMATION",
            Severity::Warning => "WARNING",
            Severity::Average => "AVERAGE",
            Severity::High => "HIGH",
            Severity::Disaster => "DISASTER",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for Severity {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Severity::NotClassified),
            1 => Ok(Severity::Information),
            2 => Ok(Severity::Warning),
            3 => Ok(Severity::Average),
            4 => Ok(Severity::High),
            5 => Ok(Severity::Disaster),
            _ => Err(format!("severity out of range: {v}")),
        }
    }
}

/// Alert lifecycle status. Transitions only move forward:
/// new -> acknowledged -> resolved, or new -> resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AlertStatus::New),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// One raw problem/event record as returned by the monitoring source.
///
/// `event_id` is the deduplication key; records without one are dropped
/// during reconciliation. `clock` is the source-side trigger time in
/// epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    #[serde(default)]
    pub problem_id: Option<String>,
    pub host: String,
    pub name: String,
    pub severity: i32,
    pub clock: i64,
    /// Full source payload, kept verbatim on the alert row.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl EventRecord {
    /// Trigger timestamp derived from the source-side clock. Falls back to
    /// `now` for clocks outside the representable range.
    pub fn triggered_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.clock, 0).unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn severity_round_trips_numeric_values() {
        for v in 0..=5 {
            let sev = Severity::try_from(v).unwrap();
            assert_eq!(sev.value(), v);
        }
        assert!(Severity::try_from(6).is_err());
        assert!(Severity::try_from(-1).is_err());
    }

    #[test]
    fn severity_ordering_increases() {
        assert!(Severity::Disaster > Severity::High);
        assert!(Severity::Warning > Severity::NotClassified);
    }

    #[test]
    fn status_parses_its_display_form() {
        for status in [
            AlertStatus::New,
            AlertStatus::Acknowledged,
            AlertStatus::Resolved,
        ] {
            assert_eq!(AlertStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(AlertStatus::from_str("closed").is_err());
    }

    #[test]
    fn triggered_at_uses_source_clock() {
        let record = EventRecord {
            event_id: "e1".into(),
            problem_id: None,
            host: "h1".into(),
            name: "disk full".into(),
            severity: 3,
            clock: 1_700_000_000,
            raw: serde_json::Value::Null,
        };
        assert_eq!(record.triggered_at().timestamp(), 1_700_000_000);
    }
}
