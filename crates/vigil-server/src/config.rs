use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Snowflake node id (0-31); distinguishes instances that share a
    /// database.
    #[serde(default = "default_node_id")]
    pub node_id: i32,

    /// CORS allowed origins; empty allows every origin (development mode).
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URL with any `user:password@` part masked, for logs.
    pub fn redacted_url(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***@{}", &self.url[..scheme_end], &self.url[at + 1..])
            }
            _ => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between ingestion cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            interval_secs: default_cleanup_interval_secs(),
        }
    }
}

/// Monitoring source (Zabbix-compatible JSON-RPC endpoint). When `url` is
/// empty the poll loop is not started and the API serves stored data only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum problems fetched per cycle.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_source_timeout_secs(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

impl SourceConfig {
    pub fn enabled(&self) -> bool {
        !self.url.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub telegram_enabled: bool,
    #[serde(default)]
    pub telegram_token: String,
    /// Comma-separated chat id list.
    #[serde(default)]
    pub telegram_chat_ids: String,
    /// "short" or "detailed".
    #[serde(default = "default_message_format")]
    pub message_format: String,
    #[serde(default)]
    pub dashboard_url: Option<String>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            telegram_enabled: false,
            telegram_token: String::new(),
            telegram_chat_ids: String::new(),
            message_format: default_message_format(),
            dashboard_url: None,
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_node_id() -> i32 {
    1
}

fn default_db_url() -> String {
    "sqlite://data/vigil.db?mode=rwc".to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_initial_backoff_secs() -> u64 {
    1
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_retention_days() -> u32 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    86400
}

fn default_source_timeout_secs() -> u64 {
    10
}

fn default_fetch_limit() -> u64 {
    1000
}

fn default_message_format() -> String {
    "short".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gets_full_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.node_id, 1);
        assert_eq!(config.poll.interval_secs, 2);
        assert_eq!(config.poll.initial_backoff_secs, 1);
        assert_eq!(config.poll.max_backoff_secs, 300);
        assert_eq!(config.cleanup.retention_days, 30);
        assert!(!config.source.enabled());
        assert!(!config.notifications.telegram_enabled);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            http_port = 9000

            [poll]
            interval_secs = 30

            [source]
            url = "http://zabbix:8080/api_jsonrpc.php"
            username = "api"
            password = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.poll.interval_secs, 30);
        assert_eq!(config.poll.max_backoff_secs, 300);
        assert!(config.source.enabled());
        assert_eq!(config.source.timeout_secs, 10);
    }

    #[test]
    fn redacted_url_masks_credentials() {
        let db = DatabaseConfig {
            url: "postgres://vigil:hunter2@db:5432/vigil".to_string(),
        };
        assert_eq!(db.redacted_url(), "postgres://***@db:5432/vigil");

        let sqlite = DatabaseConfig::default();
        assert_eq!(sqlite.redacted_url(), sqlite.url);
    }

    #[test]
    fn load_reads_a_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http_port = 8888").unwrap();
        let config = ServerConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.http_port, 8888);
    }
}
