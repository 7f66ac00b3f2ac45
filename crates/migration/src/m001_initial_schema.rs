use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    event_id TEXT NOT NULL UNIQUE,
    problem_id TEXT,
    host TEXT NOT NULL,
    name TEXT NOT NULL,
    severity INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'new',
    triggered_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    resolved_at TEXT,
    last_updated_at TEXT NOT NULL,
    raw_payload TEXT
);
CREATE INDEX IF NOT EXISTS idx_alerts_event_id ON alerts(event_id);
CREATE INDEX IF NOT EXISTS idx_alerts_host ON alerts(host);
CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status);
CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at DESC);

CREATE TABLE IF NOT EXISTS alert_acknowledgments (
    id TEXT PRIMARY KEY NOT NULL,
    alert_id TEXT NOT NULL,
    operator_name TEXT NOT NULL,
    acknowledged_at TEXT NOT NULL,
    reason TEXT,
    synced_upstream INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_acks_alert_id ON alert_acknowledgments(alert_id);

CREATE TABLE IF NOT EXISTS alert_history (
    id TEXT PRIMARY KEY NOT NULL,
    alert_id TEXT NOT NULL,
    status_from TEXT,
    status_to TEXT NOT NULL,
    changed_at TEXT NOT NULL,
    changed_by TEXT NOT NULL,
    reason TEXT
);
CREATE INDEX IF NOT EXISTS idx_history_alert_id ON alert_history(alert_id);
CREATE INDEX IF NOT EXISTS idx_history_changed_at ON alert_history(changed_at DESC);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS alert_history;
DROP TABLE IF EXISTS alert_acknowledgments;
DROP TABLE IF EXISTS alerts;
";
