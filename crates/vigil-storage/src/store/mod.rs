use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

use crate::error::Result;

pub mod alert;

/// Unified access layer over the alert database.
///
/// All methods are `async fn` backed by SeaORM. SQLite is the default
/// engine; any `db_url` SeaORM accepts works, the WAL pragma is applied
/// only for SQLite.
pub struct AlertStore {
    pub(crate) db: DatabaseConnection,
}

impl AlertStore {
    /// Connect and initialize the database.
    ///
    /// Runs all pending migrations so the schema is current before the
    /// first query. Example SQLite URL: `sqlite:data/vigil.db?mode=rwc`,
    /// or `sqlite::memory:` for tests.
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;
        tracing::info!("Alert store initialized");

        Ok(Self { db })
    }

    /// Verify the database is reachable. Used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
