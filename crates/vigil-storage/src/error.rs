use vigil_common::types::AlertStatus;

/// Errors surfaced by the storage layer.
///
/// Lifecycle failures (`NotFound`, `InvalidTransition`) are typed so the
/// API layer can render them; everything else is operational.
///
/// # Examples
///
/// ```rust
/// use vigil_storage::error::StoreError;
///
/// let err = StoreError::NotFound {
///     entity: "alert",
///     id: "42".to_string(),
/// };
/// assert!(err.to_string().contains("alert"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A required record was not found.
    #[error("{entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// A lifecycle operation targeted an alert already past the requested
    /// state. Safe to retry; the retry fails identically without side
    /// effects.
    #[error("alert {id} is {from}, cannot transition to {requested}")]
    InvalidTransition {
        id: String,
        from: AlertStatus,
        requested: AlertStatus,
    },

    /// A stored status column held a value outside the lifecycle enum.
    #[error("corrupt status value '{0}' in database")]
    CorruptStatus(String),

    /// An underlying database error.
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

impl StoreError {
    /// Whether this error is a typed lifecycle failure the caller caused,
    /// as opposed to an operational fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::InvalidTransition { .. }
        )
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
