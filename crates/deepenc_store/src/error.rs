use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Store is shut down")]
    Closed,
}

impl StoreError {
    /// Map a unique-constraint violation to `Duplicate`, anything else to `Database`.
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return StoreError::Duplicate(what.to_string());
            }
        }
        StoreError::Database(err)
    }
}
