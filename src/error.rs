use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Record store unavailable: {0}")]
    Unavailable(String)
}

/// Reasons a rank recomputation was aborted. In every case the previous
/// rank table stays in place.
#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Map roster unavailable: {0}")]
    RosterUnavailable(#[source] StoreError),

    #[error("Failed to persist rank table: {0}")]
    PersistFailed(#[source] StoreError)
}
