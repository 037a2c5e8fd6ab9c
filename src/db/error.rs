use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection failed: {0}")]
    Connection(String),
    #[error("database query failed: {0}")]
    Query(String),
    #[error("database migration failed: {0}")]
    Migration(String),
    /// The IRC side of a mapping is already claimed by another Slack id.
    #[error("mapping already exists: {0}")]
    ConstraintViolation(String),
}

impl From<diesel::result::Error> for DatabaseError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                DatabaseError::ConstraintViolation(info.message().to_string())
            }
            other => DatabaseError::Query(other.to_string()),
        }
    }
}
