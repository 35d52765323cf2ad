use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Storage failures as seen by services. Driver errors never leak past
/// this type.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,

    #[error("{field} already exists")]
    Conflict { field: String },

    /// The row is still referenced, e.g. a role assigned to users.
    #[error("still referenced by {by}")]
    InUse { by: String },

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl RepoError {
    pub fn conflict(field: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
        }
    }

    pub fn in_use(by: impl Into<String>) -> Self {
        Self::InUse { by: by.into() }
    }
}

impl From<DbErr> for RepoError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() {
            return Self::Conflict {
                field: conflict_field(&message),
            };
        }

        match err {
            DbErr::RecordNotFound(_) => Self::NotFound,
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => Self::Unavailable(err.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Database(format!("corrupt JSON column: {err}"))
    }
}

/// Column named by a unique violation, e.g. `username` from SQLite's
/// `UNIQUE constraint failed: users.username`.
fn conflict_field(message: &str) -> String {
    message
        .rsplit("failed:")
        .next()
        .and_then(|cols| cols.split(',').next_back())
        .map(str::trim)
        .and_then(|col| col.rsplit('.').next())
        .filter(|col| !col.is_empty())
        .unwrap_or("record")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_field() {
        assert_eq!(
            conflict_field("UNIQUE constraint failed: users.username"),
            "username"
        );
        assert_eq!(
            conflict_field(
                "UNIQUE constraint failed: personal_access_tokens.user_id, personal_access_tokens.name"
            ),
            "name"
        );
        assert_eq!(conflict_field(""), "record");
    }
}
