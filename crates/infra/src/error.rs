//! Storage error model.
//!
//! ## SQLSTATE mapping
//!
//! | PostgreSQL code | Meaning | `StoreError` |
//! |-----------------|---------|--------------|
//! | `23505` | unique violation (sku, slug, order number) | `Domain(Duplicate)` |
//! | `23514` | check constraint violation | `Domain(Validation)` |
//! | `23503` | foreign key violation (unknown product) | `Domain(NotFound)` |
//! | other / pool / IO | | `Database` |

use thiserror::Error;

use storefront_core::DomainError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned by stores and workflows.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A domain rule rejected the operation, either in Rust or via a constraint.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The database itself failed (connection, IO, unexpected SQL error).
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            StoreError::Domain(e) => Some(e),
            StoreError::Database(_) => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Domain(DomainError::Duplicate(_)))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Domain(DomainError::Conflict(_)))
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let detail = db_err
                .constraint()
                .map(str::to_string)
                .unwrap_or_else(|| db_err.message().to_string());

            match db_err.code().as_deref() {
                Some("23505") => DomainError::duplicate(detail).into(),
                Some("23514") => {
                    DomainError::validation(format!("check constraint violated: {detail}")).into()
                }
                Some("23503") => DomainError::not_found().into(),
                _ => StoreError::database(format!(
                    "database error in {operation}: {}",
                    db_err.message()
                )),
            }
        }
        sqlx::Error::RowNotFound => DomainError::not_found().into(),
        sqlx::Error::PoolTimedOut => {
            StoreError::database(format!("{operation}: timed out acquiring a connection"))
        }
        other => StoreError::database(format!("{operation}: {other}")),
    }
}
