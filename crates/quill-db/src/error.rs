use std::fmt;

use quill_model::{ModelError, Value};
use quill_store::StoreError;

#[derive(Debug)]
pub enum DbError {
    Model(ModelError),
    Store(StoreError),
    /// A unique index refused a second document under the same key.
    UniqueViolated {
        field: String,
        key: Option<Value>,
    },
    /// A document carried a missing or non-string primary key.
    InvalidKey(String),
    /// Too many unparseable lines in the data file.
    CorruptDatafile {
        corrupt: usize,
        total: usize,
        threshold: f64,
    },
    InvalidOptions(String),
    /// A projection mixed picked and omitted fields.
    ProjectionConflict(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Model(e) => write!(f, "{e}"),
            DbError::Store(e) => write!(f, "{e}"),
            DbError::UniqueViolated { field, key } => match key {
                Some(key) => write!(
                    f,
                    "can't insert key {key:?}, it violates the unique constraint on {field}"
                ),
                None => write!(
                    f,
                    "can't index a second document without {field}, it violates the unique constraint"
                ),
            },
            DbError::InvalidKey(msg) => write!(f, "invalid key: {msg}"),
            DbError::CorruptDatafile {
                corrupt,
                total,
                threshold,
            } => write!(
                f,
                "more than {:.0}% of the data file is corrupt ({corrupt} of {total} lines), refusing to load",
                threshold * 100.0
            ),
            DbError::InvalidOptions(msg) => write!(f, "invalid options: {msg}"),
            DbError::ProjectionConflict(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<ModelError> for DbError {
    fn from(e: ModelError) -> Self {
        DbError::Model(e)
    }
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        DbError::Store(e)
    }
}

impl DbError {
    /// Whether this error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolated { .. })
    }
}
