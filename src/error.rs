use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum MarkValidationError {
    #[error("{component} score {value} is outside 0-100")]
    OutOfRange { component: &'static str, value: f64 },
    #[error("{component} score is not a finite number")]
    NotFinite { component: &'static str },
    #[error("main exam score is required")]
    MissingMainExam,
    #[error("{0} must not be empty")]
    EmptyLabel(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("student {0} not found")]
    UnknownStudent(Uuid),
    #[error("subject {0} not found")]
    UnknownSubject(Uuid),
    #[error("stored value {value:?} is not a valid {field}")]
    InvalidStoredValue { field: &'static str, value: String },
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}
