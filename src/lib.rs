//! Grade computation and term-over-term performance trend analytics for
//! school assessment records.

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod grading;
pub mod models;
pub mod report;
pub mod store;
pub mod telemetry;
pub mod trends;

pub use error::{ConfigError, MarkValidationError, StoreError};
pub use grading::{compute_total_and_grade, GradedMark, MarkEntry};
pub use store::MarksStore;
