use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::grading::GradedMark;
use crate::models::{AssessmentRecord, PerformanceTrend, Student, Subject, TermKey};

pub mod memory;

/// Storage the analyzer reads marks from and writes trend snapshots to.
#[async_trait]
pub trait MarksStore: Send + Sync {
    async fn find_student(&self, student_id: Uuid) -> Result<Option<Student>, StoreError>;

    async fn find_student_by_admission(
        &self,
        admission_number: &str,
    ) -> Result<Option<Student>, StoreError>;

    /// Creates the student or refreshes name and class for an existing admission number.
    async fn upsert_student(
        &self,
        admission_number: &str,
        full_name: &str,
        class_grade: &str,
        section: &str,
    ) -> Result<Uuid, StoreError>;

    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;

    async fn find_subject_by_code(&self, code: &str) -> Result<Option<Subject>, StoreError>;

    /// Records for one student, optionally limited to one term, ordered by
    /// `(academic_year, term)` as stored.
    async fn records_for_student(
        &self,
        student_id: Uuid,
        term: Option<&TermKey>,
    ) -> Result<Vec<AssessmentRecord>, StoreError>;

    async fn all_records(&self) -> Result<Vec<AssessmentRecord>, StoreError>;

    /// Inserts or replaces the record for `(student, subject, term, year)`. Total and
    /// grade are always recomputed from the component scores.
    async fn save_mark(&self, mark: &GradedMark) -> Result<AssessmentRecord, StoreError>;

    /// Inserts or replaces the snapshot for `(student, term, year)`. An existing row
    /// keeps its id and generation time.
    async fn upsert_trend(&self, trend: &PerformanceTrend) -> Result<PerformanceTrend, StoreError>;

    async fn trends_for_student(&self, student_id: Uuid)
        -> Result<Vec<PerformanceTrend>, StoreError>;

    async fn count_trends(&self) -> Result<u64, StoreError>;

    async fn active_trends(&self) -> Result<Vec<PerformanceTrend>, StoreError>;

    async fn deactivate_trends(&self, trend_ids: &[Uuid]) -> Result<u64, StoreError>;
}
