use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::analytics::term_order;
use crate::error::StoreError;
use crate::grading::{regrade, GradedMark};
use crate::models::{AssessmentRecord, PerformanceTrend, Student, Subject, TermKey};
use crate::store::MarksStore;

/// In-process store with the same keying rules as the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    students: Mutex<BTreeMap<Uuid, Student>>,
    subjects: Mutex<BTreeMap<Uuid, Subject>>,
    records: Mutex<Vec<AssessmentRecord>>,
    trends: Mutex<Vec<PerformanceTrend>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_student(&self, student: Student) {
        self.students.lock().await.insert(student.id, student);
    }

    pub async fn add_subject(&self, subject: Subject) {
        self.subjects.lock().await.insert(subject.id, subject);
    }

    /// Drops a student together with their records and trend snapshots.
    pub async fn remove_student(&self, student_id: Uuid) -> bool {
        let removed = self.students.lock().await.remove(&student_id).is_some();
        self.records
            .lock()
            .await
            .retain(|record| record.student_id != student_id);
        self.trends
            .lock()
            .await
            .retain(|trend| trend.student_id != student_id);
        removed
    }
}

#[async_trait]
impl MarksStore for MemoryStore {
    async fn find_student(&self, student_id: Uuid) -> Result<Option<Student>, StoreError> {
        Ok(self.students.lock().await.get(&student_id).cloned())
    }

    async fn find_student_by_admission(
        &self,
        admission_number: &str,
    ) -> Result<Option<Student>, StoreError> {
        Ok(self
            .students
            .lock()
            .await
            .values()
            .find(|student| student.admission_number == admission_number)
            .cloned())
    }

    async fn upsert_student(
        &self,
        admission_number: &str,
        full_name: &str,
        class_grade: &str,
        section: &str,
    ) -> Result<Uuid, StoreError> {
        let mut students = self.students.lock().await;
        if let Some(student) = students
            .values_mut()
            .find(|student| student.admission_number == admission_number)
        {
            student.full_name = full_name.to_string();
            student.class_grade = class_grade.to_string();
            student.section = section.to_string();
            return Ok(student.id);
        }

        let id = Uuid::new_v4();
        students.insert(
            id,
            Student {
                id,
                full_name: full_name.to_string(),
                admission_number: admission_number.to_string(),
                class_grade: class_grade.to_string(),
                section: section.to_string(),
            },
        );
        Ok(id)
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let mut students: Vec<Student> = self.students.lock().await.values().cloned().collect();
        students.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(students)
    }

    async fn find_subject_by_code(&self, code: &str) -> Result<Option<Subject>, StoreError> {
        Ok(self
            .subjects
            .lock()
            .await
            .values()
            .find(|subject| subject.code == code)
            .cloned())
    }

    async fn records_for_student(
        &self,
        student_id: Uuid,
        term: Option<&TermKey>,
    ) -> Result<Vec<AssessmentRecord>, StoreError> {
        let mut records: Vec<AssessmentRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| record.student_id == student_id)
            .filter(|record| term.map_or(true, |key| record.term_key() == *key))
            .cloned()
            .collect();
        records.sort_by(|a, b| term_order(&a.term_key(), &b.term_key()));
        Ok(records)
    }

    async fn all_records(&self) -> Result<Vec<AssessmentRecord>, StoreError> {
        Ok(self.records.lock().await.clone())
    }

    async fn save_mark(&self, mark: &GradedMark) -> Result<AssessmentRecord, StoreError> {
        if !self.students.lock().await.contains_key(&mark.student_id) {
            return Err(StoreError::UnknownStudent(mark.student_id));
        }
        let subject_name = self
            .subjects
            .lock()
            .await
            .get(&mark.subject_id)
            .map(|subject| subject.name.clone())
            .ok_or(StoreError::UnknownSubject(mark.subject_id))?;

        let today = Utc::now().date_naive();
        let mut records = self.records.lock().await;
        let existing = records.iter_mut().find(|record| {
            record.student_id == mark.student_id
                && record.subject_id == mark.subject_id
                && record.term == mark.term
                && record.academic_year == mark.academic_year
        });

        let saved = match existing {
            Some(record) => {
                record.teacher_id = mark.teacher_id;
                record.cat1_score = mark.cat1_score;
                record.cat2_score = mark.cat2_score;
                record.main_exam_score = mark.main_exam_score;
                record.comments = mark.comments.clone();
                record.last_modified = today;
                regrade(record);
                record.clone()
            }
            None => {
                let mut record = AssessmentRecord {
                    id: Uuid::new_v4(),
                    student_id: mark.student_id,
                    subject_id: mark.subject_id,
                    subject_name,
                    teacher_id: mark.teacher_id,
                    cat1_score: mark.cat1_score,
                    cat2_score: mark.cat2_score,
                    main_exam_score: mark.main_exam_score,
                    total_score: mark.total_score,
                    grade: mark.grade,
                    term: mark.term.clone(),
                    academic_year: mark.academic_year.clone(),
                    comments: mark.comments.clone(),
                    date_entered: today,
                    last_modified: today,
                };
                regrade(&mut record);
                records.push(record.clone());
                record
            }
        };

        Ok(saved)
    }

    async fn upsert_trend(&self, trend: &PerformanceTrend) -> Result<PerformanceTrend, StoreError> {
        if !self.students.lock().await.contains_key(&trend.student_id) {
            return Err(StoreError::UnknownStudent(trend.student_id));
        }

        let mut trends = self.trends.lock().await;
        let existing = trends.iter_mut().find(|stored| {
            stored.student_id == trend.student_id
                && stored.term == trend.term
                && stored.academic_year == trend.academic_year
        });

        let saved = match existing {
            Some(stored) => {
                let id = stored.id;
                let date_generated = stored.date_generated;
                *stored = PerformanceTrend {
                    id,
                    date_generated,
                    last_updated: Utc::now(),
                    ..trend.clone()
                };
                stored.clone()
            }
            None => {
                trends.push(trend.clone());
                trend.clone()
            }
        };

        Ok(saved)
    }

    async fn trends_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<PerformanceTrend>, StoreError> {
        let mut trends: Vec<PerformanceTrend> = self
            .trends
            .lock()
            .await
            .iter()
            .filter(|trend| trend.student_id == student_id)
            .cloned()
            .collect();
        trends.sort_by(|a, b| term_order(&b.term_key(), &a.term_key()));
        Ok(trends)
    }

    async fn count_trends(&self) -> Result<u64, StoreError> {
        Ok(self.trends.lock().await.len() as u64)
    }

    async fn active_trends(&self) -> Result<Vec<PerformanceTrend>, StoreError> {
        Ok(self
            .trends
            .lock()
            .await
            .iter()
            .filter(|trend| trend.is_active)
            .cloned()
            .collect())
    }

    async fn deactivate_trends(&self, trend_ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut updated = 0;
        for trend in self.trends.lock().await.iter_mut() {
            if trend.is_active && trend_ids.contains(&trend.id) {
                trend.is_active = false;
                trend.last_updated = Utc::now();
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::MarkEntry;
    use crate::models::Grade;

    async fn store_with_pupil() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .add_student(Student {
                id: Uuid::from_u128(1),
                full_name: "Otieno Achieng".to_string(),
                admission_number: "ADM-100".to_string(),
                class_grade: "Form 3".to_string(),
                section: "North".to_string(),
            })
            .await;
        store
            .add_subject(Subject {
                id: Uuid::from_u128(20),
                code: "MATH101".to_string(),
                name: "Mathematics".to_string(),
                category: "sciences".to_string(),
            })
            .await;
        store
    }

    fn entry(main_exam: f64, term: &str) -> GradedMark {
        MarkEntry {
            student_id: Uuid::from_u128(1),
            subject_id: Uuid::from_u128(20),
            teacher_id: None,
            cat1_score: None,
            cat2_score: None,
            main_exam_score: Some(main_exam),
            term: term.to_string(),
            academic_year: "2024".to_string(),
            comments: String::new(),
        }
        .grade()
        .expect("valid entry")
    }

    #[tokio::test]
    async fn saving_same_key_updates_in_place() {
        let store = store_with_pupil().await;
        let first = store.save_mark(&entry(50.0, "Term 1")).await.expect("save");
        let second = store.save_mark(&entry(100.0, "Term 1")).await.expect("save");

        assert_eq!(first.id, second.id);
        assert_eq!(second.total_score, 60.0);
        assert_eq!(second.grade, Grade::C);
        assert_eq!(store.all_records().await.expect("records").len(), 1);
    }

    #[tokio::test]
    async fn save_recomputes_edited_total_and_grade() {
        let store = store_with_pupil().await;
        let mut mark = entry(10.0, "Term 1");
        assert_eq!((mark.total_score, mark.grade), (6.0, Grade::F));

        mark.total_score = 99.0;
        mark.grade = Grade::A;
        let inserted = store.save_mark(&mark).await.expect("save");
        assert_eq!(inserted.total_score, 6.0);
        assert_eq!(inserted.grade, Grade::F);

        mark.main_exam_score = 90.0;
        mark.total_score = 1.0;
        mark.grade = Grade::F;
        let updated = store.save_mark(&mark).await.expect("save");
        assert_eq!(updated.id, inserted.id);
        assert_eq!(updated.total_score, 54.0);
        assert_eq!(updated.grade, Grade::D);
    }

    #[tokio::test]
    async fn upsert_student_reuses_admission_number() {
        let store = store_with_pupil().await;
        let id = store
            .upsert_student("ADM-100", "Otieno A. Achieng", "Form 4", "South")
            .await
            .expect("upsert");
        assert_eq!(id, Uuid::from_u128(1));

        let student = store
            .find_student_by_admission("ADM-100")
            .await
            .expect("lookup")
            .expect("student");
        assert_eq!(student.class_grade, "Form 4");

        let fresh = store
            .upsert_student("ADM-200", "Amina Hassan", "Form 1", "East")
            .await
            .expect("upsert");
        assert_ne!(fresh, id);
        assert_eq!(store.list_students().await.expect("students").len(), 2);

        let subject = store.find_subject_by_code("MATH101").await.expect("lookup");
        assert_eq!(subject.map(|s| s.id), Some(Uuid::from_u128(20)));
        assert!(store.find_subject_by_code("NOPE").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn unknown_subject_is_rejected() {
        let store = store_with_pupil().await;
        let mut mark = entry(50.0, "Term 1");
        mark.subject_id = Uuid::from_u128(99);
        let err = store.save_mark(&mark).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownSubject(_)));
    }

    #[tokio::test]
    async fn records_filter_by_term_and_sort() {
        let store = store_with_pupil().await;
        store.save_mark(&entry(70.0, "Term 2")).await.expect("save");
        store.save_mark(&entry(60.0, "Term 1")).await.expect("save");

        let all = store
            .records_for_student(Uuid::from_u128(1), None)
            .await
            .expect("records");
        let terms: Vec<&str> = all.iter().map(|r| r.term.as_str()).collect();
        assert_eq!(terms, ["Term 1", "Term 2"]);

        let key = TermKey::new("Term 2", "2024");
        let filtered = store
            .records_for_student(Uuid::from_u128(1), Some(&key))
            .await
            .expect("records");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].main_exam_score, 70.0);
    }

    #[tokio::test]
    async fn removing_student_cascades() {
        let store = store_with_pupil().await;
        store.save_mark(&entry(70.0, "Term 1")).await.expect("save");
        assert!(store.remove_student(Uuid::from_u128(1)).await);
        assert!(store.all_records().await.expect("records").is_empty());
        assert!(!store.remove_student(Uuid::from_u128(1)).await);
    }
}
