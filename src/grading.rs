use uuid::Uuid;

use crate::error::MarkValidationError;
use crate::models::{AssessmentRecord, Grade};

/// Weights in percent: each CAT 20, main exam 60.
const CAT_WEIGHT: f64 = 20.0;
const MAIN_EXAM_WEIGHT: f64 = 60.0;

const GRADE_BANDS: [(f64, Grade); 5] = [
    (80.0, Grade::A),
    (70.0, Grade::B),
    (60.0, Grade::C),
    (50.0, Grade::D),
    (40.0, Grade::E),
];

/// Weighted total (2 dp) and letter grade for one set of component scores.
///
/// An absent CAT counts as zero. Inputs are assumed to be validated already.
pub fn compute_total_and_grade(cat1: Option<f64>, cat2: Option<f64>, main_exam: f64) -> (f64, Grade) {
    let weighted = cat1.unwrap_or(0.0) * CAT_WEIGHT
        + cat2.unwrap_or(0.0) * CAT_WEIGHT
        + main_exam * MAIN_EXAM_WEIGHT;
    let total = round2(weighted / 100.0);
    (total, grade_for(total))
}

pub fn grade_for(total: f64) -> Grade {
    GRADE_BANDS
        .iter()
        .find(|(floor, _)| total >= *floor)
        .map(|(_, grade)| *grade)
        .unwrap_or(Grade::F)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Recomputes the derived fields of a stored record from its components.
pub fn regrade(record: &mut AssessmentRecord) {
    let (total, grade) =
        compute_total_and_grade(record.cat1_score, record.cat2_score, record.main_exam_score);
    record.total_score = total;
    record.grade = grade;
}

/// Raw scores as submitted by a teacher, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkEntry {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub cat1_score: Option<f64>,
    pub cat2_score: Option<f64>,
    pub main_exam_score: Option<f64>,
    pub term: String,
    pub academic_year: String,
    pub comments: String,
}

/// A validated entry with its total and grade filled in, ready to be saved.
/// Stores recompute both derived fields on save, so edits to them are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedMark {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub cat1_score: Option<f64>,
    pub cat2_score: Option<f64>,
    pub main_exam_score: f64,
    pub total_score: f64,
    pub grade: Grade,
    pub term: String,
    pub academic_year: String,
    pub comments: String,
}

impl MarkEntry {
    /// Save hook: validates the raw scores and runs the grade engine.
    pub fn grade(self) -> Result<GradedMark, MarkValidationError> {
        let cat1 = check_optional("CAT 1", self.cat1_score)?;
        let cat2 = check_optional("CAT 2", self.cat2_score)?;
        let main_exam = self
            .main_exam_score
            .ok_or(MarkValidationError::MissingMainExam)
            .and_then(|value| check_score("main exam", value))?;

        let term = self.term.trim().to_string();
        if term.is_empty() {
            return Err(MarkValidationError::EmptyLabel("term"));
        }
        let academic_year = self.academic_year.trim().to_string();
        if academic_year.is_empty() {
            return Err(MarkValidationError::EmptyLabel("academic year"));
        }

        let (total_score, grade) = compute_total_and_grade(cat1, cat2, main_exam);

        Ok(GradedMark {
            student_id: self.student_id,
            subject_id: self.subject_id,
            teacher_id: self.teacher_id,
            cat1_score: cat1,
            cat2_score: cat2,
            main_exam_score: main_exam,
            total_score,
            grade,
            term,
            academic_year,
            comments: self.comments,
        })
    }
}

fn check_optional(
    component: &'static str,
    value: Option<f64>,
) -> Result<Option<f64>, MarkValidationError> {
    value.map(|value| check_score(component, value)).transpose()
}

fn check_score(component: &'static str, value: f64) -> Result<f64, MarkValidationError> {
    if !value.is_finite() {
        return Err(MarkValidationError::NotFinite { component });
    }
    if !(0.0..=100.0).contains(&value) {
        return Err(MarkValidationError::OutOfRange { component, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn entry(cat1: Option<f64>, cat2: Option<f64>, main_exam: Option<f64>) -> MarkEntry {
        MarkEntry {
            student_id: Uuid::from_u128(1),
            subject_id: Uuid::from_u128(2),
            teacher_id: None,
            cat1_score: cat1,
            cat2_score: cat2,
            main_exam_score: main_exam,
            term: "Term 1".to_string(),
            academic_year: "2024".to_string(),
            comments: String::new(),
        }
    }

    #[test]
    fn weights_components_twenty_twenty_sixty() {
        let (total, grade) = compute_total_and_grade(Some(70.0), Some(80.0), 90.0);
        assert_eq!(total, 84.0);
        assert_eq!(grade, Grade::A);

        let (total, _) = compute_total_and_grade(Some(55.5), Some(61.25), 47.75);
        assert!((total - 52.0).abs() < 0.005);
    }

    #[test]
    fn missing_cats_count_as_zero() {
        let (total, grade) = compute_total_and_grade(None, None, 100.0);
        assert_eq!(total, 60.0);
        assert_eq!(grade, Grade::C);

        let (total, _) = compute_total_and_grade(Some(50.0), None, 50.0);
        assert_eq!(total, 40.0);
    }

    #[test]
    fn band_floors_are_inclusive() {
        assert_eq!(grade_for(80.0), Grade::A);
        assert_eq!(grade_for(79.99), Grade::B);
        assert_eq!(grade_for(70.0), Grade::B);
        assert_eq!(grade_for(69.99), Grade::C);
        assert_eq!(grade_for(60.0), Grade::C);
        assert_eq!(grade_for(50.0), Grade::D);
        assert_eq!(grade_for(40.0), Grade::E);
        assert_eq!(grade_for(39.99), Grade::F);
        assert_eq!(grade_for(0.0), Grade::F);
    }

    #[test]
    fn total_is_rounded_before_grading() {
        // 0.2 * 100 + 0.2 * 100 + 0.6 * 66.658 = 79.9948 -> 79.99
        let (total, grade) = compute_total_and_grade(Some(100.0), Some(100.0), 66.658);
        assert_eq!(total, 79.99);
        assert_eq!(grade, Grade::B);
    }

    #[test]
    fn save_hook_rejects_missing_main_exam() {
        let err = entry(Some(50.0), Some(50.0), None).grade().unwrap_err();
        assert_eq!(err, MarkValidationError::MissingMainExam);
    }

    #[test]
    fn save_hook_rejects_out_of_range_and_nan() {
        let err = entry(Some(101.0), None, Some(50.0)).grade().unwrap_err();
        assert!(matches!(err, MarkValidationError::OutOfRange { component: "CAT 1", .. }));

        let err = entry(None, Some(f64::NAN), Some(50.0)).grade().unwrap_err();
        assert_eq!(err, MarkValidationError::NotFinite { component: "CAT 2" });

        let err = entry(None, None, Some(-0.5)).grade().unwrap_err();
        assert!(matches!(err, MarkValidationError::OutOfRange { component: "main exam", .. }));
    }

    #[test]
    fn save_hook_rejects_blank_labels() {
        let mut blank = entry(None, None, Some(50.0));
        blank.academic_year = "  ".to_string();
        assert_eq!(
            blank.grade().unwrap_err(),
            MarkValidationError::EmptyLabel("academic year")
        );
    }

    #[test]
    fn save_hook_fills_derived_fields() {
        let graded = entry(Some(60.0), Some(40.0), Some(75.0)).grade().unwrap();
        assert_eq!(graded.total_score, 65.0);
        assert_eq!(graded.grade, Grade::C);
        assert_eq!(graded.main_exam_score, 75.0);
    }

    #[test]
    fn regrade_overwrites_stale_derived_fields() {
        let today = Utc::now().date_naive();
        let mut record = AssessmentRecord {
            id: Uuid::from_u128(9),
            student_id: Uuid::from_u128(1),
            subject_id: Uuid::from_u128(2),
            subject_name: "Physics".to_string(),
            teacher_id: None,
            cat1_score: Some(90.0),
            cat2_score: Some(90.0),
            main_exam_score: 90.0,
            total_score: 12.0,
            grade: Grade::F,
            term: "Term 1".to_string(),
            academic_year: "2024".to_string(),
            comments: String::new(),
            date_entered: today,
            last_modified: today,
        };
        regrade(&mut record);
        assert_eq!(record.total_score, 90.0);
        assert_eq!(record.grade, Grade::A);
    }
}
