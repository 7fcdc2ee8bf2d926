use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::grading::{compute_total_and_grade, GradedMark, MarkEntry};
use crate::models::{
    AssessmentRecord, Grade, GradeDistribution, PerformanceTrend, Student, Subject,
    SubjectExtreme, TermKey, TrendCategory, TrendDirection,
};
use crate::store::MarksStore;

const RECORD_SELECT: &str = "\
    SELECT r.id, r.student_id, r.subject_id, sub.name AS subject_name, r.teacher_id, \
           r.cat1_score, r.cat2_score, r.main_exam_score, r.total_score, r.grade, \
           r.term, r.academic_year, r.comments, r.date_entered, r.last_modified \
    FROM marks.assessment_records r \
    JOIN marks.subjects sub ON sub.id = r.subject_id";

const TREND_SELECT: &str = "\
    SELECT t.*, \
           ss.name AS strongest_subject_name, \
           ws.name AS weakest_subject_name, \
           ms.name AS most_improved_subject_name \
    FROM marks.performance_trends t \
    LEFT JOIN marks.subjects ss ON ss.id = t.strongest_subject_id \
    LEFT JOIN marks.subjects ws ON ws.id = t.weakest_subject_id \
    LEFT JOIN marks.subjects ms ON ms.id = t.most_improved_subject_id";

const GRADE_COUNT_COLUMNS: [&str; 6] = [
    "grade_a_count",
    "grade_b_count",
    "grade_c_count",
    "grade_d_count",
    "grade_e_count",
    "grade_f_count",
];

/// Postgres-backed [`MarksStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn trend_by_id(&self, trend_id: Uuid) -> Result<PerformanceTrend, StoreError> {
        let row = sqlx::query(&format!("{TREND_SELECT} WHERE t.id = $1"))
            .bind(trend_id)
            .fetch_one(&self.pool)
            .await?;
        trend_from_row(&row)
    }
}

#[async_trait]
impl MarksStore for PgStore {
    async fn find_student(&self, student_id: Uuid) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query(
            "SELECT id, full_name, admission_number, class_grade, section \
             FROM marks.students WHERE id = $1",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| student_from_row(&row)))
    }

    async fn find_student_by_admission(
        &self,
        admission_number: &str,
    ) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query(
            "SELECT id, full_name, admission_number, class_grade, section \
             FROM marks.students WHERE admission_number = $1",
        )
        .bind(admission_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| student_from_row(&row)))
    }

    async fn upsert_student(
        &self,
        admission_number: &str,
        full_name: &str,
        class_grade: &str,
        section: &str,
    ) -> Result<Uuid, StoreError> {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO marks.students (id, full_name, admission_number, class_grade, section)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (admission_number) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                class_grade = EXCLUDED.class_grade,
                section = EXCLUDED.section
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(full_name)
        .bind(admission_number)
        .bind(class_grade)
        .bind(section)
        .fetch_one(&self.pool)
        .await?
        .get("id");
        Ok(id)
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, full_name, admission_number, class_grade, section \
             FROM marks.students ORDER BY full_name, admission_number",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(student_from_row).collect())
    }

    async fn find_subject_by_code(&self, code: &str) -> Result<Option<Subject>, StoreError> {
        let row = sqlx::query("SELECT id, code, name, category FROM marks.subjects WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Subject {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            category: row.get("category"),
        }))
    }

    async fn records_for_student(
        &self,
        student_id: Uuid,
        term: Option<&TermKey>,
    ) -> Result<Vec<AssessmentRecord>, StoreError> {
        let mut query = format!("{RECORD_SELECT} WHERE r.student_id = $1");
        if term.is_some() {
            query.push_str(" AND r.term = $2 AND r.academic_year = $3");
        }
        query.push_str(" ORDER BY r.academic_year, r.term, sub.name");

        let mut rows = sqlx::query(&query).bind(student_id);
        if let Some(key) = term {
            rows = rows.bind(&key.term).bind(&key.academic_year);
        }

        let rows = rows.fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn all_records(&self) -> Result<Vec<AssessmentRecord>, StoreError> {
        sqlx::query(&format!(
            "{RECORD_SELECT} ORDER BY r.academic_year, r.term, r.student_id"
        ))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(record_from_row)
        .collect()
    }

    async fn save_mark(&self, mark: &GradedMark) -> Result<AssessmentRecord, StoreError> {
        let (total_score, grade) =
            compute_total_and_grade(mark.cat1_score, mark.cat2_score, mark.main_exam_score);
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO marks.assessment_records
            (id, student_id, subject_id, teacher_id, cat1_score, cat2_score, main_exam_score,
             total_score, grade, term, academic_year, comments)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (student_id, subject_id, term, academic_year) DO UPDATE
            SET teacher_id = EXCLUDED.teacher_id,
                cat1_score = EXCLUDED.cat1_score,
                cat2_score = EXCLUDED.cat2_score,
                main_exam_score = EXCLUDED.main_exam_score,
                total_score = EXCLUDED.total_score,
                grade = EXCLUDED.grade,
                comments = EXCLUDED.comments,
                last_modified = CURRENT_DATE
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(mark.student_id)
        .bind(mark.subject_id)
        .bind(mark.teacher_id)
        .bind(mark.cat1_score)
        .bind(mark.cat2_score)
        .bind(mark.main_exam_score)
        .bind(total_score)
        .bind(grade.letter().to_string())
        .bind(&mark.term)
        .bind(&mark.academic_year)
        .bind(&mark.comments)
        .fetch_one(&self.pool)
        .await?
        .get("id");

        let row = sqlx::query(&format!("{RECORD_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        record_from_row(&row)
    }

    async fn upsert_trend(&self, trend: &PerformanceTrend) -> Result<PerformanceTrend, StoreError> {
        let subjects_passed = to_count("subjects_passed", trend.subjects_passed)?;
        let total_subjects = to_count("total_subjects", trend.total_subjects)?;
        let mut grade_counts = [0i32; 6];
        for ((slot, column), count) in grade_counts
            .iter_mut()
            .zip(GRADE_COUNT_COLUMNS)
            .zip(trend.grade_distribution.counts())
        {
            *slot = to_count(column, count)?;
        }

        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO marks.performance_trends
            (id, student_id, term, academic_year, current_term_average, previous_term_average,
             overall_average, score_change, percentage_change, trend, trend_direction,
             strongest_subject_id, strongest_subject_score, weakest_subject_id,
             weakest_subject_score, most_improved_subject_id, improvement_amount,
             subjects_passed, total_subjects, pass_rate,
             grade_a_count, grade_b_count, grade_c_count, grade_d_count, grade_e_count,
             grade_f_count, strengths, weaknesses, analysis_summary, recommendations,
             action_items, is_active, generated_by, date_generated, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32,
                    $33, $34, $35)
            ON CONFLICT (student_id, term, academic_year) DO UPDATE
            SET current_term_average = EXCLUDED.current_term_average,
                previous_term_average = EXCLUDED.previous_term_average,
                overall_average = EXCLUDED.overall_average,
                score_change = EXCLUDED.score_change,
                percentage_change = EXCLUDED.percentage_change,
                trend = EXCLUDED.trend,
                trend_direction = EXCLUDED.trend_direction,
                strongest_subject_id = EXCLUDED.strongest_subject_id,
                strongest_subject_score = EXCLUDED.strongest_subject_score,
                weakest_subject_id = EXCLUDED.weakest_subject_id,
                weakest_subject_score = EXCLUDED.weakest_subject_score,
                most_improved_subject_id = EXCLUDED.most_improved_subject_id,
                improvement_amount = EXCLUDED.improvement_amount,
                subjects_passed = EXCLUDED.subjects_passed,
                total_subjects = EXCLUDED.total_subjects,
                pass_rate = EXCLUDED.pass_rate,
                grade_a_count = EXCLUDED.grade_a_count,
                grade_b_count = EXCLUDED.grade_b_count,
                grade_c_count = EXCLUDED.grade_c_count,
                grade_d_count = EXCLUDED.grade_d_count,
                grade_e_count = EXCLUDED.grade_e_count,
                grade_f_count = EXCLUDED.grade_f_count,
                strengths = EXCLUDED.strengths,
                weaknesses = EXCLUDED.weaknesses,
                analysis_summary = EXCLUDED.analysis_summary,
                recommendations = EXCLUDED.recommendations,
                action_items = EXCLUDED.action_items,
                is_active = EXCLUDED.is_active,
                generated_by = EXCLUDED.generated_by,
                last_updated = now()
            RETURNING id
            "#,
        )
        .bind(trend.id)
        .bind(trend.student_id)
        .bind(&trend.term)
        .bind(&trend.academic_year)
        .bind(trend.current_term_average)
        .bind(trend.previous_term_average)
        .bind(trend.overall_average)
        .bind(trend.score_change)
        .bind(trend.percentage_change)
        .bind(trend.trend.as_str())
        .bind(trend.trend_direction.as_str())
        .bind(trend.strongest_subject.as_ref().map(|s| s.subject_id))
        .bind(trend.strongest_subject.as_ref().map(|s| s.score))
        .bind(trend.weakest_subject.as_ref().map(|s| s.subject_id))
        .bind(trend.weakest_subject.as_ref().map(|s| s.score))
        .bind(trend.most_improved_subject.as_ref().map(|s| s.subject_id))
        .bind(trend.most_improved_subject.as_ref().map(|s| s.score))
        .bind(subjects_passed)
        .bind(total_subjects)
        .bind(trend.pass_rate)
        .bind(grade_counts[0])
        .bind(grade_counts[1])
        .bind(grade_counts[2])
        .bind(grade_counts[3])
        .bind(grade_counts[4])
        .bind(grade_counts[5])
        .bind(&trend.strengths)
        .bind(&trend.weaknesses)
        .bind(&trend.analysis_summary)
        .bind(&trend.recommendations)
        .bind(&trend.action_items)
        .bind(trend.is_active)
        .bind(trend.generated_by)
        .bind(trend.date_generated)
        .bind(trend.last_updated)
        .fetch_one(&self.pool)
        .await?
        .get("id");

        self.trend_by_id(id).await
    }

    async fn trends_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<PerformanceTrend>, StoreError> {
        sqlx::query(&format!(
            "{TREND_SELECT} WHERE t.student_id = $1 ORDER BY t.academic_year DESC, t.term DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(trend_from_row)
        .collect()
    }

    async fn count_trends(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM marks.performance_trends")
            .fetch_one(&self.pool)
            .await?
            .get("count");
        Ok(count.max(0) as u64)
    }

    async fn active_trends(&self) -> Result<Vec<PerformanceTrend>, StoreError> {
        sqlx::query(&format!(
            "{TREND_SELECT} WHERE t.is_active ORDER BY t.academic_year DESC, t.term, t.student_id"
        ))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(trend_from_row)
        .collect()
    }

    async fn deactivate_trends(&self, trend_ids: &[Uuid]) -> Result<u64, StoreError> {
        if trend_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE marks.performance_trends \
             SET is_active = FALSE, last_updated = now() \
             WHERE id = ANY($1) AND is_active",
        )
        .bind(trend_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("id"),
        full_name: row.get("full_name"),
        admission_number: row.get("admission_number"),
        class_grade: row.get("class_grade"),
        section: row.get("section"),
    }
}

fn record_from_row(row: &PgRow) -> Result<AssessmentRecord, StoreError> {
    let letter: String = row.try_get("grade")?;
    let grade = letter
        .trim()
        .chars()
        .next()
        .and_then(Grade::from_letter)
        .ok_or(StoreError::InvalidStoredValue {
            field: "grade",
            value: letter.clone(),
        })?;

    Ok(AssessmentRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        subject_name: row.try_get("subject_name")?,
        teacher_id: row.try_get("teacher_id")?,
        cat1_score: row.try_get("cat1_score")?,
        cat2_score: row.try_get("cat2_score")?,
        main_exam_score: row.try_get("main_exam_score")?,
        total_score: row.try_get("total_score")?,
        grade,
        term: row.try_get("term")?,
        academic_year: row.try_get("academic_year")?,
        comments: row.try_get("comments")?,
        date_entered: row.try_get("date_entered")?,
        last_modified: row.try_get("last_modified")?,
    })
}

fn trend_from_row(row: &PgRow) -> Result<PerformanceTrend, StoreError> {
    let trend_value: String = row.try_get("trend")?;
    let trend = TrendCategory::parse(&trend_value).ok_or(StoreError::InvalidStoredValue {
        field: "trend",
        value: trend_value.clone(),
    })?;
    let direction_value: String = row.try_get("trend_direction")?;
    let trend_direction =
        TrendDirection::parse(&direction_value).ok_or(StoreError::InvalidStoredValue {
            field: "trend_direction",
            value: direction_value.clone(),
        })?;

    let mut counts = [0usize; 6];
    for (slot, column) in counts.iter_mut().zip(GRADE_COUNT_COLUMNS) {
        *slot = from_count(row, column)?;
    }

    Ok(PerformanceTrend {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        term: row.try_get("term")?,
        academic_year: row.try_get("academic_year")?,
        current_term_average: row.try_get("current_term_average")?,
        previous_term_average: row.try_get("previous_term_average")?,
        overall_average: row.try_get("overall_average")?,
        score_change: row.try_get("score_change")?,
        percentage_change: row.try_get("percentage_change")?,
        trend,
        trend_direction,
        strongest_subject: extreme_from_row(
            row,
            "strongest_subject_id",
            "strongest_subject_name",
            "strongest_subject_score",
        )?,
        weakest_subject: extreme_from_row(
            row,
            "weakest_subject_id",
            "weakest_subject_name",
            "weakest_subject_score",
        )?,
        most_improved_subject: extreme_from_row(
            row,
            "most_improved_subject_id",
            "most_improved_subject_name",
            "improvement_amount",
        )?,
        subjects_passed: from_count(row, "subjects_passed")?,
        total_subjects: from_count(row, "total_subjects")?,
        pass_rate: row.try_get("pass_rate")?,
        grade_distribution: GradeDistribution::from_counts(counts),
        strengths: row.try_get("strengths")?,
        weaknesses: row.try_get("weaknesses")?,
        analysis_summary: row.try_get("analysis_summary")?,
        recommendations: row.try_get("recommendations")?,
        action_items: row.try_get("action_items")?,
        is_active: row.try_get("is_active")?,
        generated_by: row.try_get("generated_by")?,
        date_generated: row.try_get("date_generated")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn extreme_from_row(
    row: &PgRow,
    id_column: &str,
    name_column: &str,
    score_column: &str,
) -> Result<Option<SubjectExtreme>, StoreError> {
    let subject_id: Option<Uuid> = row.try_get(id_column)?;
    let subject_name: Option<String> = row.try_get(name_column)?;
    let score: Option<f64> = row.try_get(score_column)?;

    Ok(match (subject_id, score) {
        (Some(subject_id), Some(score)) => Some(SubjectExtreme {
            subject_id,
            subject_name: subject_name.unwrap_or_default(),
            score,
        }),
        _ => None,
    })
}

fn from_count(row: &PgRow, column: &'static str) -> Result<usize, StoreError> {
    let value: i32 = row.try_get(column)?;
    usize::try_from(value).map_err(|_| StoreError::InvalidStoredValue {
        field: column,
        value: value.to_string(),
    })
}

fn to_count(column: &'static str, value: usize) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::InvalidStoredValue {
        field: column,
        value: value.to_string(),
    })
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Standard subject catalogue as `(code, name, category)`.
pub const SUBJECT_CATALOGUE: [(&str, &str, &str); 18] = [
    ("HIST101", "History", "humanities"),
    ("GEOG101", "Geography", "humanities"),
    ("RE101", "Religious Education", "humanities"),
    ("LIFE101", "Life Skills", "humanities"),
    ("BUS101", "Business Studies", "humanities"),
    ("MUS101", "Music", "creative_arts"),
    ("ART101", "Art and Design", "creative_arts"),
    ("CREA101", "Creative Arts", "creative_arts"),
    ("COMP101", "Computer Studies", "technical"),
    ("TECH101", "Technical Drawing", "technical"),
    ("AGRI101", "Agriculture", "technical"),
    ("MATH101", "Mathematics", "sciences"),
    ("PHYS101", "Physics", "sciences"),
    ("CHEM101", "Chemistry", "sciences"),
    ("BIO101", "Biology", "sciences"),
    ("ENG101", "English", "languages"),
    ("KIS101", "Kiswahili", "languages"),
    ("FREN101", "French", "languages"),
];

pub async fn load_subjects(pool: &PgPool) -> anyhow::Result<usize> {
    let mut created = 0usize;
    for (code, name, category) in SUBJECT_CATALOGUE {
        let result = sqlx::query(
            r#"
            INSERT INTO marks.subjects (id, code, name, category)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(name)
        .bind(category)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            created += 1;
        } else {
            info!(code, "subject already exists");
        }
    }
    Ok(created)
}

pub async fn seed(store: &PgStore) -> anyhow::Result<()> {
    load_subjects(store.pool()).await?;

    let students = [
        ("ADM-2024-001", "Wanjiru Kamau", "Form 2", "East"),
        ("ADM-2024-002", "Otieno Achieng", "Form 2", "West"),
        ("ADM-2024-003", "Amina Hassan", "Form 3", "East"),
    ];

    // (admission, subject code, cat1, cat2, main exam, term)
    let marks = [
        ("ADM-2024-001", "MATH101", Some(55.0), Some(60.0), 48.0, "Term 1"),
        ("ADM-2024-001", "ENG101", Some(62.0), None, 58.0, "Term 1"),
        ("ADM-2024-001", "BIO101", Some(40.0), Some(45.0), 35.0, "Term 1"),
        ("ADM-2024-001", "MATH101", Some(70.0), Some(72.0), 68.0, "Term 2"),
        ("ADM-2024-001", "ENG101", Some(66.0), Some(64.0), 70.0, "Term 2"),
        ("ADM-2024-001", "BIO101", Some(55.0), Some(50.0), 52.0, "Term 2"),
        ("ADM-2024-002", "MATH101", Some(85.0), Some(88.0), 90.0, "Term 1"),
        ("ADM-2024-002", "CHEM101", Some(78.0), Some(80.0), 82.0, "Term 1"),
        ("ADM-2024-002", "MATH101", Some(70.0), Some(65.0), 72.0, "Term 2"),
        ("ADM-2024-002", "CHEM101", Some(60.0), Some(58.0), 61.0, "Term 2"),
        ("ADM-2024-003", "KIS101", Some(50.0), Some(52.0), 55.0, "Term 1"),
        ("ADM-2024-003", "HIST101", None, None, 30.0, "Term 1"),
    ];

    for (admission, name, class_grade, section) in students {
        store
            .upsert_student(admission, name, class_grade, section)
            .await?;
    }

    for (admission, code, cat1, cat2, main_exam, term) in marks {
        let student = store
            .find_student_by_admission(admission)
            .await?
            .context("seed student missing")?;
        let subject = store
            .find_subject_by_code(code)
            .await?
            .context("seed subject missing")?;

        let graded = MarkEntry {
            student_id: student.id,
            subject_id: subject.id,
            teacher_id: None,
            cat1_score: cat1,
            cat2_score: cat2,
            main_exam_score: Some(main_exam),
            term: term.to_string(),
            academic_year: "2024".to_string(),
            comments: String::new(),
        }
        .grade()?;
        store.save_mark(&graded).await?;
    }

    Ok(())
}

#[derive(serde::Deserialize)]
struct CsvRow {
    admission_number: String,
    full_name: String,
    #[serde(default)]
    class_grade: String,
    #[serde(default)]
    section: String,
    subject_code: String,
    cat1_score: Option<f64>,
    cat2_score: Option<f64>,
    main_exam_score: Option<f64>,
    term: String,
    academic_year: String,
    #[serde(default)]
    comments: String,
}

pub async fn import_csv(store: &dyn MarksStore, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    Ok(import_marks(store, reader).await?)
}

/// Saves every usable row and returns how many were saved. Rows that do not parse,
/// name an unknown subject or carry invalid scores are logged and skipped.
pub async fn import_marks<R: std::io::Read>(
    store: &dyn MarksStore,
    mut reader: csv::Reader<R>,
) -> Result<usize, StoreError> {
    let mut saved = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(line, error = %err, "unreadable row skipped");
                continue;
            }
        };

        let Some(subject) = store.find_subject_by_code(&row.subject_code).await? else {
            warn!(line, code = %row.subject_code, "unknown subject code, row skipped");
            continue;
        };

        let entry = MarkEntry {
            student_id: Uuid::nil(),
            subject_id: subject.id,
            teacher_id: None,
            cat1_score: row.cat1_score,
            cat2_score: row.cat2_score,
            main_exam_score: row.main_exam_score,
            term: row.term,
            academic_year: row.academic_year,
            comments: row.comments,
        };
        let graded = match entry.grade() {
            Ok(graded) => graded,
            Err(err) => {
                warn!(line, admission = %row.admission_number, error = %err, "invalid scores, row skipped");
                continue;
            }
        };

        // The student is only written once the row is known to be valid.
        let student_id = store
            .upsert_student(
                &row.admission_number,
                &row.full_name,
                &row.class_grade,
                &row.section,
            )
            .await?;
        store
            .save_mark(&GradedMark {
                student_id,
                ..graded
            })
            .await?;
        saved += 1;
    }

    info!(saved, "mark import finished");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::store::memory::MemoryStore;

    async fn store_with_catalogue() -> MemoryStore {
        let store = MemoryStore::new();
        for (index, (code, name, category)) in SUBJECT_CATALOGUE.iter().enumerate() {
            store
                .add_subject(Subject {
                    id: Uuid::from_u128(index as u128 + 1),
                    code: code.to_string(),
                    name: name.to_string(),
                    category: category.to_string(),
                })
                .await;
        }
        store
    }

    fn reader(rows: &str) -> csv::Reader<Cursor<String>> {
        csv::Reader::from_reader(Cursor::new(format!("{HEADER}{rows}")))
    }

    const HEADER: &str = "admission_number,full_name,class_grade,section,subject_code,\
cat1_score,cat2_score,main_exam_score,term,academic_year,comments\n";

    #[test]
    fn oversized_counts_are_rejected() {
        assert_eq!(to_count("total_subjects", 12).expect("fits"), 12);
        let err = to_count("total_subjects", i32::MAX as usize + 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidStoredValue { field: "total_subjects", .. }
        ));
    }

    #[tokio::test]
    async fn import_skips_bad_rows_and_keeps_going() {
        let store = store_with_catalogue().await;
        let rows = "\
ADM-1,Wanjiru Kamau,Form 2,East,MATH101,50,60,70,Term 1,2024,steady\n\
ADM-2,Otieno Achieng,Form 2,West,ENG101,abc,60,70,Term 1,2024,\n\
ADM-3,Amina Hassan,Form 3,East,BIO101,50,60,140,Term 1,2024,\n\
ADM-4,Baraka Mwangi,Form 1,North,XYZ999,50,60,70,Term 1,2024,\n";

        let saved = import_marks(&store, reader(rows)).await.expect("import");
        assert_eq!(saved, 1);

        let records = store.all_records().await.expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject_name, "Mathematics");
        assert_eq!(records[0].total_score, 64.0);
        assert_eq!(records[0].grade, Grade::C);

        let students = store.list_students().await.expect("students");
        let admissions: Vec<&str> = students.iter().map(|s| s.admission_number.as_str()).collect();
        assert_eq!(admissions, ["ADM-1"]);
    }

    #[tokio::test]
    async fn import_updates_existing_mark_and_student() {
        let store = store_with_catalogue().await;
        let first = "ADM-1,Wanjiru Kamau,Form 2,East,MATH101,,,50,Term 1,2024,\n";
        let second = "ADM-1,Wanjiru Kamau,Form 3,East,MATH101,,,100,Term 1,2024,\n";

        assert_eq!(import_marks(&store, reader(first)).await.expect("import"), 1);
        assert_eq!(import_marks(&store, reader(second)).await.expect("import"), 1);

        let records = store.all_records().await.expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_score, 60.0);

        let student = store
            .find_student_by_admission("ADM-1")
            .await
            .expect("lookup")
            .expect("student");
        assert_eq!(student.class_grade, "Form 3");
    }
}
