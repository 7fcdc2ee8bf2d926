use marks_trend_analytics::db::{self, PgStore};
use marks_trend_analytics::grading::MarkEntry;
use marks_trend_analytics::models::{Grade, TermKey};
use marks_trend_analytics::store::MarksStore;
use marks_trend_analytics::trends::{self, BatchFilter};

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

#[tokio::test]
async fn seeded_school_generates_one_trend_per_term() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("DATABASE_URL not set, skipping Postgres smoke test");
        return Ok(());
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;
    db::init_db(&pool).await?;
    let store = PgStore::new(pool);
    db::seed(&store).await?;

    let student = store
        .find_student_by_admission("ADM-2024-001")
        .await?
        .expect("seeded student");

    let summary = trends::generate_all(&store, &BatchFilter::default(), None).await?;
    assert_eq!(summary.failed, 0);
    assert!(summary.generated >= 2);

    // Regenerating must update the same row, not add another.
    let key = TermKey::new("Term 2", "2024");
    let first = trends::persist_trend(&store, student.id, &key, None)
        .await?
        .expect("trend");
    let second = trends::persist_trend(&store, student.id, &key, None)
        .await?
        .expect("trend");
    assert_eq!(first.id, second.id);

    let stored = store.trends_for_student(student.id).await?;
    let for_term: Vec<_> = stored.iter().filter(|t| t.term_key() == key).collect();
    assert_eq!(for_term.len(), 1);
    assert!(for_term[0].previous_term_average.is_some());
    assert!(!for_term[0].analysis_summary.is_empty());

    // Saving always recomputes total and grade from the component scores.
    let subject = store
        .find_subject_by_code("PHYS101")
        .await?
        .expect("catalogue subject");
    let mut graded = MarkEntry {
        student_id: student.id,
        subject_id: subject.id,
        teacher_id: None,
        cat1_score: None,
        cat2_score: None,
        main_exam_score: Some(10.0),
        term: "Term 2".to_string(),
        academic_year: "2024".to_string(),
        comments: String::new(),
    }
    .grade()?;
    graded.total_score = 99.0;
    graded.grade = Grade::A;
    let saved = store.save_mark(&graded).await?;
    assert_eq!(saved.total_score, 6.0);
    assert_eq!(saved.grade, Grade::F);

    let analysis = trends::generate_trend_analysis(&store, student.id)
        .await?
        .expect("analysis");
    assert!(analysis.has_multiple_terms);

    Ok(())
}
