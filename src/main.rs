use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use marks_trend_analytics::config::Settings;
use marks_trend_analytics::db::{self, PgStore};
use marks_trend_analytics::grading::MarkEntry;
use marks_trend_analytics::models::{Student, TermKey};
use marks_trend_analytics::store::MarksStore;
use marks_trend_analytics::{report, telemetry, trends};

#[derive(Parser)]
#[command(name = "marks-trends")]
#[command(about = "Grade computation and performance trend analytics for school marks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the subject catalogue and sample marks
    Seed,
    /// Import marks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record (or update) one student's scores in one subject
    RecordMark {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        cat1: Option<f64>,
        #[arg(long)]
        cat2: Option<f64>,
        #[arg(long)]
        main_exam: Option<f64>,
        #[arg(long)]
        term: String,
        #[arg(long)]
        year: String,
        #[arg(long)]
        teacher: Option<Uuid>,
        #[arg(long, default_value = "")]
        comments: String,
    },
    /// Show the term-by-term analysis for one student without saving it
    Analyze {
        #[arg(long)]
        student: String,
        #[arg(long)]
        json: bool,
    },
    /// Compare two chosen terms for one student
    Compare {
        #[arg(long)]
        student: String,
        #[arg(long)]
        from_term: String,
        #[arg(long)]
        from_year: String,
        #[arg(long)]
        to_term: String,
        #[arg(long)]
        to_year: String,
    },
    /// Generate and store trends for every student with two or more terms
    GenerateTrends {
        #[arg(long)]
        academic_year: Option<String>,
        #[arg(long)]
        term: Option<String>,
        #[arg(long)]
        generated_by: Option<Uuid>,
    },
    /// Regenerate the latest-term trend for one student
    Regenerate {
        #[arg(long)]
        student: String,
        #[arg(long)]
        generated_by: Option<Uuid>,
    },
    /// List stored trends for one student
    Trends {
        #[arg(long)]
        student: String,
    },
    /// Mark stored trends as inactive
    Deactivate {
        #[arg(long = "id", required = true)]
        ids: Vec<Uuid>,
    },
    /// School-wide top performers and term statistics
    Overview {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Compare school-wide averages between two terms
    CohortCompare {
        #[arg(long)]
        from_term: String,
        #[arg(long)]
        from_year: String,
        #[arg(long)]
        to_term: String,
        #[arg(long)]
        to_year: String,
    },
    /// Write a markdown performance report for one student
    Report {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    telemetry::init_tracing(&settings)?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections())
        .connect(settings.database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool);

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&store).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let saved = db::import_csv(&store, &csv).await?;
            println!("Saved {saved} marks from {}.", csv.display());
        }
        Commands::RecordMark {
            student,
            subject,
            cat1,
            cat2,
            main_exam,
            term,
            year,
            teacher,
            comments,
        } => {
            let student = lookup_student(&store, &student).await?;
            let subject = store
                .find_subject_by_code(&subject)
                .await?
                .with_context(|| format!("no subject with code {subject}"))?;
            let graded = MarkEntry {
                student_id: student.id,
                subject_id: subject.id,
                teacher_id: teacher,
                cat1_score: cat1,
                cat2_score: cat2,
                main_exam_score: main_exam,
                term,
                academic_year: year,
                comments,
            }
            .grade()?;
            let record = store.save_mark(&graded).await?;
            println!(
                "{} - {} - {:.2}% ({})",
                student.full_name, record.subject_name, record.total_score, record.grade
            );
        }
        Commands::Analyze { student, json } => {
            let student = lookup_student(&store, &student).await?;
            let Some(analysis) = trends::generate_trend_analysis(&store, student.id).await? else {
                println!("Insufficient data for performance analysis.");
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
                return Ok(());
            }

            println!("{} ({})", analysis.student.full_name, analysis.student.admission_number);
            for performance in &analysis.performances {
                println!(
                    "- {}: average {:.2} across {} subjects",
                    performance.key, performance.average_score, performance.subject_count
                );
            }
            for comparison in &analysis.comparisons {
                println!(
                    "- {} -> {}: {:+.1}% ({})",
                    comparison.previous,
                    comparison.current,
                    comparison.percentage_change,
                    comparison.trend.label()
                );
            }
            println!(
                "Overall: {} ({:+.1}%)",
                analysis.overall_trend, analysis.overall_percentage
            );
        }
        Commands::Compare {
            student,
            from_term,
            from_year,
            to_term,
            to_year,
        } => {
            let student = lookup_student(&store, &student).await?;
            let previous = TermKey::new(from_term, from_year);
            let current = TermKey::new(to_term, to_year);
            let Some(comparison) =
                trends::compare_terms(&store, student.id, &current, &previous).await?
            else {
                println!("Both terms need marks to compare.");
                return Ok(());
            };

            println!(
                "{} -> {}: {:.2} -> {:.2} ({:+.1}%, {})",
                comparison.previous,
                comparison.current,
                comparison.previous_average,
                comparison.current_average,
                comparison.percentage_change,
                comparison.trend.label()
            );
            for subject in comparison.subject_comparison.values() {
                println!(
                    "- {}: {:.2} ({}) -> {:.2} ({}), {:+.2}",
                    subject.subject_name,
                    subject.previous_score,
                    subject.previous_grade,
                    subject.current_score,
                    subject.current_grade,
                    subject.change
                );
            }
        }
        Commands::GenerateTrends {
            academic_year,
            term,
            generated_by,
        } => {
            let filter = trends::BatchFilter {
                academic_year,
                term,
            };
            let summary = trends::generate_all(&store, &filter, generated_by).await?;
            println!("Performance trends: {summary}.");
        }
        Commands::Regenerate {
            student,
            generated_by,
        } => {
            let student = lookup_student(&store, &student).await?;
            match trends::regenerate_for_student(&store, student.id, generated_by).await? {
                Some(trend) => println!(
                    "Regenerated {} for {} ({}).",
                    trend.term_key(),
                    student.full_name,
                    trend.trend_label()
                ),
                None => println!("No marks recorded for {}.", student.full_name),
            }
        }
        Commands::Trends { student } => {
            let student = lookup_student(&store, &student).await?;
            let stored = store.trends_for_student(student.id).await?;
            if stored.is_empty() {
                println!("No trends stored for {}.", student.full_name);
                return Ok(());
            }
            for trend in stored {
                println!(
                    "- {} {}: {:.2} {} ({}){}",
                    trend.id,
                    trend.term_key(),
                    trend.current_term_average,
                    trend.trend_label(),
                    trend.performance_level(),
                    if trend.is_active { "" } else { " [inactive]" }
                );
            }
        }
        Commands::Deactivate { ids } => {
            let updated = store.deactivate_trends(&ids).await?;
            println!("Marked {updated} trends inactive.");
        }
        Commands::Overview { limit } => {
            let overview = trends::school_overview(&store, limit).await?;
            let stored = store.count_trends().await?;
            println!(
                "{} students, {} marks, {} stored trends",
                overview.total_students, overview.total_records, stored
            );
            println!("Top performers:");
            for performer in &overview.top_performers {
                println!(
                    "- {} ({}) average {:.2} across {} subjects",
                    performer.student.full_name,
                    performer.student.admission_number,
                    performer.average_score,
                    performer.total_subjects
                );
            }
            println!("Terms:");
            for stat in &overview.term_stats {
                println!(
                    "- {}: average {:.2} over {} marks",
                    stat.key, stat.average_score, stat.record_count
                );
            }
        }
        Commands::CohortCompare {
            from_term,
            from_year,
            to_term,
            to_year,
        } => {
            let first = TermKey::new(from_term, from_year);
            let second = TermKey::new(to_term, to_year);
            match trends::cohort_term_comparison(&store, &first, &second).await? {
                Some(comparison) => println!(
                    "{} ({:.2}, {} marks) -> {} ({:.2}, {} marks): {:+.2} ({:+.1}%)",
                    comparison.first.key,
                    comparison.first.average_score,
                    comparison.first.record_count,
                    comparison.second.key,
                    comparison.second.average_score,
                    comparison.second.record_count,
                    comparison.difference,
                    comparison.percentage_change
                ),
                None => println!("Both terms need marks to compare."),
            }
        }
        Commands::Report { student, out } => {
            let student = lookup_student(&store, &student).await?;
            let Some(analysis) = trends::generate_trend_analysis(&store, student.id).await? else {
                println!("Insufficient data for performance analysis.");
                return Ok(());
            };
            let stored = store.trends_for_student(student.id).await?;
            let report = report::build_student_report(&analysis, &stored);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn lookup_student(store: &PgStore, admission_number: &str) -> anyhow::Result<Student> {
    store
        .find_student_by_admission(admission_number)
        .await?
        .with_context(|| format!("no student with admission number {admission_number}"))
}
