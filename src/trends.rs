use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analytics;
use crate::error::StoreError;
use crate::models::{
    AssessmentRecord, PerformanceTrend, Student, TermComparison, TermKey, TermPerformance,
    TrendAnalysis, TrendCategory, TrendDirection,
};
use crate::report;
use crate::store::MarksStore;

pub async fn term_performance(
    store: &dyn MarksStore,
    student_id: Uuid,
    key: &TermKey,
) -> Result<Option<TermPerformance>, StoreError> {
    let records = store.records_for_student(student_id, Some(key)).await?;
    Ok(analytics::term_performance(&records, key))
}

/// On-demand analysis of a student's whole history. Nothing is persisted.
pub async fn generate_trend_analysis(
    store: &dyn MarksStore,
    student_id: Uuid,
) -> Result<Option<TrendAnalysis>, StoreError> {
    let Some(student) = store.find_student(student_id).await? else {
        return Ok(None);
    };
    let records = store.records_for_student(student_id, None).await?;
    Ok(analytics::analyze(student, &records))
}

/// Ad-hoc comparison of two chosen terms, classified with the three-band scheme.
pub async fn compare_terms(
    store: &dyn MarksStore,
    student_id: Uuid,
    current: &TermKey,
    previous: &TermKey,
) -> Result<Option<TermComparison>, StoreError> {
    let records = store.records_for_student(student_id, None).await?;
    let current = analytics::term_performance(&records, current);
    let previous = analytics::term_performance(&records, previous);
    Ok(analytics::compare_coarse(current.as_ref(), previous.as_ref()))
}

/// Recomputes and upserts the snapshot for one student and term.
///
/// Returns `None` when the student has no records for that term.
pub async fn persist_trend(
    store: &dyn MarksStore,
    student_id: Uuid,
    key: &TermKey,
    generated_by: Option<Uuid>,
) -> Result<Option<PerformanceTrend>, StoreError> {
    let records = store.records_for_student(student_id, None).await?;
    persist_from_records(store, student_id, &records, key, generated_by).await
}

async fn persist_from_records(
    store: &dyn MarksStore,
    student_id: Uuid,
    records: &[AssessmentRecord],
    key: &TermKey,
    generated_by: Option<Uuid>,
) -> Result<Option<PerformanceTrend>, StoreError> {
    let performances = analytics::term_performances(records);
    let Some(position) = performances.iter().position(|p| p.key == *key) else {
        return Ok(None);
    };

    let Some(trend) = build_trend(student_id, &performances[..=position], generated_by) else {
        return Ok(None);
    };
    let saved = store.upsert_trend(&trend).await?;
    debug!(%student_id, term = %key, trend = saved.trend.as_str(), "trend saved");
    Ok(Some(saved))
}

/// Builds the snapshot for the last entry of `history`, comparing it with the
/// entry before it when there is one.
pub fn build_trend(
    student_id: Uuid,
    history: &[TermPerformance],
    generated_by: Option<Uuid>,
) -> Option<PerformanceTrend> {
    let (current, earlier) = history.split_last()?;
    let now = Utc::now();
    let previous = earlier.last();
    let comparison = analytics::compare(Some(current), previous);
    let (strongest_subject, weakest_subject) = analytics::subject_extremes(&current.subject_scores);

    let distribution = current.grade_distribution;
    let subjects_passed = distribution.passed();
    let total_subjects = current.subject_count;
    let overall_average =
        history.iter().map(|p| p.average_score).sum::<f64>() / history.len() as f64;

    let (trend, trend_direction) = comparison
        .as_ref()
        .map(|c| (c.trend, c.trend_direction))
        .unwrap_or((TrendCategory::Stable, TrendDirection::Neutral));

    let mut snapshot = PerformanceTrend {
        id: Uuid::new_v4(),
        student_id,
        term: current.key.term.clone(),
        academic_year: current.key.academic_year.clone(),
        current_term_average: current.average_score,
        previous_term_average: previous.map(|p| p.average_score),
        overall_average: Some(overall_average),
        score_change: comparison.as_ref().map(|c| c.average_change),
        percentage_change: comparison.as_ref().map(|c| c.percentage_change),
        trend,
        trend_direction,
        strongest_subject,
        weakest_subject,
        most_improved_subject: comparison.and_then(|c| c.most_improved_subject),
        subjects_passed,
        total_subjects,
        pass_rate: analytics::pass_rate(subjects_passed, total_subjects),
        grade_distribution: distribution,
        strengths: report::strengths(current),
        weaknesses: report::weaknesses(current),
        analysis_summary: String::new(),
        recommendations: String::new(),
        action_items: String::new(),
        is_active: true,
        generated_by,
        date_generated: now,
        last_updated: now,
    };

    let text = report::build_analysis(&snapshot);
    snapshot.analysis_summary = text.summary;
    snapshot.recommendations = text.recommendations;
    snapshot.action_items = text.action_items;
    Some(snapshot)
}

/// Re-persists the snapshot for the student's most recent term.
pub async fn regenerate_for_student(
    store: &dyn MarksStore,
    student_id: Uuid,
    generated_by: Option<Uuid>,
) -> Result<Option<PerformanceTrend>, StoreError> {
    let records = store.records_for_student(student_id, None).await?;
    let latest = analytics::term_performances(&records)
        .last()
        .map(|p| p.key.clone());
    match latest {
        Some(key) => persist_from_records(store, student_id, &records, &key, generated_by).await,
        None => Ok(None),
    }
}

/// Restricts batch generation to students with records in a year and/or term.
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub academic_year: Option<String>,
    pub term: Option<String>,
}

impl BatchFilter {
    fn admits(&self, records: &[AssessmentRecord]) -> bool {
        let year_ok = self
            .academic_year
            .as_deref()
            .map_or(true, |year| records.iter().any(|r| r.academic_year == year));
        let term_ok = self
            .term
            .as_deref()
            .map_or(true, |term| records.iter().any(|r| r.term == term));
        year_ok && term_ok
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub students: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generated {} of {} ({} skipped, {} failed)",
            self.generated, self.students, self.skipped, self.failed
        )
    }
}

/// Generates and stores the latest-term snapshot for every eligible student.
///
/// Students need at least two terms of records. A failure for one student is
/// logged and counted; it never stops the batch.
pub async fn generate_all(
    store: &dyn MarksStore,
    filter: &BatchFilter,
    generated_by: Option<Uuid>,
) -> Result<BatchSummary, StoreError> {
    let students = store.list_students().await?;
    let mut summary = BatchSummary {
        students: students.len(),
        ..BatchSummary::default()
    };

    for student in students {
        let student_id = student.id;
        match generate_for_student(store, student, filter, generated_by).await {
            Ok(true) => summary.generated += 1,
            Ok(false) => summary.skipped += 1,
            Err(err) => {
                warn!(%student_id, error = %err, "trend generation failed, student skipped");
                summary.failed += 1;
            }
        }
    }

    info!(
        students = summary.students,
        generated = summary.generated,
        skipped = summary.skipped,
        failed = summary.failed,
        "trend generation finished"
    );
    Ok(summary)
}

async fn generate_for_student(
    store: &dyn MarksStore,
    student: Student,
    filter: &BatchFilter,
    generated_by: Option<Uuid>,
) -> Result<bool, StoreError> {
    let student_id = student.id;
    let records = store.records_for_student(student_id, None).await?;
    let Some(analysis) = analytics::analyze(student, &records) else {
        return Ok(false);
    };
    if !analysis.has_multiple_terms || !filter.admits(&records) {
        return Ok(false);
    }
    let Some(latest) = analysis.latest() else {
        return Ok(false);
    };

    let saved = persist_from_records(store, student_id, &records, &latest.key, generated_by).await?;
    Ok(saved.is_some())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPerformer {
    pub student: Student,
    pub average_score: f64,
    pub total_subjects: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermStat {
    pub key: TermKey,
    pub average_score: f64,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolOverview {
    pub total_students: usize,
    pub total_records: usize,
    pub top_performers: Vec<TopPerformer>,
    pub term_stats: Vec<TermStat>,
}

/// School-wide dashboard figures: best overall averages and per-term statistics.
pub async fn school_overview(
    store: &dyn MarksStore,
    limit: usize,
) -> Result<SchoolOverview, StoreError> {
    let students = store.list_students().await?;
    let records = store.all_records().await?;

    let mut totals: BTreeMap<Uuid, (f64, usize)> = BTreeMap::new();
    for record in &records {
        let entry = totals.entry(record.student_id).or_insert((0.0, 0));
        entry.0 += record.total_score;
        entry.1 += 1;
    }

    let mut top_performers: Vec<TopPerformer> = students
        .iter()
        .filter_map(|student| {
            let (sum, count) = totals.get(&student.id)?;
            Some(TopPerformer {
                student: student.clone(),
                average_score: sum / *count as f64,
                total_subjects: *count,
            })
        })
        .collect();
    top_performers.sort_by(|a, b| {
        b.average_score
            .partial_cmp(&a.average_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.student.full_name.cmp(&b.student.full_name))
    });
    top_performers.truncate(limit);

    let mut stats = term_stats(&records);
    stats.sort_by(|a, b| {
        b.key
            .academic_year
            .cmp(&a.key.academic_year)
            .then_with(|| a.key.term.cmp(&b.key.term))
    });
    stats.truncate(limit);

    Ok(SchoolOverview {
        total_students: students.len(),
        total_records: records.len(),
        top_performers,
        term_stats: stats,
    })
}

fn term_stats(records: &[AssessmentRecord]) -> Vec<TermStat> {
    let mut grouped: Vec<(TermKey, f64, usize)> = Vec::new();
    for record in records {
        let key = record.term_key();
        match grouped.iter_mut().find(|(existing, _, _)| *existing == key) {
            Some(entry) => {
                entry.1 += record.total_score;
                entry.2 += 1;
            }
            None => grouped.push((key, record.total_score, 1)),
        }
    }
    grouped
        .into_iter()
        .map(|(key, sum, count)| TermStat {
            key,
            average_score: sum / count as f64,
            record_count: count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortComparison {
    pub first: TermStat,
    pub second: TermStat,
    pub difference: f64,
    pub percentage_change: f64,
}

/// School-wide average of `second` against `first`; `None` unless both have records.
pub async fn cohort_term_comparison(
    store: &dyn MarksStore,
    first: &TermKey,
    second: &TermKey,
) -> Result<Option<CohortComparison>, StoreError> {
    let records = store.all_records().await?;
    let stats = term_stats(&records);
    let find = |key: &TermKey| stats.iter().find(|stat| stat.key == *key).cloned();

    Ok(match (find(first), find(second)) {
        (Some(first), Some(second)) => Some(CohortComparison {
            difference: second.average_score - first.average_score,
            percentage_change: analytics::percentage_change(
                second.average_score,
                first.average_score,
            ),
            first,
            second,
        }),
        _ => None,
    })
}
