use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;
use uuid::Uuid;

use crate::grading::round2;
use crate::models::{
    AssessmentRecord, GradeDistribution, OverallTrend, Student, SubjectComparison, SubjectExtreme,
    SubjectScore, TermComparison, TermKey, TermPerformance, TrendAnalysis, TrendCategory,
    TrendDirection,
};

/// Chronological order of term keys.
///
/// Compares `(academic_year, term)` as plain strings, the same order the stored
/// labels sort in. "Term 10" therefore sorts before "Term 2"; swap this comparator
/// for a calendar-aware one if labels ever need that.
pub fn term_order(a: &TermKey, b: &TermKey) -> Ordering {
    a.academic_year
        .cmp(&b.academic_year)
        .then_with(|| a.term.cmp(&b.term))
}

/// Aggregates the records that fall in `key`; `None` when there are none.
pub fn term_performance(records: &[AssessmentRecord], key: &TermKey) -> Option<TermPerformance> {
    let matching: Vec<&AssessmentRecord> = records
        .iter()
        .filter(|record| record.term == key.term && record.academic_year == key.academic_year)
        .collect();
    summarize(key.clone(), &matching)
}

fn summarize(key: TermKey, records: &[&AssessmentRecord]) -> Option<TermPerformance> {
    if records.is_empty() {
        return None;
    }

    let mut grade_distribution = GradeDistribution::default();
    let mut subject_scores = BTreeMap::new();
    let mut total = 0.0;

    for record in records {
        total += record.total_score;
        grade_distribution.record(record.grade);
        subject_scores.insert(
            record.subject_id,
            SubjectScore {
                subject_name: record.subject_name.clone(),
                score: record.total_score,
                grade: record.grade,
            },
        );
    }

    Some(TermPerformance {
        key,
        average_score: total / records.len() as f64,
        subject_count: records.len(),
        grade_distribution,
        subject_scores,
    })
}

/// Groups a student's records into one snapshot per term, oldest first.
pub fn term_performances(records: &[AssessmentRecord]) -> Vec<TermPerformance> {
    let mut keys: Vec<TermKey> = Vec::new();
    for record in records {
        let key = record.term_key();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys.sort_by(term_order);

    keys.into_iter()
        .filter_map(|key| term_performance(records, &key))
        .collect()
}

/// Relative change in percent; a non-positive baseline counts as no change.
pub fn percentage_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

/// Five-band classification used when generating stored trends.
pub fn classify_trend(percentage_change: f64) -> (TrendCategory, TrendDirection) {
    if percentage_change > 10.0 {
        (TrendCategory::SignificantImprovement, TrendDirection::Positive)
    } else if percentage_change > 2.0 {
        (TrendCategory::GradualImprovement, TrendDirection::Positive)
    } else if percentage_change > -2.0 {
        (TrendCategory::Stable, TrendDirection::Neutral)
    } else if percentage_change > -10.0 {
        (TrendCategory::GradualDecline, TrendDirection::Negative)
    } else {
        (TrendCategory::SignificantDecline, TrendDirection::Negative)
    }
}

/// Three-band classification used by ad-hoc two-term comparisons.
pub fn classify_trend_coarse(percentage_change: f64) -> (TrendCategory, TrendDirection) {
    if percentage_change > 5.0 {
        (TrendCategory::Improving, TrendDirection::Positive)
    } else if percentage_change < -5.0 {
        (TrendCategory::Declining, TrendDirection::Negative)
    } else {
        (TrendCategory::Stable, TrendDirection::Neutral)
    }
}

/// Compares two term snapshots with the five-band classifier.
pub fn compare(
    current: Option<&TermPerformance>,
    previous: Option<&TermPerformance>,
) -> Option<TermComparison> {
    Some(build_comparison(current?, previous?, classify_trend))
}

/// Compares two term snapshots with the three-band classifier.
pub fn compare_coarse(
    current: Option<&TermPerformance>,
    previous: Option<&TermPerformance>,
) -> Option<TermComparison> {
    Some(build_comparison(current?, previous?, classify_trend_coarse))
}

fn build_comparison(
    current: &TermPerformance,
    previous: &TermPerformance,
    classify: fn(f64) -> (TrendCategory, TrendDirection),
) -> TermComparison {
    let change = percentage_change(current.average_score, previous.average_score);
    let (trend, trend_direction) = classify(change);

    // Only subjects taken in both terms are compared.
    let subject_comparison: BTreeMap<Uuid, SubjectComparison> = current
        .subject_scores
        .iter()
        .filter_map(|(subject_id, now)| {
            let before = previous.subject_scores.get(subject_id)?;
            let delta = now.score - before.score;
            Some((
                *subject_id,
                SubjectComparison {
                    subject_name: now.subject_name.clone(),
                    current_score: now.score,
                    previous_score: before.score,
                    change: delta,
                    percentage_change: percentage_change(now.score, before.score),
                    current_grade: now.grade,
                    previous_grade: before.grade,
                },
            ))
        })
        .collect();

    let strongest_subject = pick(&subject_comparison, |c| c.current_score, Ordering::Greater);
    let weakest_subject = pick(&subject_comparison, |c| c.current_score, Ordering::Less);
    let most_improved_subject = pick(&subject_comparison, |c| c.change, Ordering::Greater);

    debug!(
        current = %current.key,
        previous = %previous.key,
        percentage_change = change,
        trend = trend.as_str(),
        "compared terms"
    );

    TermComparison {
        current: current.key.clone(),
        previous: previous.key.clone(),
        current_average: current.average_score,
        previous_average: previous.average_score,
        average_change: current.average_score - previous.average_score,
        percentage_change: change,
        trend,
        trend_direction,
        subject_comparison,
        strongest_subject,
        weakest_subject,
        most_improved_subject,
    }
}

/// Highest and lowest scoring subjects of a single term.
pub fn subject_extremes(
    scores: &BTreeMap<Uuid, SubjectScore>,
) -> (Option<SubjectExtreme>, Option<SubjectExtreme>) {
    (
        pick(scores, |s| s.score, Ordering::Greater),
        pick(scores, |s| s.score, Ordering::Less),
    )
}

/// Scans `entries` in subject-id order and keeps the first entry whose value
/// beats every later one in the `wanted` direction, so ties go to the lowest id.
fn pick<T: SubjectNamed>(
    entries: &BTreeMap<Uuid, T>,
    value: impl Fn(&T) -> f64,
    wanted: Ordering,
) -> Option<SubjectExtreme> {
    let mut best: Option<(&Uuid, &T)> = None;
    for (subject_id, entry) in entries {
        let replace = match best {
            None => true,
            Some((_, current)) => value(entry).partial_cmp(&value(current)) == Some(wanted),
        };
        if replace {
            best = Some((subject_id, entry));
        }
    }
    best.map(|(subject_id, entry)| SubjectExtreme {
        subject_id: *subject_id,
        subject_name: entry.subject_name().to_string(),
        score: value(entry),
    })
}

trait SubjectNamed {
    fn subject_name(&self) -> &str;
}

impl SubjectNamed for SubjectScore {
    fn subject_name(&self) -> &str {
        &self.subject_name
    }
}

impl SubjectNamed for SubjectComparison {
    fn subject_name(&self) -> &str {
        &self.subject_name
    }
}

/// First-versus-last classification across a whole history.
pub fn overall_trend(overall_percentage: f64, term_count: usize) -> OverallTrend {
    if term_count < 2 {
        OverallTrend::InsufficientData
    } else if overall_percentage > 10.0 {
        OverallTrend::SignificantlyImproving
    } else if overall_percentage > 0.0 {
        OverallTrend::GraduallyImproving
    } else if overall_percentage < -10.0 {
        OverallTrend::SignificantlyDeclining
    } else if overall_percentage < 0.0 {
        OverallTrend::GraduallyDeclining
    } else {
        OverallTrend::Stable
    }
}

/// Full term-by-term history for a student; `None` when there are no records.
pub fn analyze(student: Student, records: &[AssessmentRecord]) -> Option<TrendAnalysis> {
    if records.is_empty() {
        return None;
    }

    let performances = term_performances(records);
    let comparisons: Vec<TermComparison> = performances
        .windows(2)
        .filter_map(|pair| compare(Some(&pair[1]), Some(&pair[0])))
        .collect();

    let (overall_change, overall_percentage) = match (performances.first(), performances.last()) {
        (Some(first), Some(last)) if performances.len() >= 2 => (
            last.average_score - first.average_score,
            percentage_change(last.average_score, first.average_score),
        ),
        _ => (0.0, 0.0),
    };

    Some(TrendAnalysis {
        student,
        overall_change,
        overall_percentage,
        overall_trend: overall_trend(overall_percentage, performances.len()),
        has_multiple_terms: performances.len() > 1,
        performances,
        comparisons,
    })
}

/// Share of passed subjects in percent, 2 dp; zero when nothing was taken.
pub fn pass_rate(subjects_passed: usize, total_subjects: usize) -> f64 {
    if total_subjects == 0 {
        return 0.0;
    }
    round2(subjects_passed as f64 / total_subjects as f64 * 100.0)
}
