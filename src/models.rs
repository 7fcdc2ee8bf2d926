use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Letter grade awarded for a single assessment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub const ALL: [Grade; 6] = [Grade::A, Grade::B, Grade::C, Grade::D, Grade::E, Grade::F];

    pub fn letter(self) -> char {
        match self {
            Grade::A => 'A',
            Grade::B => 'B',
            Grade::C => 'C',
            Grade::D => 'D',
            Grade::E => 'E',
            Grade::F => 'F',
        }
    }

    pub fn from_letter(letter: char) -> Option<Grade> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Grade::A),
            'B' => Some(Grade::B),
            'C' => Some(Grade::C),
            'D' => Some(Grade::D),
            'E' => Some(Grade::E),
            'F' => Some(Grade::F),
            _ => None,
        }
    }

    /// Every grade except F counts as a pass.
    pub fn is_pass(self) -> bool {
        self != Grade::F
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::A => "Excellent",
            Grade::B => "Very Good",
            Grade::C => "Good",
            Grade::D => "Satisfactory",
            Grade::E => "Sufficient",
            Grade::F => "Fail",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Grading period key: a term label within an academic year label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermKey {
    pub term: String,
    pub academic_year: String,
}

impl TermKey {
    pub fn new(term: impl Into<String>, academic_year: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            academic_year: academic_year.into(),
        }
    }
}

impl fmt::Display for TermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.term, self.academic_year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub admission_number: String,
    pub class_grade: String,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: String,
}

/// One student's graded score in one subject for one term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub subject_name: String,
    pub teacher_id: Option<Uuid>,
    pub cat1_score: Option<f64>,
    pub cat2_score: Option<f64>,
    pub main_exam_score: f64,
    pub total_score: f64,
    pub grade: Grade,
    pub term: String,
    pub academic_year: String,
    pub comments: String,
    pub date_entered: NaiveDate,
    pub last_modified: NaiveDate,
}

impl AssessmentRecord {
    pub fn term_key(&self) -> TermKey {
        TermKey::new(self.term.clone(), self.academic_year.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GradeDistribution {
    counts: [usize; 6],
}

impl GradeDistribution {
    pub fn from_counts(counts: [usize; 6]) -> Self {
        Self { counts }
    }

    pub fn record(&mut self, grade: Grade) {
        self.counts[grade.index()] += 1;
    }

    pub fn count(&self, grade: Grade) -> usize {
        self.counts[grade.index()]
    }

    pub fn counts(&self) -> [usize; 6] {
        self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn passed(&self) -> usize {
        Grade::ALL
            .iter()
            .filter(|grade| grade.is_pass())
            .map(|grade| self.count(*grade))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Grade, usize)> + '_ {
        Grade::ALL.iter().map(|grade| (*grade, self.count(*grade)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectScore {
    pub subject_name: String,
    pub score: f64,
    pub grade: Grade,
}

/// Aggregate of one student's records for a single term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermPerformance {
    pub key: TermKey,
    pub average_score: f64,
    pub subject_count: usize,
    pub grade_distribution: GradeDistribution,
    /// Keyed by subject id; the name is carried for display only.
    pub subject_scores: BTreeMap<Uuid, SubjectScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendCategory {
    Improving,
    Declining,
    Stable,
    Fluctuating,
    SignificantImprovement,
    SignificantDecline,
    GradualImprovement,
    GradualDecline,
}

impl TrendCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendCategory::Improving => "improving",
            TrendCategory::Declining => "declining",
            TrendCategory::Stable => "stable",
            TrendCategory::Fluctuating => "fluctuating",
            TrendCategory::SignificantImprovement => "significant_improvement",
            TrendCategory::SignificantDecline => "significant_decline",
            TrendCategory::GradualImprovement => "gradual_improvement",
            TrendCategory::GradualDecline => "gradual_decline",
        }
    }

    pub fn parse(value: &str) -> Option<TrendCategory> {
        match value {
            "improving" => Some(TrendCategory::Improving),
            "declining" => Some(TrendCategory::Declining),
            "stable" => Some(TrendCategory::Stable),
            "fluctuating" => Some(TrendCategory::Fluctuating),
            "significant_improvement" => Some(TrendCategory::SignificantImprovement),
            "significant_decline" => Some(TrendCategory::SignificantDecline),
            "gradual_improvement" => Some(TrendCategory::GradualImprovement),
            "gradual_decline" => Some(TrendCategory::GradualDecline),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TrendCategory::Improving => "Improving",
            TrendCategory::Declining => "Declining",
            TrendCategory::Stable => "Stable",
            TrendCategory::Fluctuating => "Fluctuating",
            TrendCategory::SignificantImprovement => "Significant Improvement",
            TrendCategory::SignificantDecline => "Significant Decline",
            TrendCategory::GradualImprovement => "Gradual Improvement",
            TrendCategory::GradualDecline => "Gradual Decline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Positive,
    Negative,
    Neutral,
}

impl TrendDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendDirection::Positive => "positive",
            TrendDirection::Negative => "negative",
            TrendDirection::Neutral => "neutral",
        }
    }

    pub fn parse(value: &str) -> Option<TrendDirection> {
        match value {
            "positive" => Some(TrendDirection::Positive),
            "negative" => Some(TrendDirection::Negative),
            "neutral" => Some(TrendDirection::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectComparison {
    pub subject_name: String,
    pub current_score: f64,
    pub previous_score: f64,
    pub change: f64,
    pub percentage_change: f64,
    pub current_grade: Grade,
    pub previous_grade: Grade,
}

/// A subject singled out by an analysis, with the value it was picked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectExtreme {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermComparison {
    pub current: TermKey,
    pub previous: TermKey,
    pub current_average: f64,
    pub previous_average: f64,
    pub average_change: f64,
    pub percentage_change: f64,
    pub trend: TrendCategory,
    pub trend_direction: TrendDirection,
    pub subject_comparison: BTreeMap<Uuid, SubjectComparison>,
    pub strongest_subject: Option<SubjectExtreme>,
    pub weakest_subject: Option<SubjectExtreme>,
    /// `score` holds the change in total score for this one.
    pub most_improved_subject: Option<SubjectExtreme>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverallTrend {
    SignificantlyImproving,
    GraduallyImproving,
    Stable,
    GraduallyDeclining,
    SignificantlyDeclining,
    InsufficientData,
}

impl OverallTrend {
    pub fn label(self) -> &'static str {
        match self {
            OverallTrend::SignificantlyImproving => "Significantly Improving",
            OverallTrend::GraduallyImproving => "Gradually Improving",
            OverallTrend::Stable => "Stable",
            OverallTrend::GraduallyDeclining => "Gradually Declining",
            OverallTrend::SignificantlyDeclining => "Significantly Declining",
            OverallTrend::InsufficientData => "Insufficient Data",
        }
    }
}

impl fmt::Display for OverallTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Full multi-term history for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendAnalysis {
    pub student: Student,
    pub performances: Vec<TermPerformance>,
    pub comparisons: Vec<TermComparison>,
    pub overall_change: f64,
    pub overall_percentage: f64,
    pub overall_trend: OverallTrend,
    pub has_multiple_terms: bool,
}

impl TrendAnalysis {
    pub fn latest(&self) -> Option<&TermPerformance> {
        self.performances.last()
    }
}

/// Persisted snapshot of the analyzer's conclusions for one student and term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceTrend {
    pub id: Uuid,
    pub student_id: Uuid,
    pub term: String,
    pub academic_year: String,
    pub current_term_average: f64,
    pub previous_term_average: Option<f64>,
    pub overall_average: Option<f64>,
    pub score_change: Option<f64>,
    pub percentage_change: Option<f64>,
    pub trend: TrendCategory,
    pub trend_direction: TrendDirection,
    pub strongest_subject: Option<SubjectExtreme>,
    pub weakest_subject: Option<SubjectExtreme>,
    pub most_improved_subject: Option<SubjectExtreme>,
    pub subjects_passed: usize,
    pub total_subjects: usize,
    pub pass_rate: f64,
    pub grade_distribution: GradeDistribution,
    pub strengths: String,
    pub weaknesses: String,
    pub analysis_summary: String,
    pub recommendations: String,
    pub action_items: String,
    pub is_active: bool,
    pub generated_by: Option<Uuid>,
    pub date_generated: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceTrend {
    pub fn term_key(&self) -> TermKey {
        TermKey::new(self.term.clone(), self.academic_year.clone())
    }

    pub fn performance_level(&self) -> &'static str {
        crate::report::performance_level(self.current_term_average)
    }

    pub fn trend_label(&self) -> &'static str {
        self.trend.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_letters_round_trip_and_reject_unknowns() {
        for grade in Grade::ALL {
            assert_eq!(Grade::from_letter(grade.letter()), Some(grade));
        }
        assert_eq!(Grade::from_letter('b'), Some(Grade::B));
        assert_eq!(Grade::from_letter('G'), None);
    }

    #[test]
    fn distribution_counts_passes_without_f() {
        let mut distribution = GradeDistribution::default();
        for grade in [Grade::A, Grade::B, Grade::C, Grade::F, Grade::F] {
            distribution.record(grade);
        }
        assert_eq!(distribution.total(), 5);
        assert_eq!(distribution.passed(), 3);
        assert_eq!(distribution.count(Grade::F), 2);
        assert_eq!(distribution.count(Grade::D), 0);
    }

    #[test]
    fn term_key_displays_term_then_year() {
        assert_eq!(TermKey::new("Term 1", "2024").to_string(), "Term 1 2024");
    }

    #[test]
    fn trend_category_strings_parse_back() {
        for category in [
            TrendCategory::Improving,
            TrendCategory::Fluctuating,
            TrendCategory::SignificantDecline,
            TrendCategory::GradualImprovement,
        ] {
            assert_eq!(TrendCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(TrendCategory::parse("sideways"), None);
    }
}
