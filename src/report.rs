use std::fmt::Write;

use crate::models::{Grade, PerformanceTrend, TermPerformance, TrendAnalysis, TrendDirection};

/// Generated free text stored alongside a performance trend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalysisText {
    pub summary: String,
    pub recommendations: String,
    pub action_items: String,
}

pub fn performance_level(average: f64) -> &'static str {
    if average >= 80.0 {
        "Excellent"
    } else if average >= 70.0 {
        "Very Good"
    } else if average >= 60.0 {
        "Good"
    } else if average >= 50.0 {
        "Satisfactory"
    } else if average >= 40.0 {
        "Sufficient"
    } else {
        "Needs Improvement"
    }
}

/// Builds summary, recommendations and action items from a filled-in trend.
///
/// Lines are appended in a fixed order and joined with newlines.
pub fn build_analysis(trend: &PerformanceTrend) -> AnalysisText {
    let mut analysis = Vec::new();
    let mut recommendations = Vec::new();

    analysis.push(format!(
        "Performance Level: {}",
        performance_level(trend.current_term_average)
    ));

    let change = trend.percentage_change.unwrap_or(0.0);
    match trend.trend_direction {
        TrendDirection::Positive => {
            analysis.push(format!("Performance is improving ({change:+.1}% change)"))
        }
        TrendDirection::Negative => {
            analysis.push(format!("Performance needs attention ({change:+.1}% change)"))
        }
        TrendDirection::Neutral => analysis.push("Performance is stable".to_string()),
    }

    if let Some(strongest) = &trend.strongest_subject {
        analysis.push(format!(
            "Strongest subject: {} ({:.2}%)",
            strongest.subject_name, strongest.score
        ));
        recommendations.push(format!("Maintain excellence in {}", strongest.subject_name));
    }

    if let Some(weakest) = &trend.weakest_subject {
        analysis.push(format!(
            "Area needing improvement: {} ({:.2}%)",
            weakest.subject_name, weakest.score
        ));
        recommendations.push(format!("Focus on improving {}", weakest.subject_name));
    }

    if trend.pass_rate >= 80.0 {
        analysis.push(format!("Excellent pass rate: {:.1}%", trend.pass_rate));
    } else if trend.pass_rate >= 60.0 {
        analysis.push(format!("Good pass rate: {:.1}%", trend.pass_rate));
    } else {
        analysis.push(format!("Pass rate needs improvement: {:.1}%", trend.pass_rate));
        recommendations.push("Increase focus on subjects with lower grades".to_string());
    }

    let a_count = trend.grade_distribution.count(Grade::A);
    if a_count > 0 {
        analysis.push(format!("Achieved {a_count} A grade(s)"));
    }

    let f_count = trend.grade_distribution.count(Grade::F);
    if f_count > 0 {
        analysis.push(format!("Has {f_count} subject(s) requiring attention"));
        recommendations.push("Seek additional help for subjects with F grades".to_string());
    }

    match trend.trend_direction {
        TrendDirection::Positive => {
            recommendations.push("Continue current study habits and routines".to_string())
        }
        TrendDirection::Negative => {
            recommendations.push("Review and adjust study strategies".to_string());
            recommendations.push("Consider seeking tutoring for challenging subjects".to_string());
        }
        TrendDirection::Neutral => {}
    }
    recommendations.push("Regularly review progress and set achievable goals".to_string());

    let mut action_items: Vec<&str> = if trend.trend_direction == TrendDirection::Negative {
        vec![
            "Schedule meeting with subject teachers",
            "Create weekly study plan",
            "Join study groups for challenging subjects",
        ]
    } else {
        vec![
            "Set higher academic goals",
            "Participate in advanced topics",
            "Help peers who are struggling",
        ]
    };
    if f_count > 0 {
        action_items.push("Request extra classes for failed subjects");
    }

    AnalysisText {
        summary: analysis.join("\n"),
        recommendations: recommendations.join("\n"),
        action_items: action_items.join("\n"),
    }
}

/// Subjects graded A or B, one per line.
pub fn strengths(performance: &TermPerformance) -> String {
    subject_lines(performance, |grade| matches!(grade, Grade::A | Grade::B))
}

/// Subjects graded E or F, one per line.
pub fn weaknesses(performance: &TermPerformance) -> String {
    subject_lines(performance, |grade| matches!(grade, Grade::E | Grade::F))
}

fn subject_lines(performance: &TermPerformance, keep: impl Fn(Grade) -> bool) -> String {
    performance
        .subject_scores
        .values()
        .filter(|score| keep(score.grade))
        .map(|score| format!("{}: {:.2}% ({})", score.subject_name, score.score, score.grade))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Markdown report for one student: term history plus stored snapshots.
pub fn build_student_report(analysis: &TrendAnalysis, trends: &[PerformanceTrend]) -> String {
    let mut output = String::new();
    let student = &analysis.student;

    let _ = writeln!(output, "# Student Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}, {} {})",
        student.full_name, student.admission_number, student.class_grade, student.section
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Term Averages");

    for performance in &analysis.performances {
        let _ = writeln!(
            output,
            "- {}: {:.2}% across {} subjects ({})",
            performance.key,
            performance.average_score,
            performance.subject_count,
            performance_level(performance.average_score)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Term-over-Term Changes");

    if analysis.comparisons.is_empty() {
        let _ = writeln!(output, "Only one term on record.");
    } else {
        for comparison in &analysis.comparisons {
            let _ = writeln!(
                output,
                "- {} -> {}: {:+.2} points ({:+.1}%), {}",
                comparison.previous,
                comparison.current,
                comparison.average_change,
                comparison.percentage_change,
                comparison.trend.label()
            );
            if let Some(improved) = &comparison.most_improved_subject {
                let _ = writeln!(
                    output,
                    "  - most improved: {} ({:+.2})",
                    improved.subject_name, improved.score
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Overall trend: {} ({:+.1}%)",
        analysis.overall_trend, analysis.overall_percentage
    );

    let latest = trends
        .iter()
        .filter(|trend| trend.is_active)
        .max_by(|a, b| crate::analytics::term_order(&a.term_key(), &b.term_key()));

    if let Some(trend) = latest {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Latest Analysis ({})", trend.term_key());
        for line in trend.analysis_summary.lines() {
            let _ = writeln!(output, "- {line}");
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "### Recommendations");
        for line in trend.recommendations.lines() {
            let _ = writeln!(output, "- {line}");
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "### Action Items");
        for line in trend.action_items.lines() {
            let _ = writeln!(output, "- [ ] {line}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::{GradeDistribution, SubjectExtreme, TrendCategory};

    fn trend(direction: TrendDirection, pass_rate: f64, counts: [usize; 6]) -> PerformanceTrend {
        let now = Utc::now();
        PerformanceTrend {
            id: Uuid::new_v4(),
            student_id: Uuid::from_u128(1),
            term: "Term 2".to_string(),
            academic_year: "2024".to_string(),
            current_term_average: 72.5,
            previous_term_average: Some(60.0),
            overall_average: Some(66.25),
            score_change: Some(12.5),
            percentage_change: Some(20.83),
            trend: TrendCategory::SignificantImprovement,
            trend_direction: direction,
            strongest_subject: Some(SubjectExtreme {
                subject_id: Uuid::from_u128(10),
                subject_name: "Chemistry".to_string(),
                score: 88.0,
            }),
            weakest_subject: Some(SubjectExtreme {
                subject_id: Uuid::from_u128(11),
                subject_name: "French".to_string(),
                score: 35.5,
            }),
            most_improved_subject: None,
            subjects_passed: 0,
            total_subjects: 0,
            pass_rate,
            grade_distribution: GradeDistribution::from_counts(counts),
            strengths: String::new(),
            weaknesses: String::new(),
            analysis_summary: String::new(),
            recommendations: String::new(),
            action_items: String::new(),
            is_active: true,
            generated_by: None,
            date_generated: now,
            last_updated: now,
        }
    }

    #[test]
    fn performance_levels_follow_grade_bands() {
        assert_eq!(performance_level(80.0), "Excellent");
        assert_eq!(performance_level(79.99), "Very Good");
        assert_eq!(performance_level(60.0), "Good");
        assert_eq!(performance_level(50.0), "Satisfactory");
        assert_eq!(performance_level(40.0), "Sufficient");
        assert_eq!(performance_level(39.0), "Needs Improvement");
    }

    #[test]
    fn positive_trend_lines_in_order() {
        let text = build_analysis(&trend(TrendDirection::Positive, 85.0, [2, 1, 1, 0, 0, 0]));
        let summary: Vec<&str> = text.summary.lines().collect();
        assert_eq!(
            summary,
            [
                "Performance Level: Very Good",
                "Performance is improving (+20.8% change)",
                "Strongest subject: Chemistry (88.00%)",
                "Area needing improvement: French (35.50%)",
                "Excellent pass rate: 85.0%",
                "Achieved 2 A grade(s)",
            ]
        );
        let recommendations: Vec<&str> = text.recommendations.lines().collect();
        assert_eq!(
            recommendations,
            [
                "Maintain excellence in Chemistry",
                "Focus on improving French",
                "Continue current study habits and routines",
                "Regularly review progress and set achievable goals",
            ]
        );
        assert_eq!(
            text.action_items,
            "Set higher academic goals\nParticipate in advanced topics\nHelp peers who are struggling"
        );
    }

    #[test]
    fn failing_grades_add_lines_everywhere() {
        let mut declining = trend(TrendDirection::Negative, 50.0, [0, 0, 1, 0, 0, 2]);
        declining.percentage_change = Some(-12.0);
        declining.strongest_subject = None;
        declining.weakest_subject = None;
        let text = build_analysis(&declining);

        let summary: Vec<&str> = text.summary.lines().collect();
        assert_eq!(
            summary,
            [
                "Performance Level: Very Good",
                "Performance needs attention (-12.0% change)",
                "Pass rate needs improvement: 50.0%",
                "Has 2 subject(s) requiring attention",
            ]
        );
        let recommendations: Vec<&str> = text.recommendations.lines().collect();
        assert_eq!(
            recommendations,
            [
                "Increase focus on subjects with lower grades",
                "Seek additional help for subjects with F grades",
                "Review and adjust study strategies",
                "Consider seeking tutoring for challenging subjects",
                "Regularly review progress and set achievable goals",
            ]
        );
        let actions: Vec<&str> = text.action_items.lines().collect();
        assert_eq!(actions.len(), 4);
        assert_eq!(actions[0], "Schedule meeting with subject teachers");
        assert_eq!(actions[3], "Request extra classes for failed subjects");
    }

    #[test]
    fn neutral_trend_has_no_direction_recommendation() {
        let mut stable = trend(TrendDirection::Neutral, 65.0, [0, 0, 0, 0, 0, 1]);
        stable.strongest_subject = None;
        stable.weakest_subject = None;
        let text = build_analysis(&stable);
        assert!(text.summary.contains("Performance is stable"));
        assert!(text.summary.contains("Good pass rate: 65.0%"));
        assert_eq!(
            text.recommendations,
            "Seek additional help for subjects with F grades\nRegularly review progress and set achievable goals"
        );
        assert!(text.action_items.starts_with("Set higher academic goals"));
        assert!(text.action_items.ends_with("Request extra classes for failed subjects"));
    }
}
