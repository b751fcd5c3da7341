use crate::analytics::{ErrorRate, ExamDetail, Trend};
use crate::models::Question;
use std::fmt::Write;

pub fn percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// First line of `text`, cut to `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

pub fn verdict(is_correct: Option<bool>) -> &'static str {
    match is_correct {
        Some(true) => "correct",
        Some(false) => "wrong",
        None => "unmarked",
    }
}

fn question_line(out: &mut String, q: &Question) {
    let _ = writeln!(
        out,
        "  #{:<6} {:<9} {}",
        q.id,
        verdict(q.is_correct),
        preview(q.content.as_deref().unwrap_or(""), 60)
    );
}

pub fn error_rate_report(report: &ErrorRate) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} questions, {} wrong, error rate {}, correct rate {}",
        report.total,
        report.error_count,
        percent(report.error_rate_percent),
        percent(report.correct_rate_percent)
    );
    for q in &report.error_list {
        question_line(&mut out, q);
    }
    out
}

pub fn trend_report(trend: &Trend) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} exams in range, {} questions, {} wrong, average error rate {}",
        trend.papers_in_range,
        trend.total_questions_all,
        trend.total_errors_all,
        percent(trend.average_error_rate)
    );
    let _ = writeln!(out, "by exam:");
    for e in &trend.exams {
        let _ = writeln!(
            out,
            "  {} {:<30} {:>4}/{:<4} {}",
            e.created_time.format("%Y-%m-%d"),
            preview(&e.title, 30),
            e.error_questions,
            e.total_questions,
            percent(e.error_rate)
        );
    }
    let _ = writeln!(out, "by week:");
    for w in &trend.weekly {
        let _ = writeln!(
            out,
            "  {} ({} exams) {:>4}/{:<4} {}",
            w.label,
            w.exam_count,
            w.error_questions,
            w.total_questions,
            percent(w.error_rate)
        );
    }
    out
}

pub fn exam_report(detail: &ExamDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "exam paper {}: {}",
        detail.exam.id,
        detail.exam.title.as_deref().unwrap_or("(untitled)")
    );
    if let Some(description) = &detail.exam.description {
        let _ = writeln!(out, "{}", preview(description, 80));
    }
    let _ = writeln!(
        out,
        "{} images, {} questions, {} wrong, error rate {}",
        detail.images.len(),
        detail.stats.total,
        detail.stats.wrong,
        percent(detail.stats.error_rate_percent)
    );
    for q in &detail.questions {
        question_line(&mut out, q.question);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_has_one_decimal() {
        assert_eq!(percent(200.0 / 3.0), "66.7%");
        assert_eq!(percent(0.0), "0.0%");
    }

    #[test]
    fn preview_takes_first_non_blank_line() {
        assert_eq!(preview("\n  Solve x + 1 = 2\nshow work", 40), "Solve x + 1 = 2");
        assert_eq!(preview("abcdefgh", 5), "abcde...");
        assert_eq!(preview("", 5), "");
    }

    #[test]
    fn verdict_labels() {
        assert_eq!(verdict(Some(true)), "correct");
        assert_eq!(verdict(Some(false)), "wrong");
        assert_eq!(verdict(None), "unmarked");
    }
}
