//! Dashboard statistics computed over already-loaded record lists.

use crate::error::{Error, Result};
use crate::models::{ExamPaper, ExamPaperImage, Question};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a question without a recorded verdict is counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingVerdict {
    /// Error analysis: unknown answers are mistakes.
    Wrong,
    /// Exam detail: unknown answers are not flagged.
    Correct,
}

impl MissingVerdict {
    pub fn is_wrong(self, question: &Question) -> bool {
        !question.is_correct.unwrap_or(self == MissingVerdict::Correct)
    }
}

/// Percentage of `errors` in `total`, 0 for an empty set.
pub fn rate(errors: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64 * 100.0
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRate<'a> {
    pub total: usize,
    pub error_count: usize,
    pub error_rate_percent: f64,
    pub correct_rate_percent: f64,
    pub error_list: Vec<&'a Question>,
}

pub fn error_rate<'a>(student_id: i32, exam_paper_id: i32, questions: &'a [Question]) -> ErrorRate<'a> {
    let mut total = 0;
    let mut error_list = Vec::new();
    for q in questions
        .iter()
        .filter(|q| q.student_id == student_id && q.exam_paper_id == exam_paper_id)
    {
        total += 1;
        if MissingVerdict::Wrong.is_wrong(q) {
            error_list.push(q);
        }
    }
    let error_rate_percent = rate(error_list.len(), total);
    ErrorRate {
        total,
        error_count: error_list.len(),
        error_rate_percent,
        correct_rate_percent: 100.0 - error_rate_percent,
        error_list,
    }
}

/// Inclusive range of calendar days, from 00:00:00Z on `start` to 23:59:59Z on `end`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::Validation(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        let invalid = || Error::Validation(String::from("date out of range"));
        let from = start.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        let until = end.and_hms_opt(23, 59, 59).ok_or_else(invalid)?;
        Ok(Self {
            start,
            end,
            from: Utc.from_utc_datetime(&from),
            until: Utc.from_utc_datetime(&until),
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.until
    }
}

/// Monday of the week `date` falls in.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn week_label(week_start: NaiveDate) -> String {
    let iso = week_start.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamPoint {
    pub exam_paper_id: i32,
    pub title: String,
    pub created_time: DateTime<Utc>,
    pub total_questions: usize,
    pub error_questions: usize,
    pub error_rate: f64,
    pub correct_rate: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPoint {
    pub week_start: NaiveDate,
    pub label: String,
    pub exam_count: usize,
    pub total_questions: usize,
    pub error_questions: usize,
    pub error_rate: f64,
    pub correct_rate: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub papers_in_range: usize,
    pub exams: Vec<ExamPoint>,
    pub weekly: Vec<WeeklyPoint>,
    pub total_questions_all: usize,
    pub total_errors_all: usize,
    /// Unweighted mean of the per-exam rates.
    pub average_error_rate: f64,
}

pub fn trend(student_id: i32, range: &DateRange, exams: &[ExamPaper], questions: &[Question]) -> Trend {
    let in_range: Vec<(&ExamPaper, DateTime<Utc>)> = exams
        .iter()
        .filter(|e| e.student_id == student_id)
        .filter_map(|e| e.created_time.map(|at| (e, at)))
        .filter(|(_, at)| range.contains(*at))
        .collect();

    let mut points: Vec<ExamPoint> = in_range
        .iter()
        .filter_map(|(exam, at)| {
            let (total, errors) = questions
                .iter()
                .filter(|q| q.exam_paper_id == exam.id)
                .fold((0, 0), |(total, errors), q| {
                    (total + 1, errors + MissingVerdict::Wrong.is_wrong(q) as usize)
                });
            if total == 0 {
                return None;
            }
            let error_rate = rate(errors, total);
            Some(ExamPoint {
                exam_paper_id: exam.id,
                title: exam
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("exam {}", exam.id)),
                created_time: *at,
                total_questions: total,
                error_questions: errors,
                error_rate,
                correct_rate: 100.0 - error_rate,
            })
        })
        .collect();
    points.sort_by(|a, b| a.created_time.cmp(&b.created_time));

    let mut weeks: BTreeMap<NaiveDate, (usize, usize, usize)> = BTreeMap::new();
    for p in &points {
        let entry = weeks
            .entry(week_start(p.created_time.date_naive()))
            .or_insert((0, 0, 0));
        entry.0 += 1;
        entry.1 += p.total_questions;
        entry.2 += p.error_questions;
    }
    let weekly = weeks
        .into_iter()
        .map(|(start, (exam_count, total, errors))| {
            let error_rate = rate(errors, total);
            WeeklyPoint {
                week_start: start,
                label: week_label(start),
                exam_count,
                total_questions: total,
                error_questions: errors,
                error_rate,
                correct_rate: 100.0 - error_rate,
            }
        })
        .collect();

    let average_error_rate = if points.is_empty() {
        0.0
    } else {
        points.iter().map(|p| p.error_rate).sum::<f64>() / points.len() as f64
    };
    Trend {
        papers_in_range: in_range.len(),
        total_questions_all: points.iter().map(|p| p.total_questions).sum(),
        total_errors_all: points.iter().map(|p| p.error_questions).sum(),
        average_error_rate,
        exams: points,
        weekly,
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamStats {
    pub total: usize,
    pub wrong: usize,
    pub correct: usize,
    pub error_rate_percent: f64,
}

#[derive(Serialize, Debug)]
pub struct QuestionStatus<'a> {
    #[serde(flatten)]
    pub question: &'a Question,
    pub correct: bool,
}

#[derive(Serialize, Debug)]
pub struct ExamDetail<'a> {
    pub exam: &'a ExamPaper,
    pub images: Vec<&'a ExamPaperImage>,
    pub questions: Vec<QuestionStatus<'a>>,
    pub stats: ExamStats,
}

pub fn exam_detail<'a>(
    exam_paper_id: i32,
    exams: &'a [ExamPaper],
    images: &'a [ExamPaperImage],
    questions: &'a [Question],
) -> Option<ExamDetail<'a>> {
    let exam = exams.iter().find(|e| e.id == exam_paper_id)?;

    let mut images: Vec<&ExamPaperImage> = images
        .iter()
        .filter(|img| img.exam_paper_id == exam_paper_id)
        .collect();
    images.sort_by_key(|img| img.upload_order.unwrap_or(0));

    let mut questions: Vec<QuestionStatus> = questions
        .iter()
        .filter(|q| q.exam_paper_id == exam_paper_id)
        .map(|q| QuestionStatus {
            question: q,
            correct: !MissingVerdict::Correct.is_wrong(q),
        })
        .collect();
    questions.sort_by(|a, b| b.question.created_time.cmp(&a.question.created_time));

    let total = questions.len();
    let wrong = questions.iter().filter(|q| !q.correct).count();
    Some(ExamDetail {
        exam,
        images,
        questions,
        stats: ExamStats {
            total,
            wrong,
            correct: total - wrong,
            error_rate_percent: rate(wrong, total),
        },
    })
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExamScope {
    All,
    Mine,
}

impl Default for ExamScope {
    fn default() -> Self {
        ExamScope::All
    }
}

pub fn filter_exam_papers<'a>(
    exams: &'a [ExamPaper],
    scope: ExamScope,
    student_id: i32,
    search: Option<&str>,
) -> Vec<&'a ExamPaper> {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    exams
        .iter()
        .filter(|e| scope == ExamScope::All || e.student_id == student_id)
        .filter(|e| match &needle {
            Some(needle) => e
                .title
                .as_ref()
                .map(|t| t.to_lowercase().contains(needle.as_str()))
                .unwrap_or(false),
            None => true,
        })
        .collect()
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: i32,
    pub paper_count: usize,
    pub total_papers: usize,
}

pub fn student_summary(student_id: i32, exams: &[ExamPaper]) -> StudentSummary {
    StudentSummary {
        student_id,
        paper_count: exams.iter().filter(|e| e.student_id == student_id).count(),
        total_papers: exams.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(exam: i32, is_correct: Option<bool>) -> Question {
        Question {
            id: 0,
            exam_paper_id: exam,
            image_id: None,
            student_id: 1,
            content: None,
            is_correct,
            remark: None,
            created_time: None,
            updated_time: None,
        }
    }

    #[test]
    fn verdict_defaults_differ() {
        let unknown = q(1, None);
        assert!(MissingVerdict::Wrong.is_wrong(&unknown));
        assert!(!MissingVerdict::Correct.is_wrong(&unknown));
        assert!(MissingVerdict::Correct.is_wrong(&q(1, Some(false))));
        assert!(!MissingVerdict::Wrong.is_wrong(&q(1, Some(true))));
    }

    #[test]
    fn weeks_start_on_monday() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        // 2024-01-01 is a Monday
        assert_eq!(week_start(d(2024, 1, 1)), d(2024, 1, 1));
        assert_eq!(week_start(d(2024, 1, 7)), d(2024, 1, 1));
        assert_eq!(week_start(d(2024, 1, 8)), d(2024, 1, 8));
        assert_eq!(week_start(d(2023, 12, 31)), d(2023, 12, 25));
        assert_eq!(week_label(d(2024, 1, 1)), "2024-W01");
        assert_eq!(week_label(d(2024, 12, 30)), "2025-W01");
    }

    #[test]
    fn range_bounds_are_whole_days() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 8)).unwrap();
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 8, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()));
        assert!(DateRange::new(d(2024, 1, 9), d(2024, 1, 8)).is_err());
    }
}
