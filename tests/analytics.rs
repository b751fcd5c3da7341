use chrono::{NaiveDate, TimeZone, Utc};
use ladr::analytics::{self, DateRange, ExamScope};
use ladr::models::{ExamPaper, ExamPaperImage, Question};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn exam(id: i32, student_id: i32, title: &str, y: i32, m: u32, d: u32) -> ExamPaper {
    ExamPaper {
        id,
        student_id,
        title: Some(title.to_string()),
        description: None,
        created_time: Some(Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()),
    }
}

fn question(id: i32, exam_paper_id: i32, is_correct: Option<bool>) -> Question {
    Question {
        id,
        exam_paper_id,
        image_id: None,
        student_id: 1,
        content: Some(format!("question {}", id)),
        is_correct,
        remark: None,
        created_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, id as u32).unwrap()),
        updated_time: None,
    }
}

#[test]
fn one_correct_two_wrong_is_two_thirds_wrong() {
    let questions = vec![
        question(1, 7, Some(true)),
        question(2, 7, Some(false)),
        question(3, 7, Some(false)),
        question(4, 8, Some(false)),
    ];
    let report = analytics::error_rate(1, 7, &questions);
    assert_eq!(report.total, 3);
    assert_eq!(report.error_count, 2);
    assert_eq!(format!("{:.1}", report.error_rate_percent), "66.7");
    assert_eq!(format!("{:.1}", report.correct_rate_percent), "33.3");
    let ids: Vec<i32> = report.error_list.iter().map(|q| q.id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn unmarked_questions_count_as_errors_in_error_rate() {
    let questions = vec![question(1, 7, None), question(2, 7, Some(true))];
    let report = analytics::error_rate(1, 7, &questions);
    assert_eq!(report.error_count, 1);
}

#[test]
fn error_rate_of_nothing_is_zero() {
    let report = analytics::error_rate(1, 7, &[]);
    assert_eq!(report.total, 0);
    assert_eq!(report.error_rate_percent, 0.0);
    assert_eq!(report.correct_rate_percent, 100.0);
}

#[test]
fn rate_stays_within_percent_bounds() {
    for total in 0..20 {
        for errors in 0..=total {
            let r = analytics::rate(errors, total);
            assert!((0.0..=100.0).contains(&r), "{} of {} gave {}", errors, total, r);
        }
    }
}

#[test]
fn range_keeps_only_exams_inside_it() {
    let exams = vec![exam(1, 1, "first", 2024, 1, 1), exam(2, 1, "second", 2024, 1, 10)];
    let questions = vec![question(1, 1, Some(true)), question(2, 2, Some(false))];
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 8)).unwrap();
    let trend = analytics::trend(1, &range, &exams, &questions);
    assert_eq!(trend.papers_in_range, 1);
    assert_eq!(trend.exams.len(), 1);
    assert_eq!(trend.exams[0].exam_paper_id, 1);
}

#[test]
fn weekly_totals_add_up_to_exam_totals() {
    let exams = vec![
        exam(1, 1, "mon", 2024, 1, 1),
        exam(2, 1, "sun", 2024, 1, 7),
        exam(3, 1, "next mon", 2024, 1, 8),
        exam(4, 1, "empty", 2024, 1, 9),
        exam(5, 2, "other student", 2024, 1, 9),
    ];
    let mut questions = Vec::new();
    let mut id = 0;
    for (exam_id, verdicts) in &[
        (1, vec![Some(true), Some(false)]),
        (2, vec![Some(false), None, Some(true)]),
        (3, vec![Some(true)]),
        (5, vec![Some(false)]),
    ] {
        for v in verdicts {
            id += 1;
            questions.push(question(id, *exam_id, *v));
        }
    }
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
    let trend = analytics::trend(1, &range, &exams, &questions);

    assert_eq!(trend.papers_in_range, 4);
    // exams without questions are not charted
    assert_eq!(trend.exams.len(), 3);
    let weekly_total: usize = trend.weekly.iter().map(|w| w.total_questions).sum();
    let exam_total: usize = trend.exams.iter().map(|e| e.total_questions).sum();
    assert_eq!(weekly_total, exam_total);
    assert_eq!(weekly_total, trend.total_questions_all);
    assert_eq!(trend.total_errors_all, 3);

    assert_eq!(trend.weekly.len(), 2);
    assert_eq!(trend.weekly[0].label, "2024-W01");
    assert_eq!(trend.weekly[0].exam_count, 2);
    assert_eq!(trend.weekly[1].label, "2024-W02");

    let mean = trend.exams.iter().map(|e| e.error_rate).sum::<f64>() / 3.0;
    assert!((trend.average_error_rate - mean).abs() < 1e-9);
}

#[test]
fn exams_without_timestamp_are_skipped() {
    let mut undated = exam(1, 1, "undated", 2024, 1, 2);
    undated.created_time = None;
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 8)).unwrap();
    let trend = analytics::trend(1, &range, &[undated], &[question(1, 1, Some(true))]);
    assert_eq!(trend.papers_in_range, 0);
    assert_eq!(trend.average_error_rate, 0.0);
}

#[test]
fn exam_detail_orders_images_and_questions() {
    let exams = vec![exam(3, 1, "algebra", 2024, 1, 2)];
    let images = vec![
        ExamPaperImage {
            id: 1,
            exam_paper_id: 3,
            image_url: String::from("b.jpg"),
            upload_order: Some(2),
        },
        ExamPaperImage {
            id: 2,
            exam_paper_id: 3,
            image_url: String::from("a.jpg"),
            upload_order: None,
        },
        ExamPaperImage {
            id: 3,
            exam_paper_id: 4,
            image_url: String::from("other.jpg"),
            upload_order: Some(1),
        },
    ];
    let questions = vec![
        question(1, 3, Some(false)),
        question(2, 3, None),
        question(3, 3, Some(true)),
    ];
    let detail = analytics::exam_detail(3, &exams, &images, &questions).unwrap();
    let urls: Vec<&str> = detail.images.iter().map(|i| i.image_url.as_str()).collect();
    assert_eq!(urls, vec!["a.jpg", "b.jpg"]);
    let ids: Vec<i32> = detail.questions.iter().map(|q| q.question.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    // unmarked counts as correct here
    assert_eq!(detail.stats.total, 3);
    assert_eq!(detail.stats.wrong, 1);
    assert_eq!(detail.stats.correct, 2);

    assert!(analytics::exam_detail(99, &exams, &images, &questions).is_none());
}

#[test]
fn listing_filters_by_scope_and_title() {
    let exams = vec![
        exam(1, 1, "Algebra midterm", 2024, 1, 1),
        exam(2, 2, "Algebra final", 2024, 1, 2),
        exam(3, 1, "Geometry", 2024, 1, 3),
    ];
    let ids = |v: Vec<&ExamPaper>| v.into_iter().map(|e| e.id).collect::<Vec<_>>();
    assert_eq!(
        ids(analytics::filter_exam_papers(&exams, ExamScope::All, 1, None)),
        vec![1, 2, 3]
    );
    assert_eq!(
        ids(analytics::filter_exam_papers(&exams, ExamScope::Mine, 1, None)),
        vec![1, 3]
    );
    assert_eq!(
        ids(analytics::filter_exam_papers(&exams, ExamScope::All, 1, Some("ALGEBRA"))),
        vec![1, 2]
    );
    assert_eq!(
        ids(analytics::filter_exam_papers(&exams, ExamScope::Mine, 1, Some("  "))),
        vec![1, 3]
    );

    let summary = analytics::student_summary(1, &exams);
    assert_eq!(summary.paper_count, 2);
    assert_eq!(summary.total_papers, 3);
}
