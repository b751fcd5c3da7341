use crate::actions::Resource;
use crate::analytics::{self, DateRange, ExamScope};
use crate::cache::TtlCache;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::models::{ExamPaper, ExamPaperImage, Question};
use crate::storage::ObjectStore;
use actix_web::{get, web, HttpResponse};
use actix_web_httpauth::extractors::basic::BasicAuth;
use chrono::{Duration as Days, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

const ANONYMOUS: &str = "anonymous";

/// Per-user copies of the lists the dashboard reads.
pub struct DashboardCache {
    exam_papers: TtlCache<Arc<Vec<ExamPaper>>>,
    questions: TtlCache<Arc<Vec<Question>>>,
    images: TtlCache<Arc<Vec<ExamPaperImage>>>,
}

impl DashboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            exam_papers: TtlCache::new(ttl),
            questions: TtlCache::new(ttl),
            images: TtlCache::new(ttl),
        }
    }
}

async fn load<R: Resource>(
    cache: &TtlCache<Arc<Vec<R>>>,
    gateway: &Gateway,
    user: &str,
) -> Arc<Vec<R>> {
    if let Some(rows) = cache.get(user) {
        return rows;
    }
    let gateway = gateway.clone();
    match loaded(R::PATH, user, web::block(move || gateway.fetch_all::<R>()).await) {
        Some(rows) => {
            let rows = Arc::new(rows);
            cache.insert(user, Arc::clone(&rows));
            rows
        }
        None => Arc::new(Vec::new()),
    }
}

/// Rows worth caching; a failed load is logged and yields nothing.
fn loaded<R, E: Display>(
    path: &str,
    user: &str,
    result: std::result::Result<Vec<R>, E>,
) -> Option<Vec<R>> {
    match result {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!("loading {} for {} failed: {}", path, user, e);
            None
        }
    }
}

fn user_key(auth: &Option<BasicAuth>) -> String {
    auth.as_ref()
        .map(|a| a.user_id().to_string())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

#[derive(Deserialize)]
pub struct StudentQuery {
    student_id: Option<i32>,
}

#[get("/summary")]
async fn summary(
    gateway: web::Data<Gateway>,
    cache: web::Data<DashboardCache>,
    settings: web::Data<Settings>,
    auth: Option<BasicAuth>,
    web::Query(query): web::Query<StudentQuery>,
) -> HttpResponse {
    let exams = load(&cache.exam_papers, &gateway, &user_key(&auth)).await;
    let student_id = query.student_id.unwrap_or(settings.default_student_id);
    HttpResponse::Ok().json(analytics::student_summary(student_id, &exams))
}

#[derive(Deserialize)]
pub struct ErrorRateQuery {
    student_id: Option<i32>,
    exam_paper_id: i32,
}

#[get("/error_rate")]
async fn error_rate(
    gateway: web::Data<Gateway>,
    cache: web::Data<DashboardCache>,
    settings: web::Data<Settings>,
    auth: Option<BasicAuth>,
    web::Query(query): web::Query<ErrorRateQuery>,
) -> HttpResponse {
    let questions = load(&cache.questions, &gateway, &user_key(&auth)).await;
    let student_id = query.student_id.unwrap_or(settings.default_student_id);
    HttpResponse::Ok().json(analytics::error_rate(
        student_id,
        query.exam_paper_id,
        &questions,
    ))
}

#[derive(Deserialize)]
pub struct TrendQuery {
    student_id: Option<i32>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl TrendQuery {
    /// Defaults to the 30 days ending today.
    fn range(&self, today: NaiveDate) -> Result<DateRange> {
        let end = self.end.unwrap_or(today);
        let start = self.start.unwrap_or(end - Days::days(30));
        DateRange::new(start, end)
    }
}

#[get("/trend")]
async fn trend(
    gateway: web::Data<Gateway>,
    cache: web::Data<DashboardCache>,
    settings: web::Data<Settings>,
    auth: Option<BasicAuth>,
    web::Query(query): web::Query<TrendQuery>,
) -> Result<HttpResponse> {
    let range = query.range(Utc::now().date_naive())?;
    let user = user_key(&auth);
    let exams = load(&cache.exam_papers, &gateway, &user).await;
    let questions = load(&cache.questions, &gateway, &user).await;
    let student_id = query.student_id.unwrap_or(settings.default_student_id);
    Ok(HttpResponse::Ok().json(analytics::trend(student_id, &range, &exams, &questions)))
}

#[derive(Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    scope: ExamScope,
    search: Option<String>,
    student_id: Option<i32>,
}

#[get("/exam_papers")]
async fn exam_papers(
    gateway: web::Data<Gateway>,
    cache: web::Data<DashboardCache>,
    settings: web::Data<Settings>,
    auth: Option<BasicAuth>,
    web::Query(query): web::Query<ListingQuery>,
) -> HttpResponse {
    let exams = load(&cache.exam_papers, &gateway, &user_key(&auth)).await;
    let student_id = query.student_id.unwrap_or(settings.default_student_id);
    HttpResponse::Ok().json(analytics::filter_exam_papers(
        &exams,
        query.scope,
        student_id,
        query.search.as_deref(),
    ))
}

#[derive(Serialize)]
struct ImageView<'a> {
    #[serde(flatten)]
    image: &'a ExamPaperImage,
    display_url: String,
}

#[derive(Serialize)]
struct DetailView<'a> {
    exam: &'a ExamPaper,
    images: Vec<ImageView<'a>>,
    questions: Vec<analytics::QuestionStatus<'a>>,
    stats: analytics::ExamStats,
}

#[get("/exam_papers/{id}")]
async fn exam_paper(
    gateway: web::Data<Gateway>,
    cache: web::Data<DashboardCache>,
    store: web::Data<ObjectStore>,
    auth: Option<BasicAuth>,
    id: web::Path<i32>,
) -> Result<HttpResponse> {
    let id = id.into_inner();
    let user = user_key(&auth);
    let exams = load(&cache.exam_papers, &gateway, &user).await;
    let images = load(&cache.images, &gateway, &user).await;
    let questions = load(&cache.questions, &gateway, &user).await;
    let detail = analytics::exam_detail(id, &exams, &images, &questions)
        .ok_or_else(|| Error::not_found("exam paper"))?;
    let view = DetailView {
        exam: detail.exam,
        images: detail
            .images
            .into_iter()
            .map(|image| ImageView {
                display_url: store.display_url(&image.image_url),
                image,
            })
            .collect(),
        questions: detail.questions,
        stats: detail.stats,
    };
    Ok(HttpResponse::Ok().json(view))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/dashboard")
            .service(summary)
            .service(error_rate)
            .service(trend)
            .service(exam_papers)
            .service(exam_paper),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_loads_are_not_cached() {
        let failed: std::result::Result<Vec<i32>, String> =
            Err(String::from("blocking pool is gone"));
        assert_eq!(loaded("questions", ANONYMOUS, failed), None);
        let ok: std::result::Result<Vec<i32>, String> = Ok(vec![1, 2]);
        assert_eq!(loaded("questions", ANONYMOUS, ok), Some(vec![1, 2]));
    }

    fn query(start: Option<&str>, end: Option<&str>) -> TrendQuery {
        TrendQuery {
            student_id: None,
            start: start.map(|s| s.parse().unwrap()),
            end: end.map(|s| s.parse().unwrap()),
        }
    }

    #[test]
    fn trend_range_defaults_to_last_thirty_days() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let range = query(None, None).range(today).unwrap();
        let at = |s: &str| s.parse::<chrono::DateTime<Utc>>().unwrap();
        assert!(range.contains(at("2024-03-01T00:00:00Z")));
        assert!(range.contains(at("2024-03-31T23:59:59Z")));
        assert!(!range.contains(at("2024-02-29T23:59:59Z")));
    }

    #[test]
    fn inverted_trend_range_is_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let err = query(Some("2024-02-10"), Some("2024-02-01"))
            .range(today)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn anonymous_sessions_share_a_key() {
        assert_eq!(user_key(&None), ANONYMOUS);
    }
}
