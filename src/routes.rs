use crate::actions::{self, Resource};
use crate::auth::{basic_validator, LoginCredentials, LoginRequest, Session};
use crate::config::{DbPool, Settings};
use crate::dashboard;
use crate::error::{Error, Result};
use crate::models::*;
use crate::storage::ObjectStore;
use actix_web::middleware::Condition;
use actix_web::{delete, get, post, web, HttpResponse, Scope};
use actix_web_httpauth::middleware::HttpAuthentication;
use diesel::pg::PgConnection;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use std::convert::TryFrom;

const MAX_UPLOAD: usize = 32 * 1024 * 1024;

async fn blocking<T, F>(pool: web::Data<DbPool>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
{
    web::block(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

async fn list_rows<R: Resource>(pool: web::Data<DbPool>) -> Result<HttpResponse> {
    match blocking(pool, actions::list::<R>).await {
        Ok(rows) => Ok(HttpResponse::Ok().json(rows)),
        Err(e) if R::LIST_FAILS_EMPTY => {
            warn!("listing {} failed: {}", R::PATH, e);
            Ok(HttpResponse::Ok().json(Vec::<R>::new()))
        }
        Err(e) => Err(e),
    }
}

async fn get_row<R: Resource>(pool: web::Data<DbPool>, id: web::Path<i32>) -> Result<HttpResponse> {
    let id = id.into_inner();
    let row = blocking(pool, move |conn| actions::get::<R>(conn, id)).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn create_row<R: Resource>(
    pool: web::Data<DbPool>,
    web::Json(draft): web::Json<Draft<R::Create>>,
) -> Result<HttpResponse> {
    let row = blocking(pool, move |conn| actions::create::<R>(conn, draft)).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn update_row<R: Resource>(
    pool: web::Data<DbPool>,
    id: web::Path<i32>,
    web::Json(changes): web::Json<R::Changes>,
) -> Result<HttpResponse> {
    let id = id.into_inner();
    let row = blocking(pool, move |conn| actions::update::<R>(conn, id, changes)).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn delete_row<R: Resource>(pool: web::Data<DbPool>, id: web::Path<i32>) -> Result<HttpResponse> {
    let id = id.into_inner();
    blocking(pool, move |conn| actions::delete::<R>(conn, id)).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": format!("{} deleted", R::LABEL) })))
}

/// List, read, create, update and delete routes for `R`, added to `scope`.
fn rows<R: Resource>(scope: Scope) -> Scope {
    scope
        .service(
            web::resource("")
                .route(web::get().to(list_rows::<R>))
                .route(web::post().to(create_row::<R>)),
        )
        .service(
            web::resource("/{id}")
                .route(web::get().to(get_row::<R>))
                .route(web::put().to(update_row::<R>))
                .route(web::delete().to(delete_row::<R>)),
        )
}

fn crud<R: Resource>() -> Scope {
    rows::<R>(web::scope(&format!("/{}", R::PATH)))
}

async fn batch(
    pool: web::Data<DbPool>,
    web::Json(request): web::Json<BatchRequest>,
) -> Result<HttpResponse> {
    let outcome = blocking(pool, move |conn| Ok(actions::batch_questions(conn, request))).await?;
    info!(
        "batch created {} questions, {} failed",
        outcome.success_count, outcome.failed_count
    );
    Ok(HttpResponse::Ok().json(outcome))
}

#[derive(Deserialize)]
pub struct ImageQuery {
    index: Option<u32>,
}

/// Page index as stored in `upload_order`.
fn upload_order(index: Option<u32>) -> Result<Option<i32>> {
    index
        .map(i32::try_from)
        .transpose()
        .map_err(|_| Error::Validation(format!("image index must be at most {}", i32::MAX)))
}

async fn upload_exam_image(
    pool: web::Data<DbPool>,
    store: web::Data<ObjectStore>,
    id: web::Path<i32>,
    web::Query(query): web::Query<ImageQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let exam_paper_id = id.into_inner();
    if body.is_empty() {
        return Err(Error::Validation(String::from("image body is empty")));
    }
    let upload_order = upload_order(query.index)?;
    blocking(pool.clone(), move |conn| {
        actions::get::<ExamPaper>(conn, exam_paper_id)
    })
    .await?;
    let receipt = store
        .upload_exam_paper_image(exam_paper_id, query.index, body.to_vec())
        .await?;
    let record = NewExamPaperImage {
        exam_paper_id,
        image_url: receipt.url.clone(),
        upload_order: Some(upload_order),
    };
    let image = blocking(pool, move |conn| {
        actions::create::<ExamPaperImage>(
            conn,
            Draft {
                id: None,
                fields: record,
            },
        )
    })
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "upload": receipt, "image": image })))
}

async fn list_exam_files(store: web::Data<ObjectStore>, id: web::Path<i32>) -> HttpResponse {
    HttpResponse::Ok().json(store.list_exam_paper_images(id.into_inner()).await)
}

async fn purge_exam_files(
    store: web::Data<ObjectStore>,
    id: web::Path<i32>,
) -> Result<HttpResponse> {
    let deleted = store.purge_exam_paper_images(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "deleted": deleted })))
}

fn exam_papers() -> Scope {
    rows::<ExamPaper>(
        web::scope("/exam_papers")
            .service(web::resource("/{id}/images").route(web::post().to(upload_exam_image)))
            .service(
                web::resource("/{id}/files")
                    .route(web::get().to(list_exam_files))
                    .route(web::delete().to(purge_exam_files)),
            ),
    )
}

fn questions() -> Scope {
    rows::<Question>(
        web::scope("/questions").service(web::resource("/batch").route(web::post().to(batch))),
    )
}

#[derive(Deserialize)]
pub struct UploadQuery {
    name: Option<String>,
}

#[post("/uploads")]
async fn upload(
    store: web::Data<ObjectStore>,
    web::Query(query): web::Query<UploadQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    if body.is_empty() {
        return Err(Error::Validation(String::from("upload body is empty")));
    }
    let receipt = store.upload(query.name.as_deref(), body.to_vec()).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

#[delete("/uploads/{name:.*}")]
async fn delete_upload(
    store: web::Data<ObjectStore>,
    name: web::Path<String>,
) -> Result<HttpResponse> {
    let key = store.delete_file(&name).await?;
    Ok(HttpResponse::Ok().json(json!({ "deleted": key })))
}

#[derive(Deserialize)]
pub struct FilesQuery {
    prefix: Option<String>,
}

#[get("/storage/files")]
async fn list_files(
    store: web::Data<ObjectStore>,
    web::Query(query): web::Query<FilesQuery>,
) -> HttpResponse {
    let prefix = query.prefix.as_deref().unwrap_or("uploads/");
    HttpResponse::Ok().json(store.list_files(prefix).await)
}

#[get("/storage/bucket")]
async fn bucket(store: web::Data<ObjectStore>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(store.bucket_info().await?))
}

#[post("/login")]
async fn login(
    credentials: web::Data<LoginCredentials>,
    settings: web::Data<Settings>,
    web::Json(request): web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(Error::Validation(String::from(
            "username and password are required",
        )));
    }
    if !credentials.check(&request.username, &request.password) {
        warn!("failed login for {:?}", request.username);
        return Ok(HttpResponse::Unauthorized()
            .json(json!({ "detail": "invalid username or password" })));
    }
    info!("{} logged in", request.username);
    Ok(HttpResponse::Ok().json(Session {
        logged_in: true,
        username: request.username,
        student_id: settings.default_student_id,
    }))
}

fn api(cfg: &mut web::ServiceConfig) {
    cfg.service(crud::<User>())
        .service(crud::<Student>())
        .service(exam_papers())
        .service(crud::<ExamPaperImage>())
        .service(crud::<KnowledgePoint>())
        .service(questions())
        .service(crud::<QuestionKnowledgePoint>())
        .service(upload)
        .service(delete_upload)
        .service(list_files)
        .service(bucket)
        .configure(dashboard::configure);
}

pub fn configure(cfg: &mut web::ServiceConfig, do_auth: bool) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| Error::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| Error::Validation(err.to_string()).into()),
    )
    .app_data(web::PayloadConfig::new(MAX_UPLOAD))
    .service(web::scope("/auth").service(login))
    .service(
        web::scope("/api")
            .wrap(Condition::new(
                do_auth,
                HttpAuthentication::basic(basic_validator),
            ))
            .configure(api),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_order_rejects_indexes_past_i32() {
        assert_eq!(upload_order(None).unwrap(), None);
        assert_eq!(upload_order(Some(3)).unwrap(), Some(3));
        assert_eq!(upload_order(Some(i32::MAX as u32)).unwrap(), Some(i32::MAX));
        assert!(matches!(
            upload_order(Some(i32::MAX as u32 + 1)),
            Err(Error::Validation(_))
        ));
        assert!(upload_order(Some(u32::MAX)).is_err());
    }
}
