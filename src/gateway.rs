//! Path-string access to every resource, answering with a `{success, data|error}`
//! envelope instead of failing.

use crate::actions::{self, Resource};
use crate::config::DbPool;
use crate::error::{Error, Result};
use crate::models::*;
use diesel::pg::PgConnection;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Envelope {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Envelope::fail(format!("API request failed: {}", e)),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Envelope {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Users,
    Students,
    ExamPapers,
    ExamPaperImages,
    KnowledgePoints,
    Questions,
    QuestionKnowledgePoints,
}

impl Kind {
    pub const ALL: [Kind; 7] = [
        Kind::Users,
        Kind::Students,
        Kind::ExamPapers,
        Kind::ExamPaperImages,
        Kind::KnowledgePoints,
        Kind::Questions,
        Kind::QuestionKnowledgePoints,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Kind::Users => User::PATH,
            Kind::Students => Student::PATH,
            Kind::ExamPapers => ExamPaper::PATH,
            Kind::ExamPaperImages => ExamPaperImage::PATH,
            Kind::KnowledgePoints => KnowledgePoint::PATH,
            Kind::Questions => Question::PATH,
            Kind::QuestionKnowledgePoints => QuestionKnowledgePoint::PATH,
        }
    }

    pub fn parse(name: &str) -> Option<Kind> {
        Kind::ALL.iter().copied().find(|k| k.path() == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    List,
    Get(i32),
    Create,
    Update(i32),
    Delete(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Resource(Kind, Op),
    QuestionBatch,
}

impl Endpoint {
    pub fn parse(method: &str, endpoint: &str) -> std::result::Result<Endpoint, String> {
        let method = method.to_uppercase();
        let parts: Vec<&str> = endpoint.trim_matches('/').split('/').collect();
        let unsupported = || format!("Unsupported method or endpoint: {} {}", method, endpoint);
        let kind = |name: &str| Kind::parse(name).ok_or_else(|| format!("Unknown resource: {}", name));
        let id = |raw: &str| {
            raw.parse::<i32>()
                .map_err(|e| format!("API request failed: invalid id {:?}: {}", raw, e))
        };
        match (method.as_str(), parts.as_slice()) {
            ("GET", [name]) => Ok(Endpoint::Resource(kind(*name)?, Op::List)),
            ("GET", [name, raw]) => {
                let id = id(*raw)?;
                Ok(Endpoint::Resource(kind(*name)?, Op::Get(id)))
            }
            ("POST", [name]) => Ok(Endpoint::Resource(kind(*name)?, Op::Create)),
            ("POST", ["questions", "batch"]) => Ok(Endpoint::QuestionBatch),
            ("PUT", [name, raw]) => {
                let id = id(*raw)?;
                Ok(Endpoint::Resource(kind(*name)?, Op::Update(id)))
            }
            ("DELETE", [name, raw]) => {
                let id = id(*raw)?;
                Ok(Endpoint::Resource(kind(*name)?, Op::Delete(id)))
            }
            _ => Err(unsupported()),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: Option<Value>) -> Result<T> {
    serde_json::from_value(body.unwrap_or(Value::Null))
        .map_err(|e| Error::Validation(format!("malformed request body: {}", e)))
}

/// The connection pool is the only state; clones share it.
#[derive(Clone)]
pub struct Gateway {
    pool: DbPool,
}

impl Gateway {
    pub fn new(pool: DbPool) -> Self {
        Gateway { pool }
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T>,
    {
        let mut conn = self.pool.get()?;
        f(&mut conn)
    }

    pub fn request(&self, method: &str, endpoint: &str, body: Option<Value>) -> Envelope {
        match Endpoint::parse(method, endpoint) {
            Ok(Endpoint::Resource(kind, op)) => match kind {
                Kind::Users => self.dispatch::<User>(op, body),
                Kind::Students => self.dispatch::<Student>(op, body),
                Kind::ExamPapers => self.dispatch::<ExamPaper>(op, body),
                Kind::ExamPaperImages => self.dispatch::<ExamPaperImage>(op, body),
                Kind::KnowledgePoints => self.dispatch::<KnowledgePoint>(op, body),
                Kind::Questions => self.dispatch::<Question>(op, body),
                Kind::QuestionKnowledgePoints => self.dispatch::<QuestionKnowledgePoint>(op, body),
            },
            Ok(Endpoint::QuestionBatch) => self.batch(body),
            Err(message) => Envelope::fail(message),
        }
    }

    fn dispatch<R: Resource>(&self, op: Op, body: Option<Value>) -> Envelope {
        match op {
            Op::List => match self.with_conn(actions::list::<R>) {
                Ok(rows) => Envelope::ok(rows),
                Err(e) => {
                    warn!("listing {} failed: {}", R::PATH, e);
                    Envelope::ok(Vec::<R>::new())
                }
            },
            Op::Get(id) => match self.with_conn(|conn| actions::get::<R>(conn, id)) {
                Ok(row) => Envelope::ok(row),
                Err(e) => {
                    if !e.is_not_found() {
                        warn!("reading {} {} failed: {}", R::LABEL, id, e);
                    }
                    Envelope::fail("Resource not found")
                }
            },
            Op::Create => {
                let created = parse_body::<Draft<R::Create>>(body)
                    .and_then(|draft| self.with_conn(|conn| actions::create::<R>(conn, draft)));
                match created {
                    Ok(row) => Envelope::ok(row),
                    Err(e) => {
                        warn!("creating {} failed: {}", R::LABEL, e);
                        Envelope::fail("Failed to create resource")
                    }
                }
            }
            Op::Update(id) => {
                let updated = parse_body::<R::Changes>(body)
                    .and_then(|changes| self.with_conn(|conn| actions::update::<R>(conn, id, changes)));
                match updated {
                    Ok(row) => Envelope::ok(row),
                    Err(e) => {
                        warn!("updating {} {} failed: {}", R::LABEL, id, e);
                        Envelope::fail("Failed to update resource")
                    }
                }
            }
            Op::Delete(id) => match self.with_conn(|conn| actions::delete::<R>(conn, id)) {
                Ok(_) => Envelope::ok(json!({ "message": "Resource deleted successfully" })),
                Err(e) => {
                    warn!("deleting {} {} failed: {}", R::LABEL, id, e);
                    Envelope::fail("Failed to delete resource")
                }
            },
        }
    }

    fn batch(&self, body: Option<Value>) -> Envelope {
        let requested = body
            .as_ref()
            .and_then(|b| b.get("questions"))
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        let outcome = parse_body::<BatchRequest>(body).and_then(|request| {
            self.with_conn(|conn| Ok(actions::batch_questions(conn, request)))
        });
        match outcome {
            Ok(outcome) => Envelope::ok(outcome),
            Err(e) => {
                warn!("batch creation failed: {}", e);
                Envelope::ok(BatchOutcome {
                    failed_count: requested,
                    errors: vec![format!("Batch creation failed: {}", e)],
                    ..BatchOutcome::default()
                })
            }
        }
    }

    /// Every row of a resource; any failure reads as an empty list.
    pub fn fetch_all<R: Resource>(&self) -> Vec<R> {
        let envelope = self.request("GET", R::PATH, None);
        match envelope.data {
            Some(data) if envelope.success => serde_json::from_value(data).unwrap_or_else(|e| {
                warn!("unreadable {} listing: {}", R::PATH, e);
                Vec::new()
            }),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_parsed() {
        assert_eq!(
            Endpoint::parse("GET", "students"),
            Ok(Endpoint::Resource(Kind::Students, Op::List))
        );
        assert_eq!(
            Endpoint::parse("get", "/exam_papers/12"),
            Ok(Endpoint::Resource(Kind::ExamPapers, Op::Get(12)))
        );
        assert_eq!(
            Endpoint::parse("POST", "question_knowledge_points"),
            Ok(Endpoint::Resource(Kind::QuestionKnowledgePoints, Op::Create))
        );
        assert_eq!(
            Endpoint::parse("POST", "questions/batch"),
            Ok(Endpoint::QuestionBatch)
        );
        assert_eq!(
            Endpoint::parse("PUT", "users/3"),
            Ok(Endpoint::Resource(Kind::Users, Op::Update(3)))
        );
        assert_eq!(
            Endpoint::parse("DELETE", "knowledge_points/8"),
            Ok(Endpoint::Resource(Kind::KnowledgePoints, Op::Delete(8)))
        );
    }

    #[test]
    fn bad_endpoints_explain_themselves() {
        assert_eq!(
            Endpoint::parse("GET", "tutors"),
            Err(String::from("Unknown resource: tutors"))
        );
        assert_eq!(
            Endpoint::parse("PATCH", "students/1"),
            Err(String::from("Unsupported method or endpoint: PATCH students/1"))
        );
        assert_eq!(
            Endpoint::parse("POST", "students/batch"),
            Err(String::from("Unsupported method or endpoint: POST students/batch"))
        );
        assert!(Endpoint::parse("GET", "students/abc")
            .unwrap_err()
            .starts_with("API request failed"));
    }

    #[test]
    fn every_kind_round_trips_its_path() {
        for kind in Kind::ALL.iter() {
            assert_eq!(Kind::parse(kind.path()), Some(*kind));
        }
    }

    #[test]
    fn envelope_shape() {
        let ok = serde_json::to_value(Envelope::ok(vec![1, 2])).unwrap();
        assert_eq!(ok, json!({ "success": true, "data": [1, 2] }));
        let fail = serde_json::to_value(Envelope::fail("Resource not found")).unwrap();
        assert_eq!(
            fail,
            json!({ "success": false, "error": "Resource not found" })
        );
    }
}
