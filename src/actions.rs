use crate::auth::hash_password;
use crate::error::{Error, Result};
use crate::models::*;
use crate::schema::*;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::QueryResult;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;

/// A backend table exposed as a CRUD resource.
pub trait Resource: Serialize + DeserializeOwned + Send + Sized + 'static {
    /// Path segment and gateway name, e.g. `exam_papers`.
    const PATH: &'static str;
    /// Human readable name used in messages.
    const LABEL: &'static str;
    /// Listing degrades to an empty list instead of failing.
    const LIST_FAILS_EMPTY: bool = false;

    type Create: DeserializeOwned + Send + 'static;
    type Changes: Changes + DeserializeOwned + Send + 'static;

    fn list(conn: &mut PgConnection) -> QueryResult<Vec<Self>>;
    fn find(conn: &mut PgConnection, id: i32) -> QueryResult<Option<Self>>;
    fn insert(conn: &mut PgConnection, fields: Self::Create) -> QueryResult<Self>;
    fn update(conn: &mut PgConnection, id: i32, changes: Self::Changes) -> QueryResult<Option<Self>>;
    fn delete(conn: &mut PgConnection, id: i32) -> QueryResult<usize>;
}

macro_rules! resource {
    ($row:ty, $table:ident, $label:expr, $create:ty, $changes:ty) => {
        resource!($row, $table, $label, $create, $changes, false);
    };
    ($row:ty, $table:ident, $label:expr, $create:ty, $changes:ty, $fails_empty:expr) => {
        impl Resource for $row {
            const PATH: &'static str = stringify!($table);
            const LABEL: &'static str = $label;
            const LIST_FAILS_EMPTY: bool = $fails_empty;

            type Create = $create;
            type Changes = $changes;

            fn list(conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
                $table::table.order($table::id.asc()).load(conn)
            }

            fn find(conn: &mut PgConnection, id: i32) -> QueryResult<Option<Self>> {
                $table::table.find(id).first(conn).optional()
            }

            fn insert(conn: &mut PgConnection, fields: $create) -> QueryResult<Self> {
                diesel::insert_into($table::table)
                    .values(&fields)
                    .get_result(conn)
            }

            fn update(
                conn: &mut PgConnection,
                id: i32,
                mut changes: $changes,
            ) -> QueryResult<Option<Self>> {
                if changes.is_empty() {
                    return Self::find(conn, id);
                }
                changes.stamp(Utc::now());
                diesel::update($table::table.find(id))
                    .set(&changes)
                    .get_result(conn)
                    .optional()
            }

            fn delete(conn: &mut PgConnection, id: i32) -> QueryResult<usize> {
                diesel::delete($table::table.find(id)).execute(conn)
            }
        }
    };
}

resource!(Student, students, "student", NewStudent, StudentChanges);
resource!(ExamPaper, exam_papers, "exam paper", NewExamPaper, ExamPaperChanges);
resource!(
    ExamPaperImage,
    exam_paper_images,
    "exam paper image",
    NewExamPaperImage,
    ExamPaperImageChanges
);
resource!(
    KnowledgePoint,
    knowledge_points,
    "knowledge point",
    NewKnowledgePoint,
    KnowledgePointChanges,
    true
);
resource!(Question, questions, "question", NewQuestion, QuestionChanges);
resource!(
    QuestionKnowledgePoint,
    question_knowledge_points,
    "question knowledge point",
    NewQuestionKnowledgePoint,
    QuestionKnowledgePointChanges,
    true
);

impl Resource for User {
    const PATH: &'static str = "users";
    const LABEL: &'static str = "user";

    type Create = NewUserRequest;
    type Changes = UserChanges;

    fn list(conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        users::table.order(users::id.asc()).load(conn)
    }

    fn find(conn: &mut PgConnection, id: i32) -> QueryResult<Option<Self>> {
        users::table.find(id).first(conn).optional()
    }

    fn insert(conn: &mut PgConnection, fields: NewUserRequest) -> QueryResult<Self> {
        diesel::insert_into(users::table)
            .values(&NewUser {
                password_hash: hash_password(&fields.password),
                username: fields.username,
            })
            .get_result(conn)
    }

    fn update(conn: &mut PgConnection, id: i32, changes: UserChanges) -> QueryResult<Option<Self>> {
        if changes.is_empty() {
            return Self::find(conn, id);
        }
        let changeset = UserChangeset {
            username: changes.username,
            password_hash: changes.password.as_deref().map(hash_password),
        };
        diesel::update(users::table.find(id))
            .set(&changeset)
            .get_result(conn)
            .optional()
    }

    fn delete(conn: &mut PgConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(users::table.find(id)).execute(conn)
    }
}

pub fn list<R: Resource>(conn: &mut PgConnection) -> Result<Vec<R>> {
    Ok(R::list(conn)?)
}

pub fn get<R: Resource>(conn: &mut PgConnection, id: i32) -> Result<R> {
    R::find(conn, id)?.ok_or_else(|| Error::not_found(R::LABEL))
}

/// Fails with `Conflict` when a supplied id is already taken.
fn ensure_free_id<F>(id: Option<i32>, label: &str, exists: F) -> Result<()>
where
    F: FnOnce(i32) -> QueryResult<bool>,
{
    match id {
        Some(id) if exists(id)? => Err(Error::Conflict(format!(
            "{} id {} already exists",
            label, id
        ))),
        _ => Ok(()),
    }
}

pub fn create<R: Resource>(conn: &mut PgConnection, draft: Draft<R::Create>) -> Result<R> {
    ensure_free_id(draft.id, R::LABEL, |id| Ok(R::find(conn, id)?.is_some()))?;
    let row = R::insert(conn, draft.fields)?;
    debug!("created {}", R::LABEL);
    Ok(row)
}

pub fn update<R: Resource>(conn: &mut PgConnection, id: i32, changes: R::Changes) -> Result<R> {
    R::update(conn, id, changes)?.ok_or_else(|| Error::not_found(R::LABEL))
}

/// Deleting an absent row is not an error.
pub fn delete<R: Resource>(conn: &mut PgConnection, id: i32) -> Result<usize> {
    Ok(R::delete(conn, id)?)
}

/// Inserts every item on its own; a failing item is reported and skipped.
pub fn create_batch<E, F>(request: BatchRequest, mut insert: F) -> BatchOutcome
where
    E: Display,
    F: FnMut(NewQuestion) -> std::result::Result<Question, E>,
{
    let mut outcome = BatchOutcome::default();
    for (i, item) in request.questions.into_iter().enumerate() {
        let question = NewQuestion {
            exam_paper_id: request.exam_paper_id,
            image_id: request.image_id,
            student_id: request.student_id,
            content: Some(item.content),
            is_correct: Some(item.is_correct),
            remark: request.remark.clone(),
        };
        match insert(question) {
            Ok(created) => {
                outcome.success_count += 1;
                outcome.created_questions.push(created);
            }
            Err(e) => {
                warn!("batch question {} failed: {}", i + 1, e);
                outcome.failed_count += 1;
                outcome.errors.push(format!("question {}: {}", i + 1, e));
            }
        }
    }
    outcome
}

pub fn batch_questions(conn: &mut PgConnection, request: BatchRequest) -> BatchOutcome {
    create_batch(request, |question| Question::insert(conn, question))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taken_ids_conflict() {
        match ensure_free_id(Some(3), "student", |_| Ok(true)) {
            Err(Error::Conflict(message)) => assert_eq!(message, "student id 3 already exists"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(ensure_free_id(Some(3), "student", |_| Ok(false)).is_ok());
    }

    #[test]
    fn missing_id_skips_the_lookup() {
        let result = ensure_free_id(None, "student", |_| -> QueryResult<bool> {
            panic!("no lookup without an id")
        });
        assert!(result.is_ok());
    }

    #[test]
    fn failed_lookup_is_not_a_conflict() {
        let result = ensure_free_id(Some(3), "student", |_| Err(diesel::result::Error::NotFound));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    fn request(n: usize) -> BatchRequest {
        BatchRequest {
            exam_paper_id: 4,
            student_id: 2,
            image_id: Some(9),
            remark: Some(String::from("chapter 3")),
            questions: (0..n)
                .map(|i| BatchItem {
                    content: format!("q{}", i + 1),
                    is_correct: i % 2 == 0,
                })
                .collect(),
        }
    }

    fn stored(id: i32, q: NewQuestion) -> Question {
        Question {
            id,
            exam_paper_id: q.exam_paper_id,
            image_id: q.image_id,
            student_id: q.student_id,
            content: q.content,
            is_correct: q.is_correct,
            remark: q.remark,
            created_time: None,
            updated_time: None,
        }
    }

    #[test]
    fn batch_reports_failures_by_position() {
        let mut next = 0;
        let outcome = create_batch(request(5), |q| {
            next += 1;
            if q.content.as_deref() == Some("q2") || q.content.as_deref() == Some("q5") {
                Err("insert rejected")
            } else {
                Ok(stored(next, q))
            }
        });
        assert_eq!(outcome.success_count, 3);
        assert_eq!(outcome.failed_count, 2);
        assert_eq!(outcome.success_count + outcome.failed_count, 5);
        assert_eq!(
            outcome.errors,
            vec![
                String::from("question 2: insert rejected"),
                String::from("question 5: insert rejected"),
            ]
        );
        assert_eq!(outcome.created_questions.len(), 3);
    }

    #[test]
    fn batch_shares_exam_student_image_and_remark() {
        let outcome = create_batch::<&str, _>(request(2), |q| Ok(stored(1, q)));
        for q in &outcome.created_questions {
            assert_eq!(q.exam_paper_id, 4);
            assert_eq!(q.student_id, 2);
            assert_eq!(q.image_id, Some(9));
            assert_eq!(q.remark.as_deref(), Some("chapter 3"));
        }
        assert_eq!(outcome.created_questions[0].is_correct, Some(true));
        assert_eq!(outcome.created_questions[1].is_correct, Some(false));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let outcome = create_batch::<&str, _>(request(0), |_| unreachable!());
        assert_eq!(outcome.success_count, 0);
        assert_eq!(outcome.failed_count, 0);
        assert!(outcome.errors.is_empty());
    }
}
