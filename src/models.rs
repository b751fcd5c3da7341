use crate::schema::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Student {
    pub id: i32,
    pub user_id: Option<i32>,
    pub name: String,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExamPaper {
    pub id: i32,
    pub student_id: i32,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExamPaperImage {
    pub id: i32,
    pub exam_paper_id: i32,
    pub image_url: String,
    #[serde(default)]
    pub upload_order: Option<i32>,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct KnowledgePoint {
    pub id: i32,
    pub name: String,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Question {
    pub id: i32,
    pub exam_paper_id: i32,
    pub image_id: Option<i32>,
    pub student_id: i32,
    pub content: Option<String>,
    pub is_correct: Option<bool>,
    pub remark: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub updated_time: Option<DateTime<Utc>>,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuestionKnowledgePoint {
    pub id: i32,
    pub question_id: i32,
    pub knowledge_point_id: i32,
    pub created_time: Option<DateTime<Utc>>,
}

/// A create request body. The backend assigns ids, so `id` never reaches the
/// insert; it is only consulted for the duplicate check.
#[derive(Deserialize, Debug)]
pub struct Draft<T> {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(flatten)]
    pub fields: T,
}

#[derive(Deserialize, Debug)]
pub struct NewUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = students)]
pub struct NewStudent {
    pub user_id: Option<i32>,
    pub name: String,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = exam_papers)]
pub struct NewExamPaper {
    pub student_id: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = exam_paper_images)]
pub struct NewExamPaperImage {
    pub exam_paper_id: i32,
    pub image_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub upload_order: Option<Option<i32>>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = knowledge_points)]
pub struct NewKnowledgePoint {
    pub name: String,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = questions)]
pub struct NewQuestion {
    pub exam_paper_id: i32,
    pub image_id: Option<i32>,
    pub student_id: i32,
    pub content: Option<String>,
    pub is_correct: Option<bool>,
    pub remark: Option<String>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = question_knowledge_points)]
pub struct NewQuestionKnowledgePoint {
    pub question_id: i32,
    pub knowledge_point_id: i32,
}

/// An explicit `null` becomes `Some(None)`, so nullable columns can be
/// cleared; an absent field stays `None` through `#[serde(default)]`.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update bodies: absent fields are left untouched.
pub trait Changes {
    fn is_empty(&self) -> bool;

    fn stamp(&mut self, _now: DateTime<Utc>) {}
}

#[derive(Deserialize, Default, Debug)]
pub struct UserChanges {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = users)]
pub struct UserChangeset {
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(AsChangeset, Deserialize, Default, Debug)]
#[diesel(table_name = students)]
pub struct StudentChanges {
    #[serde(default, deserialize_with = "nullable")]
    pub user_id: Option<Option<i32>>,
    pub name: Option<String>,
}

#[derive(AsChangeset, Deserialize, Default, Debug)]
#[diesel(table_name = exam_papers)]
pub struct ExamPaperChanges {
    pub student_id: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(AsChangeset, Deserialize, Default, Debug)]
#[diesel(table_name = exam_paper_images)]
pub struct ExamPaperImageChanges {
    pub exam_paper_id: Option<i32>,
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub upload_order: Option<Option<i32>>,
}

#[derive(AsChangeset, Deserialize, Default, Debug)]
#[diesel(table_name = knowledge_points)]
pub struct KnowledgePointChanges {
    pub name: Option<String>,
}

#[derive(AsChangeset, Deserialize, Default, Debug)]
#[diesel(table_name = questions)]
pub struct QuestionChanges {
    pub exam_paper_id: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_id: Option<Option<i32>>,
    pub student_id: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub content: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub is_correct: Option<Option<bool>>,
    #[serde(default, deserialize_with = "nullable")]
    pub remark: Option<Option<String>>,
    #[serde(skip)]
    pub updated_time: Option<DateTime<Utc>>,
}

#[derive(AsChangeset, Deserialize, Default, Debug)]
#[diesel(table_name = question_knowledge_points)]
pub struct QuestionKnowledgePointChanges {
    pub question_id: Option<i32>,
    pub knowledge_point_id: Option<i32>,
}

impl Changes for UserChanges {
    fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

impl Changes for StudentChanges {
    fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.name.is_none()
    }
}

impl Changes for ExamPaperChanges {
    fn is_empty(&self) -> bool {
        self.student_id.is_none() && self.title.is_none() && self.description.is_none()
    }
}

impl Changes for ExamPaperImageChanges {
    fn is_empty(&self) -> bool {
        self.exam_paper_id.is_none() && self.image_url.is_none() && self.upload_order.is_none()
    }
}

impl Changes for KnowledgePointChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

impl Changes for QuestionChanges {
    fn is_empty(&self) -> bool {
        self.exam_paper_id.is_none()
            && self.image_id.is_none()
            && self.student_id.is_none()
            && self.content.is_none()
            && self.is_correct.is_none()
            && self.remark.is_none()
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.updated_time = Some(now);
    }
}

impl Changes for QuestionKnowledgePointChanges {
    fn is_empty(&self) -> bool {
        self.question_id.is_none() && self.knowledge_point_id.is_none()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct BatchItem {
    pub content: String,
    pub is_correct: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct BatchRequest {
    pub exam_paper_id: i32,
    pub student_id: i32,
    pub image_id: Option<i32>,
    pub remark: Option<String>,
    pub questions: Vec<BatchItem>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failed_count: usize,
    pub created_questions: Vec<Question>,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn draft_keeps_supplied_id_out_of_the_fields() {
        let draft: Draft<NewStudent> =
            serde_json::from_value(json!({ "id": 7, "name": "Lin", "user_id": null })).unwrap();
        assert_eq!(draft.id, Some(7));
        assert_eq!(draft.fields.name, "Lin");
        assert_eq!(draft.fields.user_id, None);

        let draft: Draft<NewKnowledgePoint> =
            serde_json::from_value(json!({ "name": "fractions" })).unwrap();
        assert_eq!(draft.id, None);
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User {
            id: 1,
            username: String::from("admin"),
            password_hash: String::from("abc"),
            created_at: None,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["username"], "admin");
    }

    #[test]
    fn question_changes_ignore_client_timestamps() {
        let mut changes: QuestionChanges =
            serde_json::from_value(json!({ "updated_time": "2024-01-01T00:00:00Z" })).unwrap();
        assert!(changes.is_empty());
        assert!(changes.updated_time.is_none());
        changes.is_correct = Some(Some(true));
        assert!(!changes.is_empty());
    }

    #[test]
    fn explicit_null_clears_nullable_columns() {
        let changes: QuestionChanges =
            serde_json::from_value(json!({ "is_correct": null, "remark": "recheck" })).unwrap();
        assert_eq!(changes.is_correct, Some(None));
        assert_eq!(changes.remark, Some(Some(String::from("recheck"))));
        assert_eq!(changes.image_id, None);
        assert_eq!(changes.content, None);
        assert!(!changes.is_empty());

        let changes: StudentChanges = serde_json::from_value(json!({ "user_id": null })).unwrap();
        assert_eq!(changes.user_id, Some(None));
        assert_eq!(changes.name, None);

        let changes: ExamPaperImageChanges =
            serde_json::from_value(json!({ "upload_order": 2 })).unwrap();
        assert_eq!(changes.upload_order, Some(Some(2)));

        let changes: ExamPaperChanges = serde_json::from_value(json!({})).unwrap();
        assert!(changes.is_empty());
    }
}
