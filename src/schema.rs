table! {
    exam_paper_images (id) {
        id -> Int4,
        exam_paper_id -> Int4,
        image_url -> Text,
        upload_order -> Nullable<Int4>,
    }
}

table! {
    exam_papers (id) {
        id -> Int4,
        student_id -> Int4,
        title -> Nullable<Text>,
        description -> Nullable<Text>,
        created_time -> Nullable<Timestamptz>,
    }
}

table! {
    knowledge_points (id) {
        id -> Int4,
        name -> Text,
    }
}

table! {
    question_knowledge_points (id) {
        id -> Int4,
        question_id -> Int4,
        knowledge_point_id -> Int4,
        created_time -> Nullable<Timestamptz>,
    }
}

table! {
    questions (id) {
        id -> Int4,
        exam_paper_id -> Int4,
        image_id -> Nullable<Int4>,
        student_id -> Int4,
        content -> Nullable<Text>,
        is_correct -> Nullable<Bool>,
        remark -> Nullable<Text>,
        created_time -> Nullable<Timestamptz>,
        updated_time -> Nullable<Timestamptz>,
    }
}

table! {
    students (id) {
        id -> Int4,
        user_id -> Nullable<Int4>,
        name -> Text,
    }
}

table! {
    users (id) {
        id -> Int4,
        username -> Text,
        password_hash -> Text,
        created_at -> Nullable<Timestamptz>,
    }
}

joinable!(exam_paper_images -> exam_papers (exam_paper_id));
joinable!(exam_papers -> students (student_id));
joinable!(question_knowledge_points -> knowledge_points (knowledge_point_id));
joinable!(question_knowledge_points -> questions (question_id));
joinable!(questions -> exam_paper_images (image_id));
joinable!(questions -> exam_papers (exam_paper_id));
joinable!(questions -> students (student_id));
joinable!(students -> users (user_id));

allow_tables_to_appear_in_same_query!(
    exam_paper_images,
    exam_papers,
    knowledge_points,
    question_knowledge_points,
    questions,
    students,
    users,
);
