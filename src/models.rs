use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, NoneAsEmptyString};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

pub type JsonList = Json<Vec<String>>;

// --- enums stored as TEXT ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    /// Maps the generator's easy/medium/hard scale (or a level name) onto a level.
    pub fn from_generation(difficulty: &str) -> Self {
        match difficulty.trim().to_ascii_lowercase().as_str() {
            "easy" | "beginner" => DifficultyLevel::Beginner,
            "hard" | "advanced" => DifficultyLevel::Advanced,
            _ => DifficultyLevel::Intermediate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyLevel::Beginner => "beginner",
            DifficultyLevel::Intermediate => "intermediate",
            DifficultyLevel::Advanced => "advanced",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Document,
    Interactive,
    Quiz,
    Assignment,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Document => "document",
            ContentType::Interactive => "interactive",
            ContentType::Quiz => "quiz",
            ContentType::Assignment => "assignment",
        }
    }
}

// --- rows ---

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub class: String,
    pub role: String,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub class: String,
    pub role: String,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            class: u.class.clone(),
            role: u.role.clone(),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct StoredToken {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct SyllabusEntry {
    pub id: Uuid,
    pub class: String,
    pub subject: String,
    pub chapter_name: String,
    pub chapter_number: i32,
    pub topics: JsonList,
    pub learning_objectives: JsonList,
    pub duration_hours: i32,
    pub difficulty_level: String,
    pub prerequisites: JsonList,
    pub tags: JsonList,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct StudyContent {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub content_type: String,
    pub difficulty_level: String,
    pub duration_minutes: i32,
    pub tags: JsonList,
    pub prerequisites: JsonList,
    pub learning_objectives: JsonList,
    pub content_data: Json<Value>,
    pub metadata: Json<Value>,
    pub body: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub view_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Validate)]
pub struct Subtitle {
    #[validate(length(min = 1))]
    pub language: String,
    #[validate(url)]
    pub url: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub difficulty_level: String,
    pub duration_minutes: Option<i32>,
    pub tags: JsonList,
    pub thumbnail_url: Option<String>,
    pub transcript: String,
    pub subtitles: Json<Vec<Subtitle>>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub view_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct QuizQuestion {
    pub id: Uuid,
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub question: String,
    pub options: JsonList,
    pub correct_answer: i32,
    pub explanation: String,
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct QuizResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub chapter: String,
    pub score: i32,
    pub total_questions: i32,
    pub taken_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Progress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub chapter: String,
    pub progress_percent: i32,
    pub points: i32,
    pub last_updated: DateTime<Utc>,
}

// --- aggregates ---

/// One row of a `GROUP BY` distribution.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Bucket {
    pub name: String,
    pub count: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct SyllabusOverview {
    pub total_chapters: i64,
    pub total_classes: i64,
    pub total_subjects: i64,
    pub avg_duration_hours: f64,
    pub total_duration_hours: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ClassBucket {
    pub class: String,
    pub chapters: i64,
    pub subjects: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ContentOverview {
    pub total_content: i64,
    pub total_views: i64,
    pub avg_duration_minutes: f64,
    pub total_subjects: i64,
    pub total_chapters: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct VideoOverview {
    pub total_videos: i64,
    pub total_views: i64,
    pub total_size_bytes: i64,
    pub avg_duration_minutes: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self { page, limit, total, pages }
    }

    /// A single page holding every row.
    pub fn whole(total: i64) -> Self {
        Self { page: 1, limit: total, total, pages: if total > 0 { 1 } else { 0 } }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

// --- auth requests ---

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct RegisterReq {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 50))]
    pub class: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct LoginReq {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct RefreshReq {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct ForgotPasswordReq {
    #[validate(email)]
    pub email: String,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct ResetPasswordReq {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LogoutReq {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct UpdateProfileReq {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub class: String,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct ChangePasswordReq {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

// --- syllabus requests ---

fn default_duration_hours() -> i32 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct SyllabusReq {
    #[validate(length(min = 1, max = 50))]
    pub class: String,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 255))]
    pub chapter_name: String,
    #[validate(range(min = 1))]
    pub chapter_number: i32,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default = "default_duration_hours")]
    #[validate(range(min = 1, max = 100))]
    pub duration_hours: i32,
    #[serde(default)]
    pub difficulty_level: DifficultyLevel,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct BulkSyllabusReq {
    #[validate(length(min = 1, max = 50))]
    pub class: String,
    #[validate]
    pub subjects: Vec<BulkSubject>,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct BulkSubject {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate]
    pub chapters: Vec<BulkChapter>,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct BulkChapter {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 1))]
    pub number: i32,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default = "default_duration_hours")]
    #[validate(range(min = 1, max = 100))]
    pub duration_hours: i32,
    #[serde(default)]
    pub difficulty_level: DifficultyLevel,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BulkSyllabusReq {
    pub fn total_chapters(&self) -> usize {
        self.subjects.iter().map(|s| s.chapters.len()).sum()
    }
}

// --- content / video requests ---

fn default_duration_minutes() -> i32 {
    15
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct ContentReq {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 255))]
    pub chapter: String,
    #[validate(length(max = 255))]
    pub topic: Option<String>,
    pub content_type: ContentType,
    #[serde(default)]
    pub difficulty_level: DifficultyLevel,
    #[validate(range(min = 1, max = 300))]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    pub content_data: Option<Value>,
    pub metadata: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct BulkContentReq {
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 255))]
    pub chapter: String,
    #[validate]
    pub contents: Vec<BulkContentItem>,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct BulkContentItem {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    pub topic: Option<String>,
    pub content_type: ContentType,
    #[serde(default)]
    pub difficulty_level: DifficultyLevel,
    #[serde(default = "default_duration_minutes")]
    #[validate(range(min = 1, max = 300))]
    pub duration_minutes: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content_data: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct VideoReq {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 255))]
    pub chapter: String,
    #[validate(length(max = 255))]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty_level: DifficultyLevel,
    #[validate(range(min = 1, max = 300))]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[validate(url)]
    pub thumbnail_url: Option<String>,
    pub transcript: Option<String>,
    #[serde(default)]
    #[validate]
    pub subtitles: Vec<Subtitle>,
}

// --- generation / chat / progress requests ---

fn default_difficulty() -> String {
    "medium".into()
}

fn default_question_count() -> u32 {
    5
}

fn default_language() -> String {
    "english".into()
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct QuizGenerateReq {
    #[validate(length(min = 1))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub chapter: String,
    pub topic: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_question_count")]
    #[validate(range(min = 1, max = 20))]
    pub count: u32,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct ContentGenerateReq {
    #[validate(length(min = 1))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub chapter: String,
    pub topic: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChatReq {
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct ProgressUpdateReq {
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 255))]
    pub chapter: String,
    pub progress_percent: i32,
    #[serde(default)]
    pub points: i32,
}

impl ProgressUpdateReq {
    /// Percent into 0..=100 and points never negative.
    pub fn clamped(&self) -> (i32, i32) {
        (self.progress_percent.clamp(0, 100), self.points.max(0))
    }
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct QuizResultReq {
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 255))]
    pub chapter: String,
    #[validate(range(min = 0))]
    pub score: i32,
    #[validate(range(min = 1))]
    pub total_questions: i32,
}

// --- query strings ---

#[serde_as]
#[derive(Deserialize, Debug, Default)]
pub struct UserIdQuery {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[serde_as]
#[derive(Deserialize, Debug, Default)]
pub struct EmailQuery {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub email: Option<String>,
}

#[serde_as]
#[derive(Deserialize, Debug, Default)]
pub struct LimitQuery {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub difficulty_level: Option<String>,
}

/// Filters shared by the syllabus, content and video listings.
#[serde_as]
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ListQuery {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub class: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub subject: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub difficulty_level: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub search: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub page: Option<i64>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub sort_order: Option<String>,
}

impl ListQuery {
    /// Whether the caller asked for a page at all.
    pub fn is_paged(&self) -> bool {
        self.page.is_some() || self.limit.is_some()
    }

    pub fn pagination(&self, default_limit: i64, total: i64) -> Pagination {
        let page = self.page.unwrap_or(1).clamp(1, i32::MAX as i64);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, 500);
        Pagination::new(page, limit, total)
    }

    pub fn descending(&self, default_desc: bool) -> bool {
        match self.sort_order.as_deref() {
            Some(o) => o.eq_ignore_ascii_case("desc"),
            None => default_desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_pages_up() {
        let p = Pagination::new(2, 20, 41);
        assert_eq!(p.pages, 3);
        assert_eq!(p.offset(), 20);
        assert_eq!(Pagination::new(1, 50, 0).pages, 0);
    }

    #[test]
    fn list_query_clamps_page_and_limit() {
        let q = ListQuery { page: Some(0), limit: Some(10_000), ..Default::default() };
        let p = q.pagination(50, 1200);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 500);
        assert!(!q.descending(false));
        let q = ListQuery { sort_order: Some("DESC".into()), ..Default::default() };
        assert!(q.descending(false));
    }

    #[test]
    fn unpaged_listing_is_one_page() {
        assert!(!ListQuery::default().is_paged());
        assert!(ListQuery { limit: Some(10), ..Default::default() }.is_paged());
        let p = Pagination::whole(120);
        assert_eq!((p.page, p.limit, p.pages, p.offset()), (1, 120, 1, 0));
        assert_eq!(Pagination::whole(0).pages, 0);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let q: ListQuery = serde_json::from_value(serde_json::json!({ "page": "9223372036854775807" })).unwrap();
        let p = q.pagination(50, 10);
        assert_eq!(p.page, i32::MAX as i64);
        assert_eq!(p.offset(), (i32::MAX as i64 - 1) * 50);
        assert_eq!(Pagination::new(i64::MAX, 500, 0).offset(), i64::MAX);
    }

    #[test]
    fn generation_request_uses_stored_enums() {
        let req: ContentGenerateReq =
            serde_json::from_value(serde_json::json!({ "subject": "Physics", "chapter": "Motion" })).unwrap();
        assert_eq!(req.content_type, ContentType::Text);
        assert_eq!(DifficultyLevel::from_generation(&req.difficulty), DifficultyLevel::Intermediate);
        assert_eq!(DifficultyLevel::from_generation("Easy"), DifficultyLevel::Beginner);
        assert_eq!(DifficultyLevel::from_generation("hard"), DifficultyLevel::Advanced);
        assert_eq!(DifficultyLevel::from_generation("advanced"), DifficultyLevel::Advanced);

        let bad = serde_json::from_value::<ContentGenerateReq>(serde_json::json!({
            "subject": "Physics",
            "chapter": "Motion",
            "content_type": "podcast",
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn progress_is_clamped() {
        let req = ProgressUpdateReq {
            subject: "Physics".into(),
            chapter: "Motion".into(),
            progress_percent: 140,
            points: -5,
        };
        assert_eq!(req.clamped(), (100, 0));
    }

    #[test]
    fn register_defaults_to_student_and_validates() {
        let req: RegisterReq = serde_json::from_value(serde_json::json!({
            "name": "Asha",
            "email": "asha@example.com",
            "password": "Str0ng!pass",
            "class": "SSLC"
        }))
        .unwrap();
        assert_eq!(req.role, Role::Student);
        assert!(req.validate().is_ok());

        let bad: RegisterReq = serde_json::from_value(serde_json::json!({
            "name": "A",
            "email": "not-an-email",
            "password": "short",
            "class": ""
        }))
        .unwrap();
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        for f in ["name", "email", "password", "class"] {
            assert!(fields.contains_key(f), "missing error for {f}");
        }
    }

    #[test]
    fn syllabus_defaults_apply() {
        let req: SyllabusReq = serde_json::from_value(serde_json::json!({
            "class": "1st PUC",
            "subject": "Physics",
            "chapter_name": "Units and Measurement",
            "chapter_number": 1
        }))
        .unwrap();
        assert_eq!(req.duration_hours, 10);
        assert_eq!(req.difficulty_level, DifficultyLevel::Intermediate);
        assert!(req.is_active);
        assert!(req.topics.is_empty());
    }

    #[test]
    fn bulk_syllabus_validates_nested_chapters() {
        let req: BulkSyllabusReq = serde_json::from_value(serde_json::json!({
            "class": "SSLC",
            "subjects": [{ "name": "Mathematics", "chapters": [{ "name": "Real Numbers", "number": 0 }] }]
        }))
        .unwrap();
        assert!(req.validate().is_err());
        assert_eq!(req.total_chapters(), 1);
    }

    #[test]
    fn empty_query_values_are_none() {
        let q: ListQuery = serde_json::from_value(serde_json::json!({
            "class": "",
            "subject": "Physics",
            "is_active": "true",
            "page": "3"
        }))
        .unwrap();
        assert_eq!(q.class, None);
        assert_eq!(q.subject.as_deref(), Some("Physics"));
        assert_eq!(q.is_active, Some(true));
        assert_eq!(q.page, Some(3));
    }
}
