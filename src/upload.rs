use std::path::{Path, PathBuf};

use axum::extract::{multipart::Field, Multipart};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

pub const CONTENT_MAX_BYTES: usize = 50 * 1024 * 1024;
pub const VIDEO_MAX_BYTES: usize = 500 * 1024 * 1024;

pub const CONTENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "text/markdown",
    "application/json",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/svg+xml",
];

pub const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-ms-wmv",
    "video/x-flv",
    // short names some clients send
    "video/avi",
    "video/mov",
    "video/wmv",
    "video/flv",
];

// multipart text fields that carry something other than a plain string
const ARRAY_FIELDS: &[&str] = &["tags", "prerequisites", "learning_objectives", "subtitles"];
const OBJECT_FIELDS: &[&str] = &["content_data", "metadata"];
const NUMBER_FIELDS: &[&str] = &["duration_minutes"];
const BOOL_FIELDS: &[&str] = &["is_active"];

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: String,
    pub file_name: String,
    pub size: i64,
    pub mime_type: String,
}

pub struct UploadRules<'a> {
    pub dir: PathBuf,
    pub max_bytes: usize,
    pub allowed: &'a [&'a str],
}

/// `<field>-<millis>-<random>.<ext>`, keeping the original extension.
pub fn stored_name(field: &str, original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    let random = Uuid::new_v4().as_u128() % 1_000_000_000;
    format!("{field}-{}-{random}{ext}", Utc::now().timestamp_millis())
}

/// Streams one multipart file field to disk, enforcing type and size.
pub async fn save_field(mut field: Field<'_>, rules: &UploadRules<'_>) -> AppResult<StoredFile> {
    let field_name = field.name().unwrap_or("file").to_string();
    let original = field.file_name().unwrap_or("upload").to_string();
    let mime_type = field.content_type().unwrap_or("application/octet-stream").to_string();
    if !rules.allowed.contains(&mime_type.as_str()) {
        return Err(AppError::bad_request(format!("Invalid file type: {mime_type}")));
    }

    fs::create_dir_all(&rules.dir).await?;
    let path = rules.dir.join(stored_name(&field_name, &original));
    let mut file = fs::File::create(&path).await?;

    let mut size = 0usize;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                remove_file(&path.display().to_string()).await;
                return Err(e.into());
            }
        };
        size += chunk.len();
        if size > rules.max_bytes {
            drop(file);
            remove_file(&path.display().to_string()).await;
            return Err(AppError::bad_request(format!(
                "File too large, limit is {} MB",
                rules.max_bytes / (1024 * 1024)
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    tracing::info!(path = %path.display(), size, %mime_type, "stored upload");
    Ok(StoredFile {
        path: path.display().to_string(),
        file_name: original,
        size: size as i64,
        mime_type,
    })
}

/// Text fields of a multipart form plus the one file it may carry.
pub struct Form {
    pub fields: Vec<(String, String)>,
    pub file: Option<StoredFile>,
}

/// Reads the whole form, saving `file_field` to disk. A failure part way
/// through removes whatever was already written.
pub async fn read_form(multipart: &mut Multipart, file_field: &str, rules: &UploadRules<'_>) -> AppResult<Form> {
    let mut form = Form { fields: Vec::new(), file: None };
    let result: AppResult<()> = async {
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == file_field {
                let stored = save_field(field, rules).await?;
                if let Some(previous) = form.file.replace(stored) {
                    remove_file(&previous.path).await;
                }
            } else {
                let text = field.text().await?;
                form.fields.push((name, text));
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        if let Some(file) = &form.file {
            remove_file(&file.path).await;
        }
        return Err(e);
    }
    Ok(form)
}

/// Deserializes and validates the text fields of a form.
pub fn parse_form<T: DeserializeOwned + Validate>(fields: Vec<(String, String)>) -> AppResult<T> {
    let value = form_to_json(fields)?;
    let parsed: T = serde_json::from_value(value).map_err(|e| AppError::Validation(e.to_string()))?;
    parsed.validate()?;
    Ok(parsed)
}

/// Best-effort delete; a missing or locked file is only logged.
pub async fn remove_file(path: &str) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::warn!(%path, error = %e, "failed to delete stored file");
    }
}

/// Turns multipart text fields into a JSON object a request struct can
/// deserialize from. Lists accept JSON or comma-separated text.
pub fn form_to_json(fields: Vec<(String, String)>) -> AppResult<Value> {
    let mut map = Map::new();
    for (name, raw) in fields {
        let raw = raw.trim();
        let value = if ARRAY_FIELDS.contains(&name.as_str()) {
            if raw.starts_with('[') {
                serde_json::from_str(raw).map_err(|_| AppError::bad_request(format!("{name} must be a JSON array")))?
            } else {
                Value::Array(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| Value::String(s.to_string()))
                        .collect(),
                )
            }
        } else if OBJECT_FIELDS.contains(&name.as_str()) {
            serde_json::from_str(raw).map_err(|_| AppError::bad_request(format!("{name} must be a JSON object")))?
        } else if NUMBER_FIELDS.contains(&name.as_str()) {
            if raw.is_empty() {
                continue;
            }
            let n: i64 = raw
                .parse()
                .map_err(|_| AppError::bad_request(format!("{name} must be a number")))?;
            Value::from(n)
        } else if BOOL_FIELDS.contains(&name.as_str()) {
            Value::Bool(raw.eq_ignore_ascii_case("true"))
        } else if raw.is_empty() {
            continue;
        } else {
            Value::String(raw.to_string())
        };
        map.insert(name, value);
    }
    Ok(Value::Object(map))
}
