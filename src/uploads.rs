use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::Multipart;
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldError};
use crate::storage::StorageClient;

pub struct UploadItem {
    pub field: String,
    pub body: Bytes,
    pub content_type: String,
}

/// Text fields and files of a multipart request, read fully into memory.
#[derive(Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: Vec<UploadItem>,
}

impl MultipartForm {
    pub async fn read(mut mp: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();
        while let Some(field) = mp
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
        {
            let name = field
                .name()
                .unwrap_or_default()
                .trim_end_matches("[]")
                .to_string();
            if field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("upload failed: {}", e)))?;
                if body.is_empty() {
                    continue;
                }
                form.files.push(UploadItem {
                    field: name,
                    body,
                    content_type,
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("invalid field {}: {}", name, e)))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    #[cfg(test)]
    pub fn from_fields(fields: &[(&str, &str)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: Vec::new(),
        }
    }

    /// Trimmed, non-empty text value.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Parses an optional field, recording a validation error when it is malformed.
    pub fn parse<T: FromStr>(&self, name: &str, errors: &mut Vec<FieldError>) -> Option<T> {
        let raw = self.text(name)?;
        match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                errors.push(FieldError::new(name, format!("invalid value {:?}", raw)));
                None
            }
        }
    }

    pub fn take_files(&mut self, name: &str) -> Vec<UploadItem> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.field == name);
        self.files = rest;
        taken
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

pub fn ext_from_mime(ct: &str, kind: MediaKind) -> Option<&'static str> {
    match (kind, ct) {
        (MediaKind::Image, "image/jpeg" | "image/jpg") => Some("jpg"),
        (MediaKind::Image, "image/png") => Some("png"),
        (MediaKind::Image, "image/webp") => Some("webp"),
        (MediaKind::Image, "image/heic") => Some("heic"),
        (MediaKind::Image, "image/gif") => Some("gif"),
        (MediaKind::Video, "video/mp4") => Some("mp4"),
        (MediaKind::Video, "video/webm") => Some("webm"),
        (MediaKind::Video, "video/quicktime") => Some("mov"),
        _ => None,
    }
}

/// Stores each file under `{prefix}/{owner}/{uuid}.{ext}` and returns the keys.
/// Files already written are removed again if a later one fails.
pub async fn store_files(
    storage: &dyn StorageClient,
    prefix: &str,
    owner: Uuid,
    files: Vec<UploadItem>,
    kind: MediaKind,
) -> AppResult<Vec<String>> {
    let mut checked = Vec::with_capacity(files.len());
    for f in files {
        let ext = ext_from_mime(&f.content_type, kind).ok_or_else(|| {
            AppError::Validation(vec![FieldError::new(
                f.field.clone(),
                format!("unsupported content type {}", f.content_type),
            )])
        })?;
        checked.push((f, ext));
    }

    let mut keys = Vec::with_capacity(checked.len());
    for (f, ext) in checked {
        let key = format!("{}/{}/{}.{}", prefix, owner, Uuid::new_v4(), ext);
        if let Err(e) = storage.put_object(&key, f.body, &f.content_type).await {
            remove_files_best_effort(storage, &keys).await;
            return Err(AppError::Internal(e.context(format!("store {}", key))));
        }
        debug!(%key, "file stored");
        keys.push(key);
    }
    Ok(keys)
}

/// Deletes stored objects; failures are logged and otherwise ignored.
pub async fn remove_files_best_effort(storage: &dyn StorageClient, keys: &[String]) {
    for key in keys {
        if let Err(e) = storage.delete_object(key).await {
            warn!(error = %e, %key, "failed to remove stored file");
        }
    }
}
