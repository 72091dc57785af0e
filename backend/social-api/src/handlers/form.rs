/// Multipart form reading
///
/// Buffers file fields into `UploadedFile`s and collects text fields.
/// Size limits are enforced while streaming, so an oversized body is cut off
/// before it is fully read.
use crate::error::{AppError, Result};
use crate::services::media::UploadedFile;
use actix_multipart::Multipart;
use futures_util::stream::StreamExt;
use std::collections::HashMap;

const MAX_TEXT_FIELD_BYTES: usize = 16 * 1024;

#[derive(Debug, Default)]
pub struct MultipartForm {
    files: HashMap<String, Vec<UploadedFile>>,
    fields: HashMap<String, Vec<String>>,
}

impl MultipartForm {
    pub async fn read(mut payload: Multipart, max_file_bytes: usize, max_files: usize) -> Result<Self> {
        let mut form = MultipartForm::default();
        let mut file_count = 0;

        while let Some(item) = payload.next().await {
            let mut field = item?;
            let name = field.name().unwrap_or_default().to_string();
            let filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);

            let limit = if filename.is_some() {
                file_count += 1;
                if file_count > max_files {
                    return Err(AppError::ValidationFailed(format!(
                        "At most {max_files} files may be uploaded at once"
                    )));
                }
                max_file_bytes
            } else {
                MAX_TEXT_FIELD_BYTES
            };

            let mut bytes = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk?;
                if bytes.len() + chunk.len() > limit {
                    return Err(AppError::ValidationFailed(format!(
                        "Field '{name}' exceeds the {limit} byte limit"
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }

            match filename {
                Some(filename) => form
                    .files
                    .entry(name)
                    .or_default()
                    .push(UploadedFile { filename, bytes }),
                None => {
                    let text = String::from_utf8(bytes).map_err(|_| {
                        AppError::ValidationFailed(format!("Field '{name}' is not valid UTF-8"))
                    })?;
                    form.fields.entry(name).or_default().push(text);
                }
            }
        }

        Ok(form)
    }

    /// All files sent under `name`, in order.
    pub fn take_files(&mut self, name: &str) -> Vec<UploadedFile> {
        self.files.remove(name).unwrap_or_default()
    }

    /// The first file sent under `name`.
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.take_files(name).into_iter().next()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Values of a list field. Accepts repeated fields, a JSON array, or a
    /// comma-separated string. A value that opens a JSON array must parse as one.
    pub fn list(&self, name: &str) -> Result<Vec<String>> {
        let Some(values) = self.fields.get(name) else {
            return Ok(Vec::new());
        };

        let mut items = Vec::new();
        for raw in values {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') {
                let parsed: Vec<String> = serde_json::from_str(trimmed).map_err(|e| {
                    AppError::ValidationFailed(format!("Field '{name}' is not a valid list: {e}"))
                })?;
                items.extend(parsed);
            } else {
                items.extend(trimmed.split(',').map(str::to_string));
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_with(field: &str, values: &[&str]) -> MultipartForm {
        let mut form = MultipartForm::default();
        form.fields.insert(
            field.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        form
    }

    #[test]
    fn list_accepts_json_csv_and_repeats() {
        assert_eq!(
            form_with("tags", &[r#"["a","b"]"#]).list("tags").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            form_with("tags", &["a, b"]).list("tags").unwrap(),
            vec!["a".to_string(), " b".to_string()]
        );
        assert_eq!(
            form_with("tags", &["a", "b"]).list("tags").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(form_with("tags", &[]).list("other").unwrap().is_empty());
    }

    #[test]
    fn list_rejects_unterminated_json_array() {
        let err = form_with("tags", &[r#"["sun", "sea""#])
            .list("tags")
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }
}
