use std::collections::HashMap;

use axum::extract::{FromRequest, FromRequestParts, Multipart, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::media::UploadedFile;
use crate::state::AppState;

/// Identity carried by a verified bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
}

/// Extractor that requires authentication.
/// Rejects with 401 before the handler body runs, so no side effects happen
/// for unauthenticated requests.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Unauthorized. No token".into()))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            AppError::Unauthorized("Unauthorized. Invalid token".into())
        })?;

        Ok(CurrentUser {
            id: claims.id,
            name: claims.name,
        })
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// `Json<T>` whose rejections use the `{message}` error body.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}

/// Text fields and files of a form submission.
///
/// Accepts `multipart/form-data` (the only way to send files) and, for
/// text-only submissions, a flat JSON object.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// A text field, treating an empty value as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let JsonBody(raw) =
                JsonBody::<HashMap<String, serde_json::Value>>::from_request(req, state).await?;
            let fields = raw
                .into_iter()
                .filter_map(|(k, v)| match v {
                    serde_json::Value::String(s) => Some((k, s)),
                    serde_json::Value::Null => None,
                    other => Some((k, other.to_string())),
                })
                .collect();
            return Ok(FormData {
                fields,
                files: HashMap::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;

        let mut form = FormData::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::Validation(e.body_text()))?;
                    // Browsers send an empty part when no file was chosen.
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.insert(name, UploadedFile::new(file_name, bytes));
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(e.body_text()))?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }
}
