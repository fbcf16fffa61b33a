use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    gemini::Dispatcher,
    models::{EditPromptRequest, GenerationUpdate, ImageSlot, ModeRequest, Options, ThumbnailUpdate},
    state::{ChoiceError, StudioState, SubmitError},
    upload::{reference_image_from_upload, UploadError},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<HashMap<Uuid, StudioState>>>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { store: Arc::default(), dispatcher }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: StudioState,
    pub busy: bool,
}

impl From<StudioState> for SessionView {
    fn from(session: StudioState) -> Self {
        let busy = session.is_busy();
        Self { session, busy }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session not found")]
    NotFound,
    #[error(transparent)]
    Busy(SubmitError),
    #[error(transparent)]
    Choice(#[from] ChoiceError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("request task failed")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Busy(_) => StatusCode::CONFLICT,
            ApiError::Choice(_) | ApiError::Upload(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Applies a transition to one session under the write lock.
fn modify<F>(state: &AppState, id: Uuid, f: F) -> Result<StudioState, ApiError>
where
    F: FnOnce(StudioState) -> StudioState,
{
    let mut guard = state.store.write();
    let current = guard.remove(&id).ok_or(ApiError::NotFound)?;
    let next = f(current);
    guard.insert(id, next.clone());
    Ok(next)
}

fn ensure_idle(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    let guard = state.store.read();
    let session = guard.get(&id).ok_or(ApiError::NotFound)?;
    if session.is_busy() {
        return Err(ApiError::Busy(SubmitError::Busy));
    }
    Ok(())
}

pub async fn get_options() -> Json<Options> {
    Json(Options::catalogue())
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let id = Uuid::new_v4();
    let session = StudioState::new(id);
    state.store.write().insert(id, session.clone());
    tracing::info!("🆕 Created session {}", id);
    (StatusCode::CREATED, Json(session.into()))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    let session = state.store.read().get(&id).cloned().ok_or(ApiError::NotFound)?;
    Ok(Json(session.into()))
}

pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> StatusCode {
    match state.store.write().remove(&id) {
        Some(_) => {
            tracing::info!("🗑️ Deleted session {}", id);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

pub async fn set_mode(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ModeRequest>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(modify(&state, id, |s| s.with_mode(body.mode))?.into()))
}

pub async fn update_generation(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<GenerationUpdate>,
) -> Result<Json<SessionView>, ApiError> {
    body.validate()?;
    Ok(Json(modify(&state, id, |s| s.with_generation_update(body))?.into()))
}

pub async fn update_thumbnail(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ThumbnailUpdate>,
) -> Result<Json<SessionView>, ApiError> {
    body.validate()?;
    Ok(Json(modify(&state, id, |s| s.with_thumbnail_update(body))?.into()))
}

pub async fn set_edit_prompt(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<EditPromptRequest>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(modify(&state, id, |s| s.with_edit_prompt(body.prompt))?.into()))
}

pub async fn upload_image(
    Path((id, slot)): Path<(Uuid, ImageSlot)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionView>, ApiError> {
    ensure_idle(&state, id)?;
    let declared = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    match reference_image_from_upload(slot, &body, declared) {
        Ok(image) => Ok(Json(modify(&state, id, |s| s.with_image(slot, Some(image)))?.into())),
        Err(e) => {
            tracing::error!("❌ Upload into {:?} failed: {:?}", slot, e);
            modify(&state, id, |s| s.with_error(e.to_string()))?;
            Err(e.into())
        }
    }
}

pub async fn clear_image(
    Path((id, slot)): Path<(Uuid, ImageSlot)>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(modify(&state, id, |s| s.with_image(slot, None))?.into()))
}

pub async fn submit(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let submission = {
        let mut guard = state.store.write();
        let current = guard.remove(&id).ok_or(ApiError::NotFound)?;
        let (next, submission) = current.begin_submit();
        guard.insert(id, next.clone());
        match submission {
            Ok(s) => s,
            Err(SubmitError::Busy) => return Err(ApiError::Busy(SubmitError::Busy)),
            Err(e) => {
                tracing::info!("🚫 Session {} submit rejected: {}", id, e);
                let view: SessionView = next.into();
                return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(view)).into_response());
            }
        }
    };

    tracing::info!("🚀 Session {} dispatching {:?} request", id, submission.mode());

    // Runs detached so a dropped connection still settles the session.
    let task_state = state.clone();
    let task = tokio::spawn(async move {
        let outcome = task_state.dispatcher.dispatch(&submission).await;
        if let Err(e) = &outcome {
            tracing::warn!("⚠️ Session {} {:?} request failed: {}", id, e.operation(), e.cause());
        }
        let mut guard = task_state.store.write();
        let session = guard.remove(&id)?;
        let settled = session.settle(&submission, outcome);
        guard.insert(id, settled.clone());
        Some(settled)
    });

    match task.await {
        Ok(Some(settled)) => Ok(Json(SessionView::from(settled)).into_response()),
        Ok(None) => Err(ApiError::NotFound),
        Err(e) => {
            tracing::error!("❌ Dispatch task for session {} failed: {}", id, e);
            Err(ApiError::Internal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::tests::{image_reply, text_only_reply, MockModel};
    use crate::router;
    use axum::{body::Body, http::Request, Router};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(model: &Arc<MockModel>) -> (Router, AppState) {
        let state = AppState::new(Dispatcher::new(model.clone()));
        (router(state.clone()), state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn upload(app: &Router, id: &str, slot: &str, bytes: &'static [u8], content_type: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/api/sessions/{}/images/{}", id, slot))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(bytes))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = call(app, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn generate_round_trip() {
        let model = MockModel::replying(image_reply());
        let (app, _) = app(&model);
        let id = new_session(&app).await;

        let (status, body) = call(&app, "POST", &format!("/api/sessions/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display"], json!({ "status": "image", "value": "data:image/png;base64,AAAA" }));
        assert_eq!(body["busy"], json!(false));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn edit_without_source_never_calls_model() {
        let model = MockModel::replying(image_reply());
        let (app, _) = app(&model);
        let id = new_session(&app).await;

        call(&app, "PUT", &format!("/api/sessions/{}/mode", id), Some(json!({ "mode": "edit" }))).await;
        let (status, body) = call(&app, "POST", &format!("/api/sessions/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["display"],
            json!({ "status": "error", "value": "Please upload an image and provide an edit prompt." })
        );
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn upload_then_edit() {
        let model = MockModel::replying(image_reply());
        let (app, _) = app(&model);
        let id = new_session(&app).await;

        let (status, body) = upload(&app, &id, "source", b"abc", "image/jpeg").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], json!("edit"));
        assert_eq!(body["display"]["value"], json!("data:image/jpeg;base64,YWJj"));

        call(&app, "PUT", &format!("/api/sessions/{}/edit-prompt", id), Some(json!({ "prompt": "Add a hat" }))).await;
        let (status, body) = call(&app, "POST", &format!("/api/sessions/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["edit"]["source_image"], json!({ "data": "AAAA", "mime_type": "image/png" }));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn failed_request_surfaces_generic_message() {
        let model = MockModel::replying(text_only_reply());
        let (app, _) = app(&model);
        let id = new_session(&app).await;

        let (status, body) = call(&app, "POST", &format!("/api/sessions/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["display"],
            json!({ "status": "error", "value": "Failed to generate image. Please check your prompt and API key." })
        );
        assert_eq!(body["busy"], json!(false));
    }

    #[tokio::test]
    async fn busy_session_rejects_submit_and_upload() {
        let model = MockModel::replying(image_reply());
        let (app, state) = app(&model);
        let id = new_session(&app).await;
        let uuid: Uuid = id.parse().unwrap();
        modify(&state, uuid, |s| s.begin_submit().0).unwrap();

        let (status, _) = call(&app, "POST", &format!("/api/sessions/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = upload(&app, &id, "style-reference", b"abc", "image/png").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_choice_is_bad_request() {
        let model = MockModel::replying(image_reply());
        let (app, _) = app(&model);
        let id = new_session(&app).await;

        let (status, body) = call(
            &app,
            "PATCH",
            &format!("/api/sessions/{}/generation", id),
            Some(json!({ "style": "Crayon" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Unknown style: Crayon"));

        let (status, body) = call(
            &app,
            "PATCH",
            &format!("/api/sessions/{}/generation", id),
            Some(json!({ "style": "Anime", "aspect_ratio": "Square (1:1)" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["generation"]["style"], json!("Anime"));
    }

    #[tokio::test]
    async fn thumbnail_reference_reaches_model() {
        let model = MockModel::replying(image_reply());
        let (app, _) = app(&model);
        let id = new_session(&app).await;

        upload(&app, &id, "thumbnail-reference", b"abc", "image/png").await;
        call(&app, "PUT", &format!("/api/sessions/{}/mode", id), Some(json!({ "mode": "thumbnail" }))).await;
        call(&app, "POST", &format!("/api/sessions/{}/submit", id), None).await;

        let seen = model.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 2);
    }

    #[tokio::test]
    async fn empty_upload_shows_error() {
        let model = MockModel::replying(image_reply());
        let (app, _) = app(&model);
        let id = new_session(&app).await;

        let (status, body) = upload(&app, &id, "character-reference", b"", "image/png").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Failed to read the character reference image file."));
        let (_, view) = call(&app, "GET", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(view["display"]["status"], json!("error"));
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let model = MockModel::replying(image_reply());
        let (app, _) = app(&model);
        let (status, _) = call(&app, "GET", &format!("/api/sessions/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let id = new_session(&app).await;
        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "POST", &format!("/api/sessions/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn options_list_catalogues() {
        let model = MockModel::replying(image_reply());
        let (app, _) = app(&model);
        let (status, body) = call(&app, "GET", "/api/options", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["aspect_ratios"][0], json!("Cinematic (16:9)"));
        assert_eq!(body["thumbnail_styles"].as_array().unwrap().len(), 7);
    }
}
