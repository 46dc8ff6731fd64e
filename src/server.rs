use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::stream;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::attachments::{
    base_name, content_type_for, decode_base64_payload, is_safe_question_id, sanitize_file_name,
};
use crate::config::ServiceSettings;
use crate::providers::ConfigRepository;
use crate::proxy::{
    CHAT_COMPLETIONS_PATH, CaptureMode, ForwardRequest, MODELS_PATH, UpstreamProxy, endpoint,
    is_event_stream, normalize_host, relay,
};
use crate::questions::{
    AttachmentInput, AttachmentLookup, AttachmentStatus, NewQuestion, QuestionRepository,
};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const INVALID_HOST_MESSAGE: &str =
    "Invalid host. Use an absolute http/https URL, e.g. https://api.openai.com or http://127.0.0.1:8080.";

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub providers: Arc<ConfigRepository>,
    pub questions: Arc<QuestionRepository>,
    pub proxy: UpstreamProxy,
    pub static_dir: Option<Arc<PathBuf>>,
}

impl AppState {
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        let providers = ConfigRepository::new(settings.resolve_config_document()?)?;
        let questions = QuestionRepository::new(
            settings.resolve_questions_document()?,
            settings.resolve_attachments_root()?,
        );
        Ok(Self {
            providers: Arc::new(providers),
            questions: Arc::new(questions),
            proxy: UpstreamProxy::new()?,
            static_dir: settings.static_dir.clone().map(Arc::new),
        })
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_response(self.status, json!({ "error": self.message }))
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

fn json_text_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}

fn json_response(status: StatusCode, value: Value) -> Response {
    json_text_response(status, value.to_string())
}

fn ok_json(value: Value) -> Response {
    json_response(StatusCode::OK, value)
}

/// Build the router for the HTTP surface.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/config/get", get(get_config_handler))
        .route("/api/config/set", post(set_config_handler))
        .route("/api/model/list", post(list_models_handler))
        .route("/api/model/test", post(test_model_handler))
        .route(
            "/api/question/list",
            get(list_questions_handler).post(list_questions_handler),
        )
        .route("/api/question/add", post(add_question_handler))
        .route("/api/question/remove", post(remove_question_handler))
        .route("/api/question/file/add", post(add_question_file_handler))
        .route(
            "/api/question/file/remove",
            post(remove_question_file_handler),
        )
        .route("/api/question/file/get", get(get_question_file_handler))
        .route("/api/question/answer/save", post(save_answer_handler))
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(listen = %local, "modelbench listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("modelbench server exited unexpectedly")
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let mime = value.split(';').next().unwrap_or_default().trim();
    mime.eq_ignore_ascii_case("application/json")
        || mime.to_ascii_lowercase().ends_with("+json")
}

fn parse_json_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, ApiError> {
    if !has_json_content_type(headers) {
        return Err(ApiError::unsupported_media_type(
            "Content-Type must be application/json.",
        ));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("Invalid JSON body."))
}

fn parse_json_object(headers: &HeaderMap, body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    match parse_json_body(headers, body)? {
        Value::Object(object) => Ok(object),
        _ => Err(ApiError::bad_request("JSON body must be an object.")),
    }
}

/// Trimmed, non-empty string field.
fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

async fn index_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(static_dir) = state.static_dir.as_ref() else {
        return Err(ApiError::not_found("UI directory is not configured."));
    };
    let path = static_dir.join("index.html");
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
            Ok(response)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Err(ApiError::not_found("index.html not found."))
        }
        Err(err) => {
            error!(error = %err, path = %path.display(), "failed to read UI entry point");
            Err(ApiError::internal(format!("Failed to read index.html. {err}")))
        }
    }
}

async fn fallback_handler() -> ApiError {
    ApiError::not_found("Not found.")
}

async fn get_config_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let text = state.providers.get_or_create().await.map_err(|err| {
        error!(error = %err, "failed to read config document");
        ApiError::internal(format!("Failed to read config. {err:#}"))
    })?;
    Ok(json_text_response(StatusCode::OK, text))
}

async fn set_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let document = parse_json_body(&headers, &body)?;
    if document.is_null() {
        return Err(ApiError::bad_request("Missing JSON body."));
    }

    state.providers.replace(&document).await.map_err(|err| {
        error!(error = %err, "failed to save config document");
        ApiError::internal(format!("Failed to save config. {err:#}"))
    })?;
    Ok(ok_json(json!({ "ok": true })))
}

/// Base URL and credential an upstream call goes to.
struct UpstreamTarget {
    base: Url,
    bearer: Option<String>,
}

/// An explicit `host` wins; otherwise `providerId` selects a configured
/// provider whose api key is injected as a bearer token.
async fn resolve_upstream(
    state: &AppState,
    body: &Map<String, Value>,
) -> Result<UpstreamTarget, ApiError> {
    if let Some(host) = string_field(body, "host") {
        let base = normalize_host(&host).ok_or_else(|| ApiError::bad_request(INVALID_HOST_MESSAGE))?;
        return Ok(UpstreamTarget { base, bearer: None });
    }

    let Some(provider_id) = string_field(body, "providerId") else {
        return Err(ApiError::bad_request("Missing required field: host."));
    };
    let provider = state
        .providers
        .find_provider(&provider_id)
        .await
        .map_err(|err| {
            error!(error = %err, provider = %provider_id, "failed to load providers");
            ApiError::internal(format!("Failed to read config. {err:#}"))
        })?
        .ok_or_else(|| ApiError::not_found(format!("Unknown provider: {provider_id}.")))?;
    let base = normalize_host(provider.host()).ok_or_else(|| ApiError::bad_request(INVALID_HOST_MESSAGE))?;
    Ok(UpstreamTarget {
        base,
        bearer: provider.bearer_token().map(str::to_owned),
    })
}

fn upstream_url(target: &UpstreamTarget, path: &str) -> Result<Url, ApiError> {
    endpoint(&target.base, path).map_err(|err| ApiError::bad_request(format!("{err:#}")))
}

fn upstream_unreachable(err: anyhow::Error, url: &Url) -> ApiError {
    warn!(error = %err, upstream = %url, "upstream request failed");
    let cause = err.root_cause().to_string();
    ApiError::bad_gateway(format!("Failed to reach upstream host. {cause}"))
}

async fn list_models_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let request = parse_json_object(&headers, &body)?;
    let target = resolve_upstream(&state, &request).await?;
    let url = upstream_url(&target, MODELS_PATH)?;

    let response = state
        .proxy
        .forward(ForwardRequest {
            method: Method::GET,
            url: url.clone(),
            headers: &headers,
            body: None,
            bearer: target.bearer.as_deref(),
        })
        .await
        .map_err(|err| upstream_unreachable(err, &url))?;
    info!(upstream = %url, status = %response.status(), "relaying model list");
    Ok(relay(response, CaptureMode::None).response)
}

/// Where a captured answer is stored once the relay finishes.
struct AnswerTarget {
    question_id: String,
    provider_id: String,
    model: String,
}

impl AnswerTarget {
    fn from_request(request: &Map<String, Value>) -> Option<Self> {
        Some(Self {
            question_id: string_field(request, "questionId")?,
            provider_id: string_field(request, "providerId")?,
            model: string_field(request, "model")?,
        })
    }
}

async fn test_model_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let mut request = parse_json_object(&headers, &body)?;
    let target = resolve_upstream(&state, &request).await?;
    let answer_target = AnswerTarget::from_request(&request);
    let stream_requested = request
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    request.remove("host");
    request.remove("questionId");
    request.remove("providerId");
    let payload = serde_json::to_vec(&request).map_err(|err| {
        error!(error = %err, "failed to encode upstream payload");
        ApiError::internal(format!("Failed to encode request. {err}"))
    })?;
    let url = upstream_url(&target, CHAT_COMPLETIONS_PATH)?;

    let response = state
        .proxy
        .forward(ForwardRequest {
            method: Method::POST,
            url: url.clone(),
            headers: &headers,
            body: Some(Bytes::from(payload)),
            bearer: target.bearer.as_deref(),
        })
        .await
        .map_err(|err| upstream_unreachable(err, &url))?;

    let mode = if stream_requested || is_event_stream(response.headers()) {
        CaptureMode::Sse
    } else {
        CaptureMode::Buffered
    };
    info!(
        upstream = %url,
        status = %response.status(),
        stream = stream_requested,
        question = answer_target.as_ref().map(|target| target.question_id.as_str()),
        "relaying chat completion"
    );

    let relayed = relay(response, mode);
    if let Some(answer_target) = answer_target {
        tokio::spawn(persist_answer(
            Arc::clone(&state.questions),
            answer_target,
            relayed.answer,
        ));
    }
    Ok(relayed.response)
}

/// Store the captured answer. Failures are logged and otherwise ignored; the
/// caller already has the relayed response.
async fn persist_answer(
    questions: Arc<QuestionRepository>,
    target: AnswerTarget,
    answer: oneshot::Receiver<Option<String>>,
) {
    let Ok(Some(answer)) = answer.await else {
        debug!(question = %target.question_id, "no answer captured");
        return;
    };
    match questions
        .save_answer(
            &target.question_id,
            &target.provider_id,
            &target.model,
            &answer,
        )
        .await
    {
        Ok(true) => {}
        Ok(false) => debug!(question = %target.question_id, "captured answer had no matching question"),
        Err(err) => warn!(
            error = %err,
            question = %target.question_id,
            provider = %target.provider_id,
            model = %target.model,
            "failed to persist captured answer"
        ),
    }
}

async fn list_questions_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let text = state.questions.list_or_create().await.map_err(|err| {
        error!(error = %err, "failed to read question document");
        ApiError::internal(format!("Failed to read questions. {err:#}"))
    })?;
    Ok(json_text_response(StatusCode::OK, text))
}

fn attachment_inputs(items: &[Value]) -> Result<Vec<AttachmentInput>, ApiError> {
    let mut inputs = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(label) => inputs.push(AttachmentInput::Label(label.clone())),
            Value::Object(object) => {
                let file_name = string_field(object, "fileName").or_else(|| string_field(object, "name"));
                let base64 = string_field(object, "base64");
                match (file_name, base64) {
                    (None, None) => {}
                    (None, Some(_)) => {
                        return Err(ApiError::bad_request("Attachment missing fileName."));
                    }
                    (Some(file_name), None) => inputs.push(AttachmentInput::Label(file_name)),
                    (Some(file_name), Some(payload)) => {
                        if content_type_for(&sanitize_file_name(base_name(&file_name))).is_none() {
                            return Err(ApiError::bad_request(format!(
                                "Unsupported attachment type: {file_name}"
                            )));
                        }
                        let bytes = decode_base64_payload(&payload).map_err(|_| {
                            ApiError::bad_request(format!("Invalid base64 for attachment: {file_name}"))
                        })?;
                        inputs.push(AttachmentInput::Upload { file_name, bytes });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(inputs)
}

async fn add_question_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let request = parse_json_object(&headers, &body)?;
    let (Some(title), Some(content)) = (
        string_field(&request, "title"),
        string_field(&request, "content"),
    ) else {
        return Err(ApiError::bad_request("Missing required fields: title, content."));
    };
    let attachments = match request.get("attachments") {
        Some(Value::Array(items)) => attachment_inputs(items)?,
        _ => Vec::new(),
    };

    let id = state
        .questions
        .add_question(NewQuestion {
            title,
            content,
            answer: string_field(&request, "answer"),
            scoring: string_field(&request, "scoring"),
            attachments,
        })
        .await
        .map_err(|err| {
            error!(error = %err, "failed to add question");
            ApiError::internal(format!("Failed to save question. {err:#}"))
        })?;
    Ok(ok_json(json!({ "ok": true, "id": id })))
}

async fn remove_question_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let request = parse_json_object(&headers, &body)?;
    let Some(id) = string_field(&request, "id") else {
        return Err(ApiError::bad_request("Missing required field: id."));
    };
    if !is_safe_question_id(&id) {
        return Err(ApiError::bad_request("Invalid question id."));
    }

    let outcome = state.questions.remove_question(&id).await.map_err(|err| {
        error!(error = %err, question = %id, "failed to remove question");
        ApiError::internal(format!("Failed to remove question. {err:#}"))
    })?;
    Ok(ok_json(json!({
        "ok": true,
        "removed": outcome.removed,
        "deletedAttachments": outcome.deleted_attachments,
    })))
}

fn attachment_status_error(status: AttachmentStatus) -> Option<ApiError> {
    match status {
        AttachmentStatus::Ok => None,
        AttachmentStatus::InvalidInput => Some(ApiError::bad_request(
            "Invalid question id, file name or unsupported file type.",
        )),
        AttachmentStatus::QuestionListNotFound => {
            Some(ApiError::not_found("Question list not found."))
        }
        AttachmentStatus::QuestionNotFound => Some(ApiError::not_found("Question not found.")),
        AttachmentStatus::InvalidFormat => {
            Some(ApiError::internal("Question list has an invalid format."))
        }
    }
}

async fn add_question_file_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|err| {
        ApiError::unsupported_media_type(format!("Content-Type must be multipart/form-data. {err}"))
    })?;

    let mut question_id: Option<String> = None;
    let mut pending_file: Option<(String, Bytes)> = None;
    let mut outcome = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("Invalid multipart body. {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request(format!("Invalid id field. {err}")))?;
                question_id = Some(text.trim().to_string());
            }
            "file" if outcome.is_none() && pending_file.is_none() => {
                let file_name = field.file_name().unwrap_or_default().trim().to_string();
                if file_name.is_empty() {
                    return Err(ApiError::bad_request("Missing file name."));
                }
                if let Some(id) = question_id.as_deref() {
                    // id arrived first, so the body can stream straight to disk.
                    let added = state
                        .questions
                        .add_attachment(id, &file_name, field)
                        .await
                        .map_err(|err| {
                            error!(error = %err, question = %id, "failed to store attachment");
                            ApiError::internal(format!("Failed to save attachment. {err:#}"))
                        })?;
                    outcome = Some(added);
                } else {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|err| ApiError::bad_request(format!("Invalid file field. {err}")))?;
                    pending_file = Some((file_name, bytes));
                }
            }
            _ => {}
        }
    }

    let Some(question_id) = question_id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::bad_request("Missing required field: id."));
    };
    let outcome = match (outcome, pending_file) {
        (Some(outcome), _) => outcome,
        (None, Some((file_name, bytes))) => {
            let body = stream::iter([Ok::<_, std::io::Error>(bytes)]);
            state
                .questions
                .add_attachment(&question_id, &file_name, body)
                .await
                .map_err(|err| {
                    error!(error = %err, question = %question_id, "failed to store attachment");
                    ApiError::internal(format!("Failed to save attachment. {err:#}"))
                })?
        }
        (None, None) => return Err(ApiError::bad_request("Missing required field: file.")),
    };

    if let Some(err) = attachment_status_error(outcome.status) {
        return Err(err);
    }
    Ok(ok_json(json!({ "ok": true, "fileName": outcome.file_name })))
}

async fn remove_question_file_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let request = parse_json_object(&headers, &body)?;
    let (Some(id), Some(file_name)) = (
        string_field(&request, "id"),
        string_field(&request, "fileName"),
    ) else {
        return Err(ApiError::bad_request("Missing required fields: id, fileName."));
    };

    let removal = state
        .questions
        .remove_attachment(&id, &file_name)
        .await
        .map_err(|err| {
            error!(error = %err, question = %id, file = %file_name, "failed to remove attachment");
            ApiError::internal(format!("Failed to remove attachment. {err:#}"))
        })?;
    if let Some(err) = attachment_status_error(removal.status) {
        return Err(err);
    }
    Ok(ok_json(json!({
        "ok": true,
        "removedFromList": removal.removed_from_list,
        "deletedFile": removal.deleted_file,
    })))
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    #[serde(rename = "questionId", default)]
    question_id: Option<String>,
    #[serde(rename = "fileName", default)]
    file_name: Option<String>,
}

async fn get_question_file_handler(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let question_id = query.question_id.unwrap_or_default();
    let file_name = query.file_name.unwrap_or_default();
    let (question_id, file_name) = (question_id.trim(), file_name.trim());
    if question_id.is_empty() || file_name.is_empty() {
        return Err(ApiError::bad_request("Missing required fields: questionId, fileName."));
    }

    let lookup = state
        .questions
        .open_attachment(question_id, file_name)
        .await
        .map_err(|err| {
            error!(error = %err, question = %question_id, file = %file_name, "failed to read attachment");
            ApiError::internal(format!("Failed to read attachment. {err:#}"))
        })?;
    match lookup {
        AttachmentLookup::Found(stored) => {
            debug!(path = %stored.path.display(), bytes = stored.len, "streaming attachment");
            let mut response = Response::new(Body::from_stream(ReaderStream::new(stored.file)));
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(stored.content_type),
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(stored.len));
            Ok(response)
        }
        AttachmentLookup::InvalidInput => Err(ApiError::bad_request("Invalid questionId or fileName.")),
        AttachmentLookup::UnsupportedType => Err(ApiError::bad_request("Unsupported file type.")),
        AttachmentLookup::NotFound => Err(ApiError::not_found("File not found.")),
    }
}

async fn save_answer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let request = parse_json_object(&headers, &body)?;
    let (Some(question_id), Some(provider_id), Some(model)) = (
        string_field(&request, "questionId"),
        string_field(&request, "providerId"),
        string_field(&request, "model"),
    ) else {
        return Err(ApiError::bad_request(
            "Missing required fields: questionId, providerId, model.",
        ));
    };
    let content = request
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let saved = state
        .questions
        .save_answer(&question_id, &provider_id, &model, content)
        .await
        .map_err(|err| {
            error!(error = %err, question = %question_id, "failed to save answer");
            ApiError::internal(format!("Failed to save answer. {err:#}"))
        })?;
    Ok(ok_json(json!({ "ok": saved })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use futures_util::StreamExt;
    use http_body_util::BodyExt;
    use std::net::SocketAddr;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    use crate::questions::ATTACHMENTS_DIR_NAME;

    struct Harness {
        _dir: TempDir,
        state: AppState,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempdir().expect("temp directory");
            let state = state_in(dir.path(), None);
            Self { _dir: dir, state }
        }

        fn router(&self) -> Router {
            router(self.state.clone(), 1024 * 1024)
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
            let response = self.router().oneshot(request).await.expect("response");
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.into_body().collect().await.expect("body").to_bytes();
            (status, headers, body)
        }

        async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            let request = Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            let (status, _, bytes) = self.send(request).await;
            (status, serde_json::from_slice(&bytes).expect("json body"))
        }

        async fn register_provider(&self, id: &str, addr: SocketAddr) {
            let (status, _) = self
                .post_json(
                    "/api/config/set",
                    json!({ "providers": [{ "id": id, "host": addr.to_string() }] }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        /// Poll the question list until the answer shows up.
        async fn wait_for_answer(&self, question: &str, provider: &str, model: &str) -> Option<Value> {
            for _ in 0..100 {
                let (_, list) = self.get_json("/api/question/list").await;
                let answer = list["data"]
                    .as_array()
                    .and_then(|items| items.iter().find(|item| item["id"] == question))
                    .map(|item| item["answers"][provider][model].clone());
                if let Some(answer) = answer.filter(Value::is_string) {
                    return Some(answer);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            None
        }

        async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
            let request = Request::get(uri).body(Body::empty()).unwrap();
            let (status, _, bytes) = self.send(request).await;
            (status, serde_json::from_slice(&bytes).expect("json body"))
        }
    }

    fn state_in(root: &Path, static_dir: Option<PathBuf>) -> AppState {
        AppState {
            providers: Arc::new(ConfigRepository::new(root.join("config.json")).unwrap()),
            questions: Arc::new(QuestionRepository::new(
                root.join("questions.json"),
                root.join(ATTACHMENTS_DIR_NAME),
            )),
            proxy: UpstreamProxy::new().unwrap(),
            static_dir: static_dir.map(Arc::new),
        }
    }

    async fn spawn_upstream(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    fn multipart_body(boundary: &str, id: Option<&str>, file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(id) = id {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"id\"\r\n\r\n{id}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    fn multipart_request(body: Vec<u8>) -> Request<Body> {
        Request::post("/api/question/file/add")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn add_then_list_includes_question_with_empty_answers() {
        let harness = Harness::new();
        let (status, body) = harness
            .post_json("/api/question/add", json!({ "title": "t", "content": "c" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        let id = body["id"].as_str().expect("id").to_string();
        assert!(id.starts_with("q_"));

        let (status, list) = harness.get_json("/api/question/list").await;
        assert_eq!(status, StatusCode::OK);
        let question = list["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|q| q["id"] == id.as_str())
            .expect("added question");
        assert_eq!(question["answers"], json!({}));
    }

    #[tokio::test]
    async fn list_responds_with_utf8_json_for_get_and_post() {
        let harness = Harness::new();
        for method in [Method::GET, Method::POST] {
            let request = Request::builder()
                .method(method)
                .uri("/api/question/list")
                .body(Body::empty())
                .unwrap();
            let (status, headers, body) = harness.send(request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers[header::CONTENT_TYPE], JSON_CONTENT_TYPE);
            let parsed: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(parsed["data"].as_array().unwrap().len(), 6);
        }
    }

    #[tokio::test]
    async fn request_body_errors_use_the_error_envelope() {
        let harness = Harness::new();

        let request = Request::post("/api/question/add")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _, body) = harness.send(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "Content-Type must be application/json.");

        let request = Request::post("/api/question/add")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ nope"))
            .unwrap();
        let (status, _, body) = harness.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "Invalid JSON body.");

        let (status, body) = harness.post_json("/api/question/add", json!([1, 2])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "JSON body must be an object.");

        let (status, body) = harness
            .post_json("/api/question/add", json!({ "title": "only title" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields: title, content.");
    }

    #[tokio::test]
    async fn config_round_trips_through_get_and_set() {
        let harness = Harness::new();
        let (status, initial) = harness.get_json("/api/config/get").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(initial["providers"], json!([]));

        let document = json!({
            "providers": [{ "id": "p", "host": "http://127.0.0.1:1", "apiKey": "k" }],
            "selectedProviderId": "p",
            "selectedModel": "m",
            "extra": { "kept": true }
        });
        let (status, body) = harness.post_json("/api/config/set", document.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let (_, stored) = harness.get_json("/api/config/get").await;
        assert_eq!(stored, document);

        let (status, body) = harness.post_json("/api/config/set", Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing JSON body.");
    }

    #[tokio::test]
    async fn inline_attachments_are_stored_and_served() {
        let harness = Harness::new();
        let (status, body) = harness
            .post_json(
                "/api/question/add",
                json!({
                    "title": "with files",
                    "content": "see attachment",
                    "attachments": [
                        { "fileName": "notes.txt", "base64": "data:text/plain;base64,aGVsbG8=" },
                        "label-only.png"
                    ]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["id"].as_str().unwrap().to_string();

        let request = Request::get(format!(
            "/api/question/file/get?questionId={id}&fileName=notes.txt"
        ))
        .body(Body::empty())
        .unwrap();
        let (status, headers, bytes) = harness.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(headers[header::CONTENT_LENGTH], "5");
        assert_eq!(&bytes[..], b"hello");

        let (status, body) = harness
            .post_json(
                "/api/question/add",
                json!({
                    "title": "t",
                    "content": "c",
                    "attachments": [{ "fileName": "bad.txt", "base64": "%%%" }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid base64 for attachment: bad.txt");

        let (status, body) = harness
            .post_json(
                "/api/question/add",
                json!({
                    "title": "t",
                    "content": "c",
                    "attachments": [{ "base64": "aGVsbG8=" }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Attachment missing fileName.");
    }

    #[tokio::test]
    async fn multipart_upload_deduplicates_names() {
        let harness = Harness::new();
        let (_, body) = harness
            .post_json("/api/question/add", json!({ "title": "t", "content": "c" }))
            .await;
        let id = body["id"].as_str().unwrap().to_string();

        for expected in ["a.txt", "a_1.txt"] {
            let request = multipart_request(multipart_body(
                "XBOUNDARY",
                Some(&id),
                Some(("a.txt", b"content")),
            ));
            let (status, _, bytes) = harness.send(request).await;
            assert_eq!(status, StatusCode::OK);
            let parsed: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(parsed["fileName"], expected);
        }

        let (_, list) = harness.get_json("/api/question/list").await;
        let question = list["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|q| q["id"] == id.as_str())
            .unwrap()
            .clone();
        assert_eq!(question["attachments"], json!(["a.txt", "a_1.txt"]));
    }

    #[tokio::test]
    async fn multipart_upload_accepts_file_before_id() {
        let harness = Harness::new();
        harness.get_json("/api/question/list").await;

        let boundary = "XBOUNDARY";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"late.md\"\r\n\r\n# title\r\n"
        )
        .into_bytes();
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"id\"\r\n\r\nq_math\r\n--{boundary}--\r\n")
                .as_bytes(),
        );
        let (status, _, bytes) = harness.send(multipart_request(body)).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["fileName"], "late.md");
    }

    #[tokio::test]
    async fn multipart_upload_maps_statuses() {
        let harness = Harness::new();

        let request = multipart_request(multipart_body("XBOUNDARY", Some("q_math"), Some(("a.txt", b"x"))));
        let (status, _, _) = harness.send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        harness.get_json("/api/question/list").await;
        let request = multipart_request(multipart_body("XBOUNDARY", Some("q_none"), Some(("a.txt", b"x"))));
        let (status, _, _) = harness.send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = multipart_request(multipart_body("XBOUNDARY", Some("q_math"), Some(("run.exe", b"x"))));
        let (status, _, _) = harness.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = multipart_request(multipart_body("XBOUNDARY", None, Some(("a.txt", b"x"))));
        let (status, _, bytes) = harness.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["error"], "Missing required field: id.");

        let request = Request::post("/api/question/file/add")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _, _) = harness.send(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn traversal_file_names_are_rejected() {
        let harness = Harness::new();
        harness.get_json("/api/question/list").await;

        let (status, body) = harness
            .post_json(
                "/api/question/file/remove",
                json!({ "id": "q_math", "fileName": "../secret" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = harness
            .get_json("/api/question/file/get?questionId=q_math&fileName=..%2Fsecret")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = harness
            .get_json("/api/question/file/get?questionId=q_math&fileName=missing.txt")
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn remove_question_and_save_answer() {
        let harness = Harness::new();
        harness.get_json("/api/question/list").await;

        let (status, body) = harness
            .post_json(
                "/api/question/answer/save",
                json!({ "questionId": "q_code", "providerId": "p", "model": "m", "content": "done" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let (_, body) = harness
            .post_json(
                "/api/question/answer/save",
                json!({ "questionId": "q_missing", "providerId": "p", "model": "m", "content": "x" }),
            )
            .await;
        assert_eq!(body, json!({ "ok": false }));

        let (status, body) = harness
            .post_json("/api/question/answer/save", json!({ "questionId": "q_code" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields: questionId, providerId, model.");

        let (status, body) = harness
            .post_json("/api/question/remove", json!({ "id": "q_code" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], true);

        let (status, _) = harness
            .post_json("/api/question/remove", json!({ "id": "../x" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn model_routes_validate_hosts_and_providers() {
        let harness = Harness::new();

        let (status, body) = harness.post_json("/api/model/list", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required field: host.");

        let (status, body) = harness
            .post_json("/api/model/list", json!({ "host": "ftp://x" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], INVALID_HOST_MESSAGE);

        let (status, _) = harness
            .post_json("/api/model/test", json!({ "providerId": "ghost", "model": "m" }))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);
        let (status, body) = harness
            .post_json("/api/model/list", json!({ "host": closed.to_string() }))
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("Failed to reach upstream host.")
        );
    }

    #[tokio::test]
    async fn model_list_relays_upstream_response() {
        let upstream = Router::new().route(
            "/v1/models",
            get(|| async { axum::Json(json!({ "data": [{ "id": "m1" }] })) }),
        );
        let addr = spawn_upstream(upstream).await;
        let harness = Harness::new();

        let (status, body) = harness
            .post_json("/api/model/list", json!({ "host": format!("http://{addr}") }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], "m1");
    }

    #[tokio::test]
    async fn streamed_test_call_relays_bytes_and_persists_answer() {
        const STREAM: &str = "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"R\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"C\"}}]}\n\ndata: [DONE]\n\n";

        let upstream = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, body: Bytes| async move {
                let request: Value = serde_json::from_slice(&body).unwrap();
                assert!(request.get("questionId").is_none());
                assert!(request.get("providerId").is_none());
                assert_eq!(request["model"], "m");
                assert_eq!(headers[header::AUTHORIZATION], "Bearer secret");

                let mut response = Response::new(Body::from(STREAM));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/event-stream"),
                );
                response
            }),
        );
        let addr = spawn_upstream(upstream).await;
        let harness = Harness::new();
        harness.get_json("/api/question/list").await;
        harness
            .post_json(
                "/api/config/set",
                json!({ "providers": [{ "id": "p", "host": addr.to_string(), "apiKey": "secret" }] }),
            )
            .await;

        let request = Request::post("/api/model/test")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "providerId": "p",
                    "questionId": "q_math",
                    "model": "m",
                    "stream": true,
                    "messages": [{ "role": "user", "content": "hi" }]
                })
                .to_string(),
            ))
            .unwrap();
        let (status, headers, bytes) = harness.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(&bytes[..], STREAM.as_bytes());

        let expected = "<reasoning_content>\nR\n</reasoning_content>\n\nC";
        assert_eq!(harness.wait_for_answer("q_math", "p", "m").await, Some(json!(expected)));
    }

    #[tokio::test]
    async fn buffered_test_call_persists_message_answer() {
        let upstream = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                axum::Json(json!({
                    "id": "cmpl",
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": "42", "reasoning_content": "R" }
                    }]
                }))
            }),
        );
        let addr = spawn_upstream(upstream).await;
        let harness = Harness::new();
        harness.get_json("/api/question/list").await;
        harness.register_provider("p", addr).await;

        let (status, body) = harness
            .post_json(
                "/api/model/test",
                json!({
                    "providerId": "p",
                    "questionId": "q_code",
                    "model": "m",
                    "messages": [{ "role": "user", "content": "hi" }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["choices"][0]["message"]["content"], "42");

        assert_eq!(
            harness.wait_for_answer("q_code", "p", "m").await,
            Some(json!("<reasoning_content>\nR\n</reasoning_content>\n\n42"))
        );
    }

    #[tokio::test]
    async fn client_disconnect_persists_partial_stream() {
        const FIRST: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n";

        let upstream = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let frames = stream::iter([Ok::<_, std::io::Error>(Bytes::from(FIRST))])
                    .chain(stream::pending());
                let mut response = Response::new(Body::from_stream(frames));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/event-stream"),
                );
                response
            }),
        );
        let addr = spawn_upstream(upstream).await;
        let harness = Harness::new();
        harness.get_json("/api/question/list").await;
        harness.register_provider("p", addr).await;

        let request = Request::post("/api/model/test")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "providerId": "p", "questionId": "q_math", "model": "m", "stream": true })
                    .to_string(),
            ))
            .unwrap();
        let response = harness.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body();
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("first frame in time")
            .expect("frame")
            .expect("frame ok");
        assert_eq!(frame.into_data().unwrap(), Bytes::from(FIRST));
        drop(body);

        assert_eq!(harness.wait_for_answer("q_math", "p", "m").await, Some(json!("He")));
    }

    #[tokio::test]
    async fn index_serves_static_entry_point() {
        let dir = tempdir().unwrap();
        let ui = dir.path().join("ui");
        std::fs::create_dir_all(&ui).unwrap();
        std::fs::write(ui.join("index.html"), "<h1>bench</h1>").unwrap();
        let state = state_in(dir.path(), Some(ui));

        let response = router(state, 1024)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], HTML_CONTENT_TYPE);

        let harness = Harness::new();
        let (status, _) = harness.get_json("/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = harness.get_json("/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found.");
    }
}
