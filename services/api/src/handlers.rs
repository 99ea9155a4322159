//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for companions,
//! subjects and session history. It uses `utoipa` doc comments to generate
//! OpenAPI documentation.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use companion_core::{
    auth::CallerIdentity,
    companion::{Subject, ValidationIssue},
    listing::{ALL_SUBJECTS, DEFAULT_PAGE, ListingQuery},
    service::CompanionError,
};
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{
        Companion, CreateCompanionPayload, ErrorResponse, HistoryParams, ListCompanionsParams,
        SessionHistoryEntry, SubjectOption,
    },
    state::AppState,
};

pub const USER_ID_HEADER: &str = "x-user-id";

pub enum ApiError {
    BadRequest(String, Vec<ValidationIssue>),
    NotFound(String),
    Unprocessable(String, Vec<ValidationIssue>),
    InternalServerError(anyhow::Error),
}

fn error_body(message: String, issues: Vec<ValidationIssue>) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        message,
        issues: issues.into_iter().map(Into::into).collect(),
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message, issues) => {
                (StatusCode::BAD_REQUEST, error_body(message, issues)).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::Unprocessable(message, issues) => {
                (StatusCode::UNPROCESSABLE_ENTITY, error_body(message, issues)).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(message)),
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<CompanionError> for ApiError {
    fn from(err: CompanionError) -> Self {
        match err {
            CompanionError::Validation { issues } => {
                Self::Unprocessable("Companion record is corrupt".to_string(), issues)
            }
            other => Self::InternalServerError(other.into()),
        }
    }
}

/// The caller's identity as forwarded by the auth gateway.
pub fn caller_identity(headers: &HeaderMap) -> CallerIdentity {
    CallerIdentity(
        headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    )
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Create a new companion authored by the caller.
#[utoipa::path(
    post,
    path = "/companions",
    request_body = CreateCompanionPayload,
    responses(
        (status = 201, description = "Companion created successfully", body = Companion),
        (status = 400, description = "Invalid companion form", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = Option<String>, Header, description = "The ID of the user creating the companion")
    )
)]
pub async fn create_companion(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateCompanionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = payload
        .into_new_companion()
        .map_err(|issues| ApiError::BadRequest("Invalid companion".to_string(), issues))?;

    let record = state
        .service
        .create_companion(&caller_identity(&headers), fields)
        .await?;

    Ok((StatusCode::CREATED, Json(Companion::from(record))))
}

/// List companions, filtered by subject and topic, one page at a time.
#[utoipa::path(
    get,
    path = "/companions",
    responses(
        (status = 200, description = "Page of companions", body = [Companion]),
        (status = 400, description = "Invalid page or limit", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(ListCompanionsParams)
)]
pub async fn list_companions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListCompanionsParams>,
) -> Result<Json<Vec<Companion>>, ApiError> {
    let query = ListingQuery::new(
        params.limit.unwrap_or(state.config.default_page_size),
        params.page.unwrap_or(DEFAULT_PAGE),
        params.subject,
        params.topic,
    )
    .map_err(|issue| ApiError::BadRequest("Invalid listing query".to_string(), vec![issue]))?;

    let companions = state.service.list_companions(&query).await?;
    Ok(Json(companions.into_iter().map(Companion::from).collect()))
}

/// Get a specific companion by its ID.
#[utoipa::path(
    get,
    path = "/companions/{id}",
    responses(
        (status = 200, description = "Companion details", body = Companion),
        (status = 404, description = "Companion not found", body = ErrorResponse),
        (status = 422, description = "Stored companion is corrupt", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Companion ID")
    )
)]
pub async fn get_companion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Companion>, ApiError> {
    let record = state
        .service
        .get_companion(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Companion with id '{}' not found", id)))?;

    Ok(Json(Companion::from(record)))
}

/// The options of the subject filter, `all` first.
#[utoipa::path(
    get,
    path = "/subjects",
    responses(
        (status = 200, description = "Subject filter options", body = [SubjectOption])
    )
)]
pub async fn list_subjects(State(state): State<Arc<AppState>>) -> Json<Vec<SubjectOption>> {
    let subjects = state.service.list_subjects().iter().map(Subject::as_str);
    let options = std::iter::once(ALL_SUBJECTS)
        .chain(subjects)
        .map(|value| SubjectOption {
            value: value.to_string(),
            label: capitalize(value),
        })
        .collect();
    Json(options)
}

/// The caller's most recent sessions, newest first.
#[utoipa::path(
    get,
    path = "/history",
    responses(
        (status = 200, description = "Recent sessions", body = [SessionHistoryEntry]),
        (status = 400, description = "Missing caller identity", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        HistoryParams,
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn recent_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SessionHistoryEntry>>, ApiError> {
    let CallerIdentity(Some(user_id)) = caller_identity(&headers) else {
        return Err(ApiError::BadRequest(
            "x-user-id header is required".to_string(),
            Vec::new(),
        ));
    };
    let limit = params.limit.unwrap_or(state.config.history_limit);

    let sessions = state.history.recent_sessions(&user_id, limit).await?;
    Ok(Json(sessions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, router::create_router};
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
    };
    use chrono::Utc;
    use companion_core::{companion::CompanionRecord, store::InMemoryStore};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app(store: Arc<InMemoryStore>) -> Router {
        create_router(Arc::new(AppState::in_memory(Config::default(), store)))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_companion(body: Value, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/companions")
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn record(name: &str, subject: &str, topic: &str) -> CompanionRecord {
        CompanionRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            name: name.to_string(),
            subject: subject.to_string(),
            topic: topic.to_string(),
            style: "casual".to_string(),
            duration: 15,
            author: "user_1".to_string(),
        }
    }

    fn form() -> Value {
        json!({
            "name": "Countsy",
            "subject": "maths",
            "topic": "Derivatives",
            "voice": "male",
            "style": "casual",
            "duration": "30"
        })
    }

    #[tokio::test]
    async fn test_create_companion_sets_author() {
        let store = Arc::new(InMemoryStore::new());
        let (status, body) = send(app(store.clone()), post_companion(form(), Some("user_1"))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["author"], "user_1");
        assert_eq!(body["duration"], 30);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_companion_rejects_invalid_form() {
        let store = Arc::new(InMemoryStore::new());
        let mut payload = form();
        payload["name"] = json!("");
        let (status, body) = send(app(store.clone()), post_companion(payload, Some("u"))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["issues"][0]["path"], "name");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_companion_without_identity_fails_in_store() {
        let store = Arc::new(InMemoryStore::new());
        let (status, body) = send(app(store.clone()), post_companion(form(), None)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "An internal server error occurred.");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_companions_filters_and_pages() {
        let store = Arc::new(InMemoryStore::new());
        for r in [
            record("Countsy", "maths", "Derivatives"),
            record("Neura", "science", "The Brain"),
            record("Calcy", "maths", "Integrals"),
        ] {
            store.seed(&r).await.unwrap();
        }

        let (status, body) = send(app(store.clone()), get("/companions?subject=MATHS")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = send(app(store.clone()), get("/companions?subject=all&topic=brain")).await;
        assert_eq!(body[0]["name"], "Neura");

        let (_, body) = send(app(store.clone()), get("/companions?limit=2&page=2")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["name"], "Calcy");
    }

    #[tokio::test]
    async fn test_list_companions_rejects_page_zero() {
        let store = Arc::new(InMemoryStore::new());
        let (status, body) = send(app(store), get("/companions?page=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["issues"][0]["path"], "page");
    }

    #[tokio::test]
    async fn test_get_companion_found_missing_and_corrupt() {
        let store = Arc::new(InMemoryStore::new());
        let existing = record("Verba", "language", "Poetry");
        store.seed(&existing).await.unwrap();
        store
            .seed_raw(json!({ "id": "corrupt-1", "name": "Broken" }))
            .await;

        let (status, body) = send(app(store.clone()), get(&format!("/companions/{}", existing.id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Verba");

        let (status, _) = send(app(store.clone()), get("/companions/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app(store.clone()), get("/companions/corrupt-1")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!body["issues"].as_array().unwrap().is_empty());

        let (status, body) = send(app(store), get("/companions")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_subjects_all_first() {
        let (status, body) = send(app(Arc::new(InMemoryStore::new())), get("/subjects")).await;
        assert_eq!(status, StatusCode::OK);
        let options = body.as_array().unwrap();
        assert_eq!(options.len(), 10);
        assert_eq!(options[0], json!({ "value": "all", "label": "All" }));
        assert_eq!(options[1], json!({ "value": "maths", "label": "Maths" }));
    }

    #[tokio::test]
    async fn test_recent_sessions_requires_caller() {
        let store = Arc::new(InMemoryStore::new());
        let (status, _) = send(app(store.clone()), get("/history")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .uri("/history?limit=5")
            .header(USER_ID_HEADER, "user_1")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(store), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[test]
    fn test_caller_identity_from_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_identity(&headers), CallerIdentity::anonymous());
        headers.insert(USER_ID_HEADER, "user_9".parse().unwrap());
        assert_eq!(caller_identity(&headers), CallerIdentity::user("user_9"));
    }
}
