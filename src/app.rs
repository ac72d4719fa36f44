use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::account::AccountContext;
use crate::config::AppConfig;
use crate::dashboard::{self, StatusMessage, UploadFile};
use crate::docstore::{DocumentStore, MemoryStore};
use crate::error::{ActionError, StoreError};
use crate::jsondb::JsonDirStore;
use crate::normalizer::normalize;
use crate::render::{RenderedField, render_card, render_detail};
use crate::store::{RecordStore, SearchInput, count_records};

pub const LOGIN_REQUIRED: &str = "Please log in";
pub const NO_DATA: &str = "No data available.";

pub struct AppState<S> {
    pub store: S,
    pub config: AppConfig,
}

/// JSON error body: a user-facing status plus the technical detail.
#[derive(Debug)]
pub struct ApiError {
    code: StatusCode,
    status: StatusMessage,
    detail: Option<String>,
}

impl ApiError {
    fn new(code: StatusCode, text: &str) -> Self {
        ApiError {
            code,
            status: StatusMessage::error(text),
            detail: None,
        }
    }

    fn from_action(text: &str, err: ActionError) -> Self {
        let code = match &err {
            ActionError::Decode(_) => StatusCode::BAD_REQUEST,
            ActionError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ActionError::Store(StoreError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            ActionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("{}: {}", text, err);
        ApiError {
            code,
            status: StatusMessage::error(text),
            detail: Some(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": self.status,
            "detail": self.detail,
        });
        (self.code, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct UsernameUpdate {
    username: String,
}

#[derive(Deserialize)]
struct GroupsQuery {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CardGroup {
    file_name: String,
    records: Vec<Vec<RenderedField>>,
}

/// Serve the dashboard API on the configured address
///
/// Uses the JSON directory store under `database_dir`, or an in-memory store
/// when `in_memory` is set.
///
/// # Arguments
/// * `config` - Server settings
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Runs until the server stops or fails
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.in_memory {
        serve(MemoryStore::new(), config).await
    } else {
        let store = JsonDirStore::open(&config.database_dir).await?;
        info!("Using document store at {}", store.root().display());
        serve(store, config).await
    }
}

async fn serve<S: DocumentStore + 'static>(store: S, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", config.bind);
    let app = router(Arc::new(AppState { store, config }));
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the API router. Every route except `/api/health` requires the identity header.
pub fn router<S: DocumentStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/api/account", get(get_account::<S>).put(update_account::<S>))
        .route("/api/files", get(list_files::<S>).post(upload_files::<S>))
        .route(
            "/api/files/:name",
            axum::routing::put(replace_file::<S>).delete(delete_file::<S>),
        )
        .route("/api/groups", get(get_groups::<S>))
        .route("/api/groups/:name/records/:index", get(get_record::<S>))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_account::<S>))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Identity middleware
///
/// The identity provider in front of this service authenticates the user and
/// forwards the account id in the configured header. Requests without it are
/// rejected before reaching any handler.
async fn require_account<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let uid = request
        .headers()
        .get(state.config.identity_header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(str::to_string);

    match uid {
        Some(uid) => {
            request.extensions_mut().insert(AccountContext::new(uid));
            next.run(request).await
        }
        None => ApiError::new(StatusCode::UNAUTHORIZED, LOGIN_REQUIRED).into_response(),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn get_account<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(account): Extension<AccountContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = dashboard::display_name(&state.store, &account)
        .await
        .map_err(|e| ApiError::from_action("Failed to fetch account", e))?;
    Ok(Json(json!({ "uid": account.uid, "displayName": name })))
}

async fn update_account<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(account): Extension<AccountContext>,
    Json(update): Json<UsernameUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let profile = dashboard::update_username(&state.store, &account, &update.username)
        .await
        .map_err(|e| ApiError::from_action(dashboard::ACCOUNT_UPDATE_FAILED, e))?;
    let status = StatusMessage::info("Account updated");
    Ok(Json(json!({ "status": status, "displayName": profile.shown_name() })))
}

async fn list_files<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(account): Extension<AccountContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let files = dashboard::list_files(&state.store, &account)
        .await
        .map_err(|e| ApiError::from_action(dashboard::FETCH_FAILED, e))?;
    Ok(Json(json!({ "files": files })))
}

// Collect every `file` field of a multipart body
async fn read_upload_files(mut multipart: Multipart) -> Result<Vec<UploadFile>, ApiError> {
    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return Err(ApiError::new(StatusCode::BAD_REQUEST, "Malformed upload"));
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload field: {}", e);
            ApiError::new(StatusCode::BAD_REQUEST, "Malformed upload")
        })?;
        files.push(UploadFile::new(name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No file data received"));
    }
    Ok(files)
}

async fn upload_files<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(account): Extension<AccountContext>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let files = read_upload_files(multipart).await?;
    let receipts = dashboard::upload_all(&state.store, &account, &files)
        .await
        .map_err(|e| ApiError::from_action(dashboard::UPLOAD_FAILED, e))?;

    let names: Vec<&str> = receipts.iter().map(|r| r.file_name.as_str()).collect();
    let status = StatusMessage::info(format!("Upload of '{}' complete!", names.join("', '")));
    Ok(Json(json!({ "status": status, "uploads": receipts })))
}

async fn replace_file<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(account): Extension<AccountContext>,
    Path(name): Path<String>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let files = read_upload_files(multipart).await?;
    let replacement = &files[0];
    let listing = dashboard::replace_file(&state.store, &account, &name, replacement)
        .await
        .map_err(|e| ApiError::from_action(dashboard::REPLACE_FAILED, e))?;

    let status = StatusMessage::info(format!("Replaced '{}' with '{}'", name, replacement.name));
    Ok(Json(json!({ "status": status, "files": listing })))
}

async fn delete_file<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(account): Extension<AccountContext>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    dashboard::delete_file(&state.store, &account, &name)
        .await
        .map_err(|e| ApiError::from_action(dashboard::DELETE_FAILED, e))?;
    let status = StatusMessage::info(format!("Deleted '{}'", name));
    Ok(Json(json!({ "status": status })))
}

/// Fetch all groups, apply the committed query `q`, and return classified cards.
async fn get_groups<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(account): Extension<AccountContext>,
    Query(query): Query<GroupsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let groups = dashboard::fetch_groups(&state.store, &account)
        .await
        .map_err(|e| ApiError::from_action(dashboard::FETCH_FAILED, e))?;

    let mut records = RecordStore::new();
    records.load(groups);
    let stored = records.total_records();
    let mut input = SearchInput::default();
    input.set_draft(query.q);
    let visible = records.commit_search(&input);

    let cards: Vec<CardGroup> = visible
        .iter()
        .map(|group| CardGroup {
            file_name: group.file_name.clone(),
            records: group.records.iter().map(render_card).collect(),
        })
        .collect();

    let status = cards.is_empty().then(|| StatusMessage::info(NO_DATA));
    Ok(Json(json!({
        "status": status,
        "totalRecords": count_records(visible),
        "storedRecords": stored,
        "groups": cards,
    })))
}

async fn get_record<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(account): Extension<AccountContext>,
    Path((name, index)): Path<(String, usize)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let batches = state
        .store
        .list_batches(&account, &name)
        .await
        .map_err(|e| ApiError::from_action(dashboard::FETCH_FAILED, e.into()))?;
    let records = normalize(&batches);
    let record = records
        .get(index)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No such record"))?;

    Ok(Json(json!({
        "fileName": name,
        "index": index,
        "fields": render_detail(record),
    })))
}
