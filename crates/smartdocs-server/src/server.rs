//! HTTP server setup and routing

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use smartdocs_core::grammar::SYSTEM_PROMPT;
use smartdocs_core::{EditorAdapter, MemoryEditor, PromptQuota, Reconciler, interpret_response};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::context::SharedContext;
use crate::documents::{Document, DocumentUpdate, NewDocument};
use crate::error::{Error, Result};
use crate::provider::user_message;

/// Header carrying the id of the authenticated user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller, as identified by the upstream proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| UserId(id.to_string()))
            .ok_or(Error::Unauthenticated)
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<Document>,
}

#[derive(Deserialize)]
struct CompleteRequest {
    prompt: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteResponse {
    xml_content: String,
    user_message: String,
    contains_placeholders: bool,
    quota: PromptQuota,
}

#[derive(Deserialize)]
struct ApplyRequest {
    markup: String,
}

#[derive(Serialize)]
struct ApplyResponse {
    document: Document,
    markers: usize,
    pending: bool,
}

/// Health check endpoint
async fn health(State(ctx): State<SharedContext>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        model: ctx.config().model.clone(),
    })
}

async fn list_documents(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
) -> impl IntoResponse {
    Json(DocumentsResponse {
        documents: ctx.documents().list(&user).await,
    })
}

async fn create_document(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
    Json(request): Json<NewDocument>,
) -> Result<impl IntoResponse> {
    let document = ctx.documents().create(&user, request).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn get_document(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    Ok(Json(ctx.documents().get(&user, &id).await?))
}

async fn update_document(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(update): Json<DocumentUpdate>,
) -> Result<Json<Document>> {
    Ok(Json(ctx.documents().update(&user, &id, update).await?))
}

async fn delete_document(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    ctx.documents().delete(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ask the model for an edit of `content`.
///
/// A prompt is reserved before the model is called and handed back if the
/// call fails, so only answered prompts stay counted.
async fn complete(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>> {
    if request.prompt.trim().is_empty() {
        return Err(Error::BadRequest("prompt must not be empty".to_string()));
    }
    let quota = ctx.usage().reserve(&user).await?;

    let raw = match ctx
        .provider()
        .complete(SYSTEM_PROMPT, &user_message(&request.prompt, &request.content))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(user = %user, error = %e, "Completion failed");
            if let Err(release_err) = ctx.usage().release(&user).await {
                warn!(user = %user, error = %release_err, "Could not release reserved prompt");
            }
            return Err(e);
        }
    };

    let response = interpret_response(&raw);
    if response.contains_placeholders {
        warn!(user = %user, "Model response contained placeholders");
    }
    info!(
        user = %user,
        has_markup = !response.markup.is_empty(),
        remaining = quota.remaining,
        "Completion succeeded"
    );

    Ok(Json(CompleteResponse {
        xml_content: response.markup,
        user_message: response.reply,
        contains_placeholders: response.contains_placeholders,
        quota,
    }))
}

/// Run `action` on a reconciler over the stored document and save the
/// resulting content.
async fn reconcile<T>(
    ctx: &SharedContext,
    user: &str,
    id: &str,
    action: impl FnOnce(&mut Reconciler<MemoryEditor>) -> smartdocs_core::Result<T>,
) -> Result<(Document, T)> {
    let document = ctx.documents().get(user, id).await?;
    let mut reconciler = Reconciler::new(EditorAdapter::new(MemoryEditor::with_content(
        document.content,
    )));
    let output = action(&mut reconciler)?;
    let updated = ctx
        .documents()
        .update(user, id, DocumentUpdate::content(reconciler.content()))
        .await?;
    Ok((updated, output))
}

/// Store the display form of tagged markup as the document content.
async fn apply_markup(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<ApplyResponse>> {
    let (document, outcome) =
        reconcile(&ctx, &user, &id, |reconciler| reconciler.apply(&request.markup)).await?;
    Ok(Json(ApplyResponse {
        document,
        markers: outcome.markers,
        pending: outcome.pending,
    }))
}

async fn finalize_document(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    let (document, _) = reconcile(&ctx, &user, &id, |reconciler| reconciler.finalize()).await?;
    Ok(Json(document))
}

async fn revert_document(
    State(ctx): State<SharedContext>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    let (document, _) = reconcile(&ctx, &user, &id, |reconciler| reconciler.revert()).await?;
    Ok(Json(document))
}

async fn quota(State(ctx): State<SharedContext>, UserId(user): UserId) -> Json<PromptQuota> {
    Json(ctx.usage().quota(&user).await)
}

/// 404 handler
async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Build the axum router
pub fn build_router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/documents", get(list_documents).post(create_document))
        .route(
            "/api/documents/{id}",
            get(get_document)
                .put(update_document)
                .delete(delete_document),
        )
        .route("/api/documents/{id}/apply", post(apply_markup))
        .route("/api/documents/{id}/finalize", post(finalize_document))
        .route("/api/documents/{id}/revert", post(revert_document))
        .route("/api/complete", post(complete))
        .route("/api/quota", get(quota))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Run the SmartDocs server.
///
/// This function blocks until the server is shut down.
pub async fn run_server(ctx: SharedContext) -> Result<()> {
    let addr = format!("{}:{}", ctx.config().host, ctx.config().port);
    let router = build_router(ctx);

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "SmartDocs server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

    Ok(())
}
