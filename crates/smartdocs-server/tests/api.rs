//! Router tests with a scripted completion provider.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use smartdocs_core::quota::QUOTA_EXHAUSTED_MESSAGE;
use smartdocs_core::session::GENERIC_FAILURE_MESSAGE;
use smartdocs_server::{
    AppContext, CompletionProvider, Error, Result, ServerConfig, SharedContext, build_router,
};
use tower::ServiceExt;

/// Returns queued replies in order; fails upstream once they run out.
#[derive(Default)]
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedProvider {
    fn replying(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::default(),
            delay: Duration::ZERO,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, _system: &str, user_message: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user_message.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Upstream("script exhausted".to_string())))
    }
}

struct TestServer {
    router: Router,
    ctx: SharedContext,
    provider: Arc<ScriptedProvider>,
}

impl TestServer {
    fn new(config: ServerConfig, replies: Vec<Result<String>>) -> Self {
        Self::with_provider(config, ScriptedProvider::replying(replies))
    }

    fn with_provider(config: ServerConfig, provider: ScriptedProvider) -> Self {
        let provider = Arc::new(provider);
        let ctx = Arc::new(AppContext::with_provider(config, provider.clone()).unwrap());
        Self {
            router: build_router(ctx.clone()),
            ctx,
            provider,
        }
    }

    async fn send(&self, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header("x-user-id", user);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(&self, user: &str, content: &str) -> String {
        let (status, doc) = self
            .send(
                Method::POST,
                "/api/documents",
                Some(user),
                Some(json!({ "title": "Draft", "content": content })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        doc["id"].as_str().unwrap().to_string()
    }
}

fn reply(markup: &str, message: &str) -> Result<String> {
    Ok(format!("{markup}\n---USER_MESSAGE---\n{message}"))
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let server = TestServer::new(ServerConfig::default(), vec![]);
    let (status, body) = server.send(Method::GET, "/api/documents", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = server.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_document_crud_is_scoped_to_owner() {
    let server = TestServer::new(ServerConfig::default(), vec![]);
    let id = server.create("alice", "<p>hello</p>").await;
    let uri = format!("/api/documents/{id}");

    let (status, doc) = server.send(Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["content"], "<p>hello</p>");
    assert_eq!(doc["pageSize"], "letter");
    assert_eq!(doc["ownerId"], "alice");

    let (status, _) = server.send(Method::GET, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, doc) = server
        .send(Method::PUT, &uri, Some("alice"), Some(json!({ "title": "Final" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["title"], "Final");
    assert_eq!(doc["content"], "<p>hello</p>");

    let (_, list) = server.send(Method::GET, "/api/documents", Some("bob"), None).await;
    assert_eq!(list["documents"].as_array().unwrap().len(), 0);

    let (status, _) = server.send(Method::DELETE, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = server.send(Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_complete_returns_markup_and_counts_usage() {
    let server = TestServer::new(
        ServerConfig::default(),
        vec![reply(
            "<p>The <deletion>quick</deletion><addition>slow</addition> fox</p>",
            "Slowed the fox down.",
        )],
    );

    let (status, body) = server
        .send(
            Method::POST,
            "/api/complete",
            Some("alice"),
            Some(json!({ "prompt": "make it slow", "content": "<p>The quick fox</p>" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["xmlContent"],
        "<p>The <deletion>quick</deletion><addition>slow</addition> fox</p>"
    );
    assert_eq!(body["userMessage"], "Slowed the fox down.");
    assert_eq!(body["containsPlaceholders"], false);
    assert_eq!(body["quota"]["total"], 1);

    let prompts = server.provider.prompts.lock().unwrap().clone();
    assert!(prompts[0].contains("make it slow"));
    assert!(prompts[0].contains("<p>The quick fox</p>"));

    let (_, quota) = server.send(Method::GET, "/api/quota", Some("alice"), None).await;
    assert_eq!(quota["total"], 1);
    assert_eq!(quota["remaining"], 14);
}

#[tokio::test]
async fn test_exhausted_quota_is_rejected_before_the_model_is_called() {
    let config = ServerConfig {
        prompt_limit: 1,
        ..Default::default()
    };
    let server = TestServer::new(config, vec![reply("", "hi"), reply("", "again")]);
    let request = json!({ "prompt": "hello", "content": "" });

    let (status, _) = server
        .send(Method::POST, "/api/complete", Some("alice"), Some(request.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .send(Method::POST, "/api/complete", Some("alice"), Some(request))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], QUOTA_EXHAUSTED_MESSAGE);
    assert_eq!(server.provider.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_the_last_prompt() {
    let config = ServerConfig {
        prompt_limit: 1,
        ..Default::default()
    };
    let provider = ScriptedProvider::replying(vec![reply("", "one"), reply("", "two")])
        .slow(Duration::from_millis(50));
    let server = TestServer::with_provider(config, provider);
    let request = json!({ "prompt": "hello", "content": "" });

    let (first, second) = tokio::join!(
        server.send(Method::POST, "/api/complete", Some("alice"), Some(request.clone())),
        server.send(Method::POST, "/api/complete", Some("alice"), Some(request)),
    );
    let mut statuses = vec![first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);
    assert_eq!(server.provider.prompts.lock().unwrap().len(), 1);
    assert_eq!(server.ctx.usage().quota("alice").await.total, 1);
}

#[tokio::test]
async fn test_premium_users_are_not_limited() {
    let config = ServerConfig {
        prompt_limit: 1,
        premium_users: HashSet::from(["carol".to_string()]),
        ..Default::default()
    };
    let server = TestServer::new(config, vec![reply("", "one"), reply("", "two")]);
    let request = json!({ "prompt": "hello" });

    for _ in 0..2 {
        let (status, body) = server
            .send(Method::POST, "/api/complete", Some("carol"), Some(request.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quota"]["isPremium"], true);
        assert_eq!(body["quota"]["remaining"], 1);
    }
}

#[tokio::test]
async fn test_upstream_failure_is_generic_and_not_counted() {
    let server = TestServer::new(
        ServerConfig::default(),
        vec![Err(Error::Upstream("secret detail".to_string()))],
    );

    let (status, body) = server
        .send(
            Method::POST,
            "/api/complete",
            Some("alice"),
            Some(json!({ "prompt": "hello", "content": "<p>x</p>" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], GENERIC_FAILURE_MESSAGE);
    assert_eq!(server.ctx.usage().quota("alice").await.total, 0);
}

#[tokio::test]
async fn test_empty_prompt_is_a_bad_request() {
    let server = TestServer::new(ServerConfig::default(), vec![]);
    let (status, _) = server
        .send(
            Method::POST,
            "/api/complete",
            Some("alice"),
            Some(json!({ "prompt": "   ", "content": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_apply_then_finalize() {
    let server = TestServer::new(ServerConfig::default(), vec![]);
    let id = server.create("alice", "<p>The quick fox</p>").await;

    let (status, body) = server
        .send(
            Method::POST,
            &format!("/api/documents/{id}/apply"),
            Some("alice"),
            Some(json!({
                "markup": "<p>The <deletion>quick</deletion><addition>slow</addition> fox</p>"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["markers"], 2);
    assert_eq!(body["pending"], true);
    let stored = body["document"]["content"].as_str().unwrap();
    assert!(stored.contains("ai-addition"));
    assert!(stored.contains("ai-deletion"));

    let (status, doc) = server
        .send(Method::POST, &format!("/api/documents/{id}/finalize"), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["content"], "<p>The slow fox</p>");

    let (status, _) = server
        .send(Method::POST, &format!("/api/documents/{id}/finalize"), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_apply_then_revert() {
    let server = TestServer::new(ServerConfig::default(), vec![]);
    let id = server.create("alice", "<p>The quick fox</p>").await;

    server
        .send(
            Method::POST,
            &format!("/api/documents/{id}/apply"),
            Some("alice"),
            Some(json!({
                "markup": "<p>The <deletion>quick</deletion><addition>slow</addition> fox</p>"
            })),
        )
        .await;

    let (status, doc) = server
        .send(Method::POST, &format!("/api/documents/{id}/revert"), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["content"], "<p>The quick fox</p>");

    let (_, doc) = server
        .send(Method::GET, &format!("/api/documents/{id}"), Some("alice"), None)
        .await;
    assert_eq!(doc["content"], "<p>The quick fox</p>");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let server = TestServer::new(ServerConfig::default(), vec![]);
    let (status, _) = server.send(Method::GET, "/nope", Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
