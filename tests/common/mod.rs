#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use study_companion_backend::config::AuthConfig;
use study_companion_backend::create_app;
use study_companion_backend::db::Database;
use study_companion_backend::services::llm_provider::{ChatMessage, LLMError, TextGenerator};
use study_companion_backend::services::youtube::{Transcript, TranscriptError, TranscriptSource};
use study_companion_backend::state::AppState;

/// Generator that replays queued replies, then repeats `fallback`.
pub struct StubGenerator {
    available: bool,
    queued: Mutex<VecDeque<String>>,
    fallback: String,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl StubGenerator {
    pub fn replying(fallback: &str) -> Self {
        Self {
            available: true,
            queued: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::replying("")
        }
    }

    pub fn queue(&self, reply: &str) {
        self.queued.lock().unwrap().push_back(reply.to_string());
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LLMError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let next = self.queued.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

pub struct StubTranscripts;

#[async_trait]
impl TranscriptSource for StubTranscripts {
    async fn fetch(&self, video_id: &str) -> Result<Transcript, TranscriptError> {
        if video_id == "nocaptions0" {
            return Err(TranscriptError::NotAvailable(video_id.to_string()));
        }
        Ok(Transcript {
            text: "Mitochondria produce ATP through cellular respiration.".to_string(),
            duration_seconds: 95.5,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub generator: Arc<StubGenerator>,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(StubGenerator::replying("A helpful answer.")).await
}

pub async fn create_test_app_with(generator: StubGenerator) -> TestApp {
    let db = Database::in_memory().await.unwrap();
    let generator = Arc::new(generator);
    let state = AppState::new(
        db,
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            ..AuthConfig::default()
        },
        generator.clone(),
        Arc::new(StubTranscripts),
    );
    let router = create_app(state, &["http://localhost:3000".to_string()]);
    TestApp { router, generator }
}

impl TestApp {
    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Registers a user and returns its bearer token.
    pub async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "secret123",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["data"]["access_token"].as_str().unwrap().to_string()
    }

    pub async fn create_subject(&self, token: &str, name: &str) -> String {
        let (status, body) = self.post("/api/subjects", token, serde_json::json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED, "create subject failed: {body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }
}
