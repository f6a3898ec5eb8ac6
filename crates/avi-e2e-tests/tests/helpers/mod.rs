//! Shared test harness for E2E integration tests.
//!
//! Runs the real router, engine manager and lexical classifier over a
//! temporary data directory, with the Gemini planner pointed at a wiremock
//! server.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use avi_intent_kit::EngineManager;
use avi_nlu_api::config::NluConfig;
use avi_nlu_api::routes::build_router;
use avi_nlu_api::state::AppState;
use avi_planner::{GeminiPlanner, PlannerConfig};
use avi_protocol::Language;

/// End-to-end harness: one data directory, one planner mock.
pub struct TestHarness {
    pub dir: TempDir,
    pub planner: MockServer,
    pub state: AppState,
    pub router: Router,
}

impl TestHarness {
    /// Harness with English active and a planner that has an API key.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let planner = MockServer::start().await;
        let (state, router) = build(&dir, &planner);
        Self {
            dir,
            planner,
            state,
            router,
        }
    }

    /// Fresh state over the same data directory, as after a process restart.
    pub fn restart(&mut self) {
        let (state, router) = build(&self.dir, &self.planner);
        self.state = state;
        self.router = router;
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_vec(&json).unwrap()),
            None => Body::empty(),
        };
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    /// POST /intent_recognition/populate
    pub async fn populate(&self, dataset: Value) -> (StatusCode, Value) {
        self.post("/intent_recognition/populate", Some(dataset)).await
    }

    /// POST /intent_recognition/engine?type=..
    pub async fn engine(&self, action: &str) -> (StatusCode, Value) {
        self.post(&format!("/intent_recognition/engine?type={action}"), None)
            .await
    }

    /// GET /intent_recognition/?text=..
    pub async fn recognize(&self, text: &str) -> (StatusCode, Value) {
        self.get(&format!("/intent_recognition/?text={}", encode(text)))
            .await
    }

    /// Populate the home dataset and train English.
    pub async fn trained() -> Self {
        let h = Self::new().await;
        let (status, _) = h.populate(home_dataset("en")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (status, _) = h.engine("train").await;
        assert_eq!(status, StatusCode::OK);
        h
    }

    /// Answer planner calls with `plan`, streamed in two fragments.
    pub async fn mount_plan(&self, plan: Value) {
        let text = plan.to_string();
        let (head, tail) = text.split_at(text.len() / 2);
        let body = json!([
            { "candidates": [{ "content": { "role": "model", "parts": [{ "text": head }] } }] },
            { "candidates": [{ "content": { "role": "model", "parts": [{ "text": tail }] } }] }
        ]);
        Mock::given(method("POST"))
            .and(path_regex(r":streamGenerateContent$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(serde_json::to_string_pretty(&body).unwrap()),
            )
            .mount(&self.planner)
            .await;
    }

    /// Planner calls fail with `status`.
    pub async fn mount_planner_failure(&self, status: u16) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream unavailable"))
            .mount(&self.planner)
            .await;
    }

    pub async fn planner_calls(&self) -> usize {
        self.planner.received_requests().await.unwrap_or_default().len()
    }
}

fn build(dir: &TempDir, planner: &MockServer) -> (AppState, Router) {
    let config = NluConfig {
        data_dir: dir.path().to_path_buf(),
        planner: PlannerConfig {
            base_url: planner.uri(),
            api_key: Some("e2e-key".into()),
            timeout_secs: 5,
            ..PlannerConfig::default()
        },
        ..NluConfig::default()
    };
    let engines = Arc::new(EngineManager::lexical(config.data_dir.clone(), Language::En));
    let planner = Arc::new(GeminiPlanner::new(config.planner.clone()).unwrap());
    let state = AppState::new(engines, planner, &config);
    let router = build_router(state.clone());
    (state, router)
}

/// Percent-encode a query value.
pub fn encode(text: &str) -> String {
    text.bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Small home-automation dataset with one entity and two intents.
pub fn home_dataset(language: &str) -> Value {
    json!({
        "language": language,
        "data": [
            {
                "type": "entity",
                "name": "room",
                "values": [["living room", "lounge"], "kitchen", "bedroom"],
                "automatically_extensible": false
            },
            {
                "type": "intent",
                "name": "turn_on_lights",
                "slots": [{ "name": "room", "entity": "room" }],
                "utterances": [
                    "turn on the lights in the [room](kitchen)",
                    "switch on the [room](living room) lights",
                    "lights on in the [room](bedroom) please"
                ]
            },
            {
                "type": "intent",
                "name": "greet",
                "utterances": ["hello avi", "good morning avi", "hi there"]
            }
        ]
    })
}
