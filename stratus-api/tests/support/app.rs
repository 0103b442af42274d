//! In-process application harness for route and relay tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde::de::DeserializeOwned;
use stratus_api::{create_api_router, AppState, ChangeSubscribers, FanoutTargets, RelayConfig};
use stratus_cache::{CacheSettings, LmdbTier, LocalTier, TieredCache};
use stratus_core::{ManualClock, TenantId};
use stratus_test_utils::{
    fixtures, InMemoryStore, RecordingIndexer, RecordingNotifier, RecordingPublisher,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Response bodies are small; anything larger is a bug.
const MAX_BODY: usize = 1024 * 1024;

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub indexer: Arc<RecordingIndexer>,
    pub publisher: Arc<RecordingPublisher>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    _cache_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let cache_dir = TempDir::new().expect("temp dir should be created");
        let clock = Arc::new(ManualClock::new(fixtures::fixed_start()));
        let store = Arc::new(InMemoryStore::new());
        let shared = LmdbTier::open(cache_dir.path(), 16, clock.clone())
            .expect("LMDB tier should open");
        let cache = Arc::new(TieredCache::new(
            Arc::new(LocalTier::new(clock.clone())),
            Arc::new(shared),
            clock.clone(),
            CacheSettings::default(),
        ));

        let indexer = Arc::new(RecordingIndexer::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let targets = FanoutTargets::new(indexer.clone(), publisher.clone(), notifier.clone());

        let state = AppState::assemble(
            store.clone(),
            cache,
            targets,
            Arc::new(stratus_api::BroadcastNotifier::new(16)),
            ChangeSubscribers::standard(),
            clock.clone(),
            RelayConfig::default(),
        );
        let router = create_api_router(&state);

        Self {
            state,
            router,
            store,
            indexer,
            publisher,
            notifier,
            clock,
            _cache_dir: cache_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should not fail")
    }
}

pub fn json_request(
    method: &str,
    uri: &str,
    tenant: Option<TenantId>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(tenant) = tenant {
        builder = builder.header(TENANT_HEADER, tenant.to_string());
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request should build")
}

pub async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), MAX_BODY)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be valid JSON")
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
