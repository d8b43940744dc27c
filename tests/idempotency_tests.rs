use axum::body::to_bytes;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use idempotency_service::error::{AppError, BoxError};
use idempotency_service::idempotency::{
    CacheKey, FingerprintGenerator, IdempotencyHandler, IdempotencyHandlerConfig, IdempotencyStore,
    Outcome, RequestContext, RequestDigest,
};
use serde_json::json;
use std::error::Error as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const PAYMENTS: &str = "/api/payments";

fn handler() -> (Arc<IdempotencyHandler>, Arc<IdempotencyStore>) {
    let store = Arc::new(IdempotencyStore::new());
    let handler = IdempotencyHandler::new(Arc::clone(&store), IdempotencyHandlerConfig::default());
    (Arc::new(handler), store)
}

async fn body_of(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body")
        .to_vec()
}

/// Runs a POST whose operation bumps `calls` and echoes the call count.
async fn post(
    handler: &IdempotencyHandler,
    token: Option<&str>,
    payload: &serde_json::Value,
    calls: &AtomicUsize,
) -> Result<Response, AppError> {
    handler
        .handle(RequestContext::new(&Method::POST, PAYMENTS, token, payload), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Outcome::ok(&json!({ "call": n, "payload": payload }))
        })
        .await
}

struct UnavailableDigest;

impl RequestDigest for UnavailableDigest {
    fn algorithm(&self) -> &'static str {
        "unavailable"
    }

    fn digest(&self, _input: &[u8]) -> Result<Vec<u8>, BoxError> {
        Err("No algorithm".into())
    }
}

#[tokio::test]
async fn test_missing_token_never_invokes_operation() {
    let (handler, store) = handler();
    let calls = AtomicUsize::new(0);
    let payload = json!([{"amount": 40.0, "currency": "SMS"}]);

    for token in [None, Some("")] {
        let result = post(&handler, token, &payload, &calls).await;
        assert!(matches!(result, Err(AppError::MissingIdempotencyKey)));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.is_empty());
    assert_eq!(handler.metrics().snapshot().rejected_requests, 2);
}

#[tokio::test]
async fn test_replay_is_byte_identical() {
    let (handler, store) = handler();
    let calls = AtomicUsize::new(0);
    let payload = json!([{"amount": 40.0, "currency": "SMS"}]);

    let first = assert_ok!(post(&handler, Some("unique-key-123"), &payload, &calls).await);
    let second = assert_ok!(post(&handler, Some("unique-key-123"), &payload, &calls).await);

    assert_eq!(first.status(), second.status());
    assert_eq!(first.headers(), second.headers());
    assert_eq!(body_of(first).await, body_of(second).await);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.len(), 1);

    let snapshot = handler.metrics().snapshot();
    assert_eq!(snapshot.new_requests, 1);
    assert_eq!(snapshot.duplicate_requests, 1);
}

#[tokio::test]
async fn test_conflicting_payload_is_rejected_without_invocation() {
    let (handler, store) = handler();
    let calls = AtomicUsize::new(0);
    let original = json!([{"amount": 50.0, "currency": "SMS"}]);
    let changed = json!([{"amount": 55.0, "currency": "DDD"}]);

    let first = assert_ok!(post(&handler, Some("unique-key-124"), &original, &calls).await);
    let original_body = body_of(first).await;

    let conflict = post(&handler, Some("unique-key-124"), &changed, &calls).await;
    assert!(matches!(conflict, Err(AppError::IdempotencyConflict)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let key = assert_ok!(CacheKey::derive(&Method::POST, PAYMENTS, Some("unique-key-124")));
    let stored = store.get(&key).expect("original response should stay recorded");
    assert_eq!(stored.body.to_vec(), original_body);
}

#[tokio::test]
async fn test_distinct_tokens_execute_independently() {
    let (handler, store) = handler();
    let calls = AtomicUsize::new(0);
    let payload = json!([{"amount": 60.0, "currency": "SMS"}]);

    assert_ok!(post(&handler, Some("unique-key-125"), &payload, &calls).await);
    assert_ok!(post(&handler, Some("unique-key-126"), &payload, &calls).await);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_reordered_keys_replay_instead_of_conflict() {
    let (handler, _store) = handler();
    let calls = AtomicUsize::new(0);
    let first = json!({"amount": 40.0, "currency": "SMS"});
    let reordered: serde_json::Value = serde_json::from_str(r#"{"currency":"SMS","amount":40.0}"#).unwrap();

    assert_ok!(post(&handler, Some("ordering"), &first, &calls).await);
    assert_ok!(post(&handler, Some("ordering"), &reordered, &calls).await);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ineligible_verb_bypasses_store() {
    let (handler, store) = handler();
    let calls = AtomicUsize::new(0);

    for token in [None, Some("ignored")] {
        let response = handler
            .handle(RequestContext::new(&Method::GET, PAYMENTS, token, &()), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Outcome::ok(&json!([]))
            })
            .await;
        assert_eq!(assert_ok!(response).status(), StatusCode::OK);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(store.is_empty());
    assert_eq!(handler.metrics().snapshot().bypassed_requests, 2);
}

#[tokio::test]
async fn test_pass_through_outcome_is_not_recorded() {
    let (handler, store) = handler();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let response = handler
            .handle(RequestContext::new(&Method::POST, PAYMENTS, Some("stream"), &"payload"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome::PassThrough(StatusCode::ACCEPTED.into_response()))
            })
            .await;
        assert_eq!(assert_ok!(response).status(), StatusCode::ACCEPTED);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(store.is_empty());
    assert_eq!(handler.metrics().snapshot().uncached_requests, 2);
}

#[tokio::test]
async fn test_operation_error_propagates_and_is_not_recorded() {
    let (handler, store) = handler();
    let calls = AtomicUsize::new(0);

    let failed = handler
        .handle(RequestContext::new(&Method::PATCH, "/api/payments/1", Some("k"), &"payload"), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<Outcome, _>(AppError::NotFound("Payment not found".to_string()))
        })
        .await;
    assert!(matches!(failed, Err(AppError::NotFound(_))));
    assert!(store.is_empty());

    // A retry with the same key executes again.
    let retried = handler
        .handle(RequestContext::new(&Method::PATCH, "/api/payments/1", Some("k"), &"payload"), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Outcome::ok(&json!({"id": "1"}))
        })
        .await;
    assert_ok!(retried);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.len(), 1);
    assert_eq!(handler.metrics().snapshot().failed_requests, 1);
}

#[tokio::test]
async fn test_fingerprint_failure_surfaces_cause() {
    let store = Arc::new(IdempotencyStore::new());
    let handler = IdempotencyHandler::new(Arc::clone(&store), IdempotencyHandlerConfig::default())
        .with_fingerprint_generator(FingerprintGenerator::new(Arc::new(UnavailableDigest)));
    let calls = AtomicUsize::new(0);
    let payload = json!([{"amount": 40.0, "currency": "SMS"}]);

    let error = assert_err!(post(&handler, Some("digest-down"), &payload, &calls).await);
    assert!(matches!(error, AppError::Fingerprint { .. }));
    assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let cause = error.source().expect("fingerprint error should carry its cause");
    assert_eq!(cause.to_string(), "No algorithm");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_concurrent_first_attempts_execute_once() {
    let (handler, store) = handler();
    let calls = Arc::new(AtomicUsize::new(0));
    let payload = json!([{"amount": 40.0, "currency": "SMS"}]);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let handler = Arc::clone(&handler);
        let calls = Arc::clone(&calls);
        let payload = payload.clone();
        tasks.push(tokio::spawn(async move {
            let response = post(&handler, Some("race"), &payload, &calls)
                .await
                .expect("request should succeed");
            body_of(response).await
        }));
    }

    let mut bodies = Vec::new();
    for task in tasks {
        bodies.push(task.await.expect("task panicked"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(bodies.iter().all(|b| b == &bodies[0]));
    assert_eq!(store.len(), 1);
}
