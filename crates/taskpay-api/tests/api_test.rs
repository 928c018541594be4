use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use taskpay_api::{create_router, ApiState};
use taskpay_core::{
    InMemoryStore, PaymentEngine, PaymentStatus, PaymentStore, Profile, ProviderKind,
    ProviderRegistry, Task, TaskStatus,
};
use taskpay_providers::{
    webhook, AirwallexConfig, AirwallexProvider, StripeConfig, StripeProvider,
};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_test";

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    task: Task,
}

async fn setup(stripe_url: &str) -> TestApp {
    let stripe = StripeProvider::new(StripeConfig {
        secret_key: "sk_test_123".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        base_url: stripe_url.to_string(),
        success_url: "http://localhost/ok".to_string(),
        cancel_url: "http://localhost/cancel".to_string(),
        webhook_tolerance_secs: 300,
    });
    let registry = ProviderRegistry::new(ProviderKind::Stripe).with(Arc::new(stripe));

    let store = Arc::new(InMemoryStore::new());
    let mut helper = Profile::new("helper-1".to_string(), "Helper".to_string());
    helper.stripe_account_id = Some("acct_helper".to_string());
    store.save_profile(&helper).await.unwrap();

    let task = Task::new(
        "Assemble bookshelf".to_string(),
        "tasker-1".to_string(),
        dec!(80.00),
        "AUD".to_string(),
    )
    .assign("helper-1".to_string());
    store.save_task(&task).await.unwrap();

    let engine = PaymentEngine::new(registry, store.clone());
    let state = ApiState {
        engine: Arc::new(engine),
        airwallex: None,
        currency: "AUD".to_string(),
    };

    TestApp {
        router: create_router(state),
        store,
        task,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn stripe_webhook(body: &str, secret: &str) -> Request<Body> {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = webhook::sign(
        secret,
        &[format!("{}.", timestamp).as_bytes(), body.as_bytes()],
    )
    .unwrap();

    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("stripe-signature", format!("t={},v1={}", timestamp, signature))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn session_completed(event_id: &str, task_id: &str) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {"object": {"id": "cs_test_1", "metadata": {"task_id": task_id}}}
    })
    .to_string()
}

#[tokio::test]
async fn test_health_and_provider() {
    let app = setup("http://unused").await;

    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app.router, get("/api/payments/provider")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "stripe");
    assert_eq!(body["configured"], json!(["stripe"]));
}

#[tokio::test]
async fn test_quote() {
    let app = setup("http://unused").await;

    let (status, body) = send(&app.router, get("/api/payments/quote?amount=80")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currency"], "AUD");
    assert_eq!(body["platform_fee"], "8.00");
    assert_eq!(body["net"], "72.00");

    let (status, body) = send(&app.router, get("/api/payments/quote?amount=lots")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_checkout_records_reference() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/checkout/sessions")
        .with_status(200)
        .with_body(
            r#"{"id":"cs_test_1","url":"https://checkout.stripe.com/c/pay/cs_test_1",
                "status":"open","payment_status":"unpaid"}"#,
        )
        .create_async()
        .await;

    let app = setup(&server.url()).await;
    let (status, body) = send(
        &app.router,
        post_json("/api/payments/checkout", json!({"task_id": app.task.id})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "stripe");
    assert_eq!(body["reference"], "cs_test_1");

    let task = app.store.get_task(&app.task.id).await.unwrap().unwrap();
    assert_eq!(task.payment_reference.as_deref(), Some("cs_test_1"));
    assert_eq!(task.payment_provider, Some(ProviderKind::Stripe));
}

#[tokio::test]
async fn test_signed_webhook_marks_task_paid() {
    let app = setup("http://unused").await;
    let body = session_completed("evt_1", &app.task.id);

    let (status, response) = send(&app.router, stripe_webhook(&body, WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"received": true}));

    let task = app.store.get_task(&app.task.id).await.unwrap().unwrap();
    assert_eq!(task.payment_status, PaymentStatus::Paid);
    assert_eq!(task.status, TaskStatus::InProgress);

    // Redelivery is acknowledged without reprocessing
    let (status, _) = send(&app.router, stripe_webhook(&body, WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_rejections() {
    let app = setup("http://unused").await;
    let body = session_completed("evt_1", &app.task.id);

    let (status, response) = send(&app.router, stripe_webhook(&body, "whsec_wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "invalid_signature");

    let task = app.store.get_task(&app.task.id).await.unwrap().unwrap();
    assert_eq!(task.payment_status, PaymentStatus::Unpaid);

    let (status, _) = send(&app.router, stripe_webhook("{not json", WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, post_json("/webhooks/paypal", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_event_is_acknowledged() {
    let app = setup("http://unused").await;
    let body = json!({"id": "evt_9", "type": "customer.created", "data": {"object": {}}}).to_string();

    let (status, response) = send(&app.router, stripe_webhook(&body, WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["received"], true);
}

#[tokio::test]
async fn test_payout_requires_payment() {
    let app = setup("http://unused").await;

    let (status, body) = send(
        &app.router,
        post_json("/api/payments/create-payout", json!({"task_id": app.task.id})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");

    let (status, _) = send(&app.router, get(&format!("/api/payouts/{}", app.task.id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, get("/api/payouts/missing-task")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_simulated_payment_then_payout() {
    let mut server = mockito::Server::new_async().await;
    let transfer = server
        .mock("POST", "/v1/transfers")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("amount".into(), "7200".into()),
            mockito::Matcher::UrlEncoded("destination".into(), "acct_helper".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"id":"tr_1","reversed":false}"#)
        .create_async()
        .await;

    let app = setup(&server.url()).await;

    let (status, body) = send(
        &app.router,
        post_json("/api/airwallex/simulate-payment", json!({"task_id": app.task.id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "paid");

    let (status, body) = send(
        &app.router,
        post_json("/api/payments/create-payout", json!({"task_id": app.task.id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["net_amount"], "72.00");
    assert_eq!(body["platform_fee"], "8.00");
    transfer.assert_async().await;

    let (status, body) = send(&app.router, get(&format!("/api/payouts/{}", app.task.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider_reference"], "tr_1");

    let (status, body) = send(&app.router, get("/api/payments/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paid_tasks"], 1);
    assert_eq!(body["payouts_completed"], 1);
    assert_eq!(body["total_platform_fees"], "8.00");
}

async fn airwallex_app() -> TestApp {
    let airwallex = Arc::new(AirwallexProvider::new(AirwallexConfig {
        client_id: "client".to_string(),
        api_key: "key".to_string(),
        webhook_secret: "awx_secret".to_string(),
        base_url: "http://api-demo.localhost/api/v1".to_string(),
        return_url: "http://localhost/ok".to_string(),
        source_currency: None,
        webhook_tolerance_secs: 300,
    }));
    let registry = ProviderRegistry::new(ProviderKind::Airwallex).with(airwallex.clone());

    let store = Arc::new(InMemoryStore::new());
    let task = Task::new(
        "Hang shelves".to_string(),
        "tasker-1".to_string(),
        dec!(120.00),
        "AUD".to_string(),
    )
    .assign("helper-1".to_string());
    store.save_task(&task).await.unwrap();

    let state = ApiState {
        engine: Arc::new(PaymentEngine::new(registry, store.clone())),
        airwallex: Some(airwallex),
        currency: "AUD".to_string(),
    };

    TestApp {
        router: create_router(state),
        store,
        task,
    }
}

fn airwallex_webhook(body: &str) -> Request<Body> {
    let timestamp = chrono::Utc::now().timestamp_millis().to_string();
    let signature = webhook::sign("awx_secret", &[timestamp.as_bytes(), body.as_bytes()]).unwrap();

    Request::builder()
        .method("POST")
        .uri("/webhooks/airwallex")
        .header("x-timestamp", timestamp)
        .header("x-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_airwallex_simulated_payment() {
    let app = airwallex_app().await;

    let (status, body) = send(
        &app.router,
        post_json("/api/airwallex/simulate-payment", json!({"task_id": app.task.id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "paid");
    assert_eq!(body["status"], "in_progress");

    let task = app.store.get_task(&app.task.id).await.unwrap().unwrap();
    assert_eq!(task.payment_status, PaymentStatus::Paid);
    assert_eq!(task.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_airwallex_refund_resolves_through_intent() {
    let app = airwallex_app().await;
    app.store
        .set_payment_reference(&app.task.id, ProviderKind::Airwallex, "int_1")
        .await
        .unwrap();
    send(
        &app.router,
        post_json("/api/airwallex/simulate-payment", json!({"task_id": app.task.id})),
    )
    .await;

    let refund = json!({
        "id": "evt_refund_1",
        "name": "refund.succeeded",
        "data": {"object": {"id": "rfd_1", "payment_intent_id": "int_1"}}
    })
    .to_string();
    let (status, _) = send(&app.router, airwallex_webhook(&refund)).await;
    assert_eq!(status, StatusCode::OK);

    let task = app.store.get_task(&app.task.id).await.unwrap().unwrap();
    assert_eq!(task.payment_status, PaymentStatus::Refunded);
    assert_eq!(task.status, TaskStatus::Cancelled);
}
