// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use trustfeed::broker::{MemoryBroker, SharedBroker};
use trustfeed::config::DashboardConfig;
use trustfeed::dashboard::{api, DashboardService};
use trustfeed::Producer;

#[tokio::test]
async fn metrics_endpoint_contains_pipeline_series() {
    let prom = trustfeed::metrics::install().expect("recorder installs once per process");
    // second install hands back the same recorder
    assert!(trustfeed::metrics::install().is_ok());

    // produce some traffic so the series carry values
    let broker: SharedBroker = Arc::new(MemoryBroker::new());
    let producer = Producer::new(broker, "news_articles", "unused");
    producer
        .publish(&[json!({"title": "a"}), json!("not an object")])
        .await;

    let svc = DashboardService::start(
        &DashboardConfig {
            demo: false,
            tail_stream: false,
            ..DashboardConfig::default()
        },
        None,
    );
    let client = svc.handle().subscribe().await.unwrap();

    let resp = api::router(svc.handle(), Some(prom))
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap(); // 1 MiB
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "producer_published_total 1",
        "producer_errors_total 1",
        "dashboard_clients 1",
    ] {
        assert!(text.contains(needle), "missing `{needle}` in:\n{text}");
    }

    drop(client);
    svc.shutdown().await;
}
