use std::convert::Infallible;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use super::state::{DashboardArticle, DashboardStats, TrustHistogram};
use super::DashboardHandle;

const INDEX_HTML: &str = include_str!("../../assets/dashboard.html");

#[derive(Clone)]
pub struct AppState {
    pub dashboard: DashboardHandle,
}

/// Dashboard routes; `/metrics` is merged in when a recorder handle is given.
pub fn router(dashboard: DashboardHandle, metrics: Option<PrometheusHandle>) -> Router {
    let state = AppState { dashboard };
    let app = Router::new()
        .route("/", get(index))
        .route("/events", get(events))
        .route("/api/data", get(data))
        .route("/ping", get(ping))
        .route("/health", get(|| async { "ok" }))
        .layer(CorsLayer::very_permissive())
        .with_state(state);

    match metrics {
        Some(handle) => app.merge(crate::metrics::router(handle)),
        None => app,
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// One registered client per request; `init` first, then `update`s.
async fn events(State(state): State<AppState>) -> Response {
    match state.dashboard.subscribe().await {
        Ok(client) => {
            tracing::debug!(target: "dashboard", client = client.id(), "sse stream opened");
            let stream = client.map(|ev| Ok::<SseEvent, Infallible>(ev.to_sse()));
            Sse::new(stream)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataResp {
    articles: Vec<DashboardArticle>,
    sources: std::collections::BTreeMap<String, u64>,
    trust_scores: TrustHistogram,
    stats: DashboardStats,
}

async fn data(State(state): State<AppState>) -> Json<DataResp> {
    let snap = state.dashboard.snapshot();
    let init = snap.init_payload();
    Json(DataResp {
        articles: init.articles,
        sources: init.sources,
        trust_scores: init.trust_scores,
        stats: snap.stats(),
    })
}

#[derive(Serialize)]
struct PingResp {
    status: &'static str,
    message: &'static str,
}

async fn ping() -> Json<PingResp> {
    Json(PingResp {
        status: "ok",
        message: "trustfeed dashboard is running",
    })
}
