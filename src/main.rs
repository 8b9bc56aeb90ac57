//! trustfeed dashboard server.
//! Boots the broadcast service (stream tailer + optional demo feed) and serves
//! the page, the SSE endpoint and the JSON snapshot over HTTP.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use trustfeed::config;
use trustfeed::dashboard::{api, DashboardService, TailSource};
use trustfeed::{broker, metrics, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = config::load_default()?;
    let prom = metrics::install()?;

    let tail = if cfg.dashboard.tail_stream {
        match broker::connect(&cfg.broker).await {
            Ok(b) => Some(TailSource {
                broker: b,
                stream: cfg.broker.stream.clone(),
            }),
            Err(e) => {
                tracing::warn!(target: "dashboard", error = %e, "broker unavailable; stream tailer disabled");
                None
            }
        }
    } else {
        None
    };

    let service = DashboardService::start(&cfg.dashboard, tail);
    let app = api::router(service.handle(), Some(prom));

    let addr = format!("{}:{}", cfg.dashboard.host, cfg.dashboard.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(target: "dashboard", %addr, "dashboard listening");

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "dashboard", "ctrl-c received; shutting down");
        }
        stop.cancel();
    });

    // service shutdown closes the SSE streams so graceful shutdown can finish
    let serve = axum::serve(listener, app).with_graceful_shutdown(cancel.clone().cancelled_owned());
    let (served, ()) = tokio::join!(async move { serve.await }, async move {
        cancel.cancelled().await;
        service.shutdown().await;
    });
    served.context("http server")?;
    Ok(())
}
