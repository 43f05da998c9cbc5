//! Prometheus metrics for the primflow server.
//!
//! This module provides:
//! - Metrics registry with counters, gauges, and histograms
//! - Standalone HTTP listener exposing `/metrics` and `/health`

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Request duration histogram buckets (in seconds).
const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Run duration buckets; runs call out to collaborators so the tail is longer.
const RUN_BUCKETS: &[f64] = &[0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0];

/// Prometheus metrics for the primflow server.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total requests by route.
    pub requests_total: CounterVec,
    /// Total errors by error code.
    pub errors_total: CounterVec,
    /// Request duration by route.
    pub request_duration: HistogramVec,
    /// Finished runs by termination reason.
    pub runs_total: CounterVec,
    /// Executed states by outcome.
    pub states_executed_total: CounterVec,
    /// Wall time of workflow runs.
    pub run_duration: Histogram,
    /// States currently in the store.
    pub states_stored: Gauge,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("primflow_requests_total", "Total requests by route"),
            &["route"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let errors_total = CounterVec::new(
            Opts::new("primflow_errors_total", "Total errors by error code"),
            &["code"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "primflow_request_duration_seconds",
                "Request duration in seconds by route",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["route"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let runs_total = CounterVec::new(
            Opts::new("primflow_runs_total", "Workflow runs by termination"),
            &["termination"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let states_executed_total = CounterVec::new(
            Opts::new(
                "primflow_states_executed_total",
                "States executed by outcome",
            ),
            &["status"],
        )?;
        registry.register(Box::new(states_executed_total.clone()))?;

        let run_duration = Histogram::with_opts(
            HistogramOpts::new(
                "primflow_run_duration_seconds",
                "Workflow run duration in seconds",
            )
            .buckets(RUN_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        let states_stored = Gauge::with_opts(Opts::new(
            "primflow_states_stored",
            "Number of state definitions in the store",
        ))?;
        registry.register(Box::new(states_stored.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            errors_total,
            request_duration,
            runs_total,
            states_executed_total,
            run_duration,
            states_stored,
        })
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Runs the standalone metrics listener.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (status, content_type, body) = match req.uri().path() {
        "/metrics" => (
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            Bytes::from(metrics.encode()),
        ),
        "/health" | "/healthz" => (StatusCode::OK, "text/plain", Bytes::from_static(b"OK")),
        _ => (
            StatusCode::NOT_FOUND,
            "text/plain",
            Bytes::from_static(b"Not Found"),
        ),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    Ok(response)
}
