// External crates
use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    body::Incoming,
    header::CONTENT_TYPE,
    http::{Method, Request, Response, StatusCode},
    service::service_fn,
};
use hyper_util::{rt::TokioExecutor, server::conn::auto::Builder as HyperServerBuilder};
use prometheus::{Encoder, TextEncoder};
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Encode every registered metric in the Prometheus text format.
fn render_metrics() -> Response<Full<Bytes>> {
    let metric_families = prometheus::gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode prometheus metrics");
        return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed");
    }

    tracing::debug!(writer_buffer = %buffer.len(), "Encoded metrics into prometheus text format");

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(value) = encoder.format_type().parse() {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

async fn route(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => render_metrics(),
        _ => plain_response(StatusCode::NOT_FOUND, "Not Found"),
    })
}

/// Serve `GET /metrics` on `addr` until `cancel` fires.
#[instrument(
    name = "metrics_server::start_metrics_server",
    target = "metrics::http",
    skip_all,
    level = "debug"
)]
pub async fn start_metrics_server(addr: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(metrics_endpoint = %addr, "Service metrics available at http://{addr}/metrics");

    loop {
        let (stream, _) = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Metrics server stopping");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "Metrics server failed to accept connection");
                    continue;
                }
            },
        };

        let io = hyper_util::rt::TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = HyperServerBuilder::new(TokioExecutor::new())
                .serve_connection(io, service_fn(route))
                .await
            {
                tracing::error!(error = %err, "Metrics server connection error");
            }
        });
    }
}
