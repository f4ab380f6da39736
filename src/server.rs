//! HTTP surface
//!
//! One hyper `http1` listener serving the snapshot, the invalidation webhook,
//! cache statistics, health checks and Prometheus metrics.
//!
//! | Route                         | Handler                               |
//! |-------------------------------|---------------------------------------|
//! | `GET /wishlists.json`         | layered read, `?refresh=true` with    |
//! |                               | `x-cache-secret` forces a live fetch  |
//! | `POST /api/cache/invalidate`  | webhook, needs `x-cache-secret`       |
//! | `GET /api/cache/stats`        | hit/miss counters, optional `?key=`   |
//! | `GET /healthz` `/livez` `/readyz` | `ok`                              |
//! | `GET /metrics`                | Prometheus text format                |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{InvalidationRequest, WishlistCache, SECRET_HEADER};
use crate::error::{Error, Result};
use crate::telemetry;

/// Response header naming the layer that answered a snapshot read
pub const LAYER_HEADER: &str = "x-cache-layer";

/// Largest accepted webhook body
const MAX_BODY_BYTES: usize = 64 * 1024;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

type HttpResponse = Response<Full<Bytes>>;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    retryable: bool,
}

// =============================================================================
// Server Loop
// =============================================================================

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn run(addr: &str, cache: Arc<WishlistCache>, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address '{}': {}", addr, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind HTTP server: {}", e)))?;

    info!("HTTP server listening on {}", addr);
    serve(listener, cache, shutdown).await
}

/// Accept connections on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    cache: Arc<WishlistCache>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("HTTP server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("HTTP server accept error: {}", e)))?,
        };

        let io = TokioIo::new(stream);
        let cache = Arc::clone(&cache);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let cache = Arc::clone(&cache);
                async move { handle_incoming(cache, req).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, "HTTP connection error: {}", e);
            }
        });
    }
}

async fn handle_incoming(
    cache: Arc<WishlistCache>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<HttpResponse, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match http_body_util::Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("rejecting request body: {}", e);
            return Ok(text(StatusCode::PAYLOAD_TOO_LARGE, "payload too large"));
        }
    };

    Ok(handle(&cache, Request::from_parts(parts, body)).await)
}

// =============================================================================
// Routing
// =============================================================================

/// Route a fully buffered request.
pub async fn handle(cache: &WishlistCache, req: Request<Bytes>) -> HttpResponse {
    let path = req.uri().path();

    match (req.method(), path) {
        (&Method::GET, "/wishlists.json") => {
            let force = refresh_requested(cache, &req);
            read_snapshot(cache, force).await
        }
        (&Method::POST, "/api/cache/invalidate") => invalidate(cache, &req).await,
        (&Method::GET, "/api/cache/stats") => {
            let key = query_param(&req, "key");
            json(StatusCode::OK, &cache.stats(key.as_deref()))
        }
        (&Method::GET, "/healthz" | "/livez" | "/readyz") => text(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") => metrics(),
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

/// `?refresh` only counts when the caller also holds the webhook secret;
/// anonymous callers get a normal layered read.
fn refresh_requested(cache: &WishlistCache, req: &Request<Bytes>) -> bool {
    let requested = query_param(req, "refresh").is_some_and(|v| v == "true" || v == "1");
    if !requested {
        return false;
    }

    let provided = req
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if cache.invalidator().authorize(provided) {
        return true;
    }
    debug!("ignoring refresh from unauthorized caller");
    false
}

async fn read_snapshot(cache: &WishlistCache, force: bool) -> HttpResponse {
    match cache.read(force).await {
        Ok(resolved) => {
            let mut response = json(StatusCode::OK, resolved.snapshot.as_ref());
            response.headers_mut().insert(
                LAYER_HEADER,
                HeaderValue::from_static(resolved.layer.as_str()),
            );
            response
        }
        Err(e) => {
            error!(error = %e, force, "snapshot read failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, &e)
        }
    }
}

async fn invalidate(cache: &WishlistCache, req: &Request<Bytes>) -> HttpResponse {
    let invalidator = cache.invalidator();
    if !invalidator.webhook_enabled() {
        return text(StatusCode::FORBIDDEN, "invalidation webhook disabled");
    }

    let provided = req
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !invalidator.authorize(provided) {
        warn!("invalidation rejected: bad or missing secret");
        return text(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let request: InvalidationRequest = if req.body().iter().all(u8::is_ascii_whitespace) {
        InvalidationRequest::default()
    } else {
        match serde_json::from_slice(req.body()) {
            Ok(request) => request,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &Error::Json(e));
            }
        }
    };

    match cache.handle_invalidation(request).await {
        Ok(outcome) => json(StatusCode::OK, &outcome),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e),
    }
}

fn metrics() -> HttpResponse {
    match telemetry::render() {
        Ok((content_type, body)) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn query_param(req: &Request<Bytes>, name: &str) -> Option<String> {
    req.uri().query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            urlencoding::decode(value).ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn text(status: StatusCode, body: &'static str) -> HttpResponse {
    respond(status, TEXT, body)
}

fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, JSON, body),
        Err(e) => {
            error!("response serialization failed: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn error_response(status: StatusCode, err: &Error) -> HttpResponse {
    let message = err.to_string();
    json(
        status,
        &ErrorBody {
            error: &message,
            retryable: err.is_retryable(),
        },
    )
}

// =============================================================================
// Tests
// =============================================================================
