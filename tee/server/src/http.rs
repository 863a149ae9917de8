use crate::{IssueError, SignToken, TokenIssuer};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tee_types::TOKEN_ENDPOINT;
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

/// Largest request body read before the request is refused.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

pub fn bind(socket_path: &Path) -> std::io::Result<UnixListener> {
    UnixListener::bind(socket_path)
}

/// Removes the socket file left behind by [`bind`].
pub async fn remove_socket(socket_path: &Path) {
    info!("Removing socket...");
    match tokio::fs::remove_file(socket_path).await {
        Ok(()) => info!("Successfully removed {}", socket_path.display()),
        Err(err) => warn!("Failed to remove {}: {}", socket_path.display(), err),
    }
}

/// Serves the token endpoint on `listener` until `shutdown` completes.
///
/// Every connection runs on its own task. Connections still in flight when
/// `shutdown` fires are left to finish on their own.
pub async fn serve<S, F>(listener: UnixListener, issuer: Arc<TokenIssuer<S>>, shutdown: F)
where
    S: SignToken + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(err) => {
                        warn!("Failed to accept connection: {}", err);
                        continue;
                    }
                };

                let issuer = Arc::clone(&issuer);
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(Arc::clone(&issuer), req));
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Connection closed with error: {}", err);
                    }
                });
            }
            () = &mut shutdown => {
                info!("Stopped accepting connections");
                return;
            }
        }
    }
}

/// Handles one HTTP request for the token endpoint.
pub async fn handle<S, B>(
    issuer: Arc<TokenIssuer<S>>,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    S: SignToken,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    debug!("{} {}", req.method(), req.uri().path());

    if req.uri().path() != TOKEN_ENDPOINT {
        return Ok(message(StatusCode::NOT_FOUND, "not found"));
    }

    if req.method() != Method::POST {
        return Ok(message(
            StatusCode::METHOD_NOT_ALLOWED,
            "only POST is supported",
        ));
    }

    let body = match Limited::new(req.into_body(), MAX_REQUEST_BODY_BYTES)
        .collect()
        .await
    {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.is::<LengthLimitError>() => {
            warn!("Request body exceeds {} bytes", MAX_REQUEST_BODY_BYTES);
            return Ok(message(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large",
            ));
        }
        Err(err) => {
            warn!("Failed to read request body: {}", err);
            return Ok(message(
                StatusCode::BAD_REQUEST,
                "failed to parse attestation token request",
            ));
        }
    };

    Ok(match issuer.issue(&body) {
        Ok(token) => json(StatusCode::OK, format!("{token}\n")),
        Err(IssueError::Rejected(err)) => message(StatusCode::BAD_REQUEST, &err.to_string()),
        Err(IssueError::Signing(_)) => message(
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to sign attestation token",
        ),
    })
}

/// `{"message": "..."}` with the message JSON escaped.
pub fn message_body(message: &str) -> String {
    format!("{{\"message\": {}}}", serde_json::Value::from(message))
}

fn message(status: StatusCode, text: &str) -> Response<Full<Bytes>> {
    json(status, message_body(text))
}

fn json(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
