use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use std::path::{Path, PathBuf};
use tee_types::{AttestationTokenRequest, ErrorMessage, DEFAULT_SOCKET_PATH, TOKEN_ENDPOINT};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hyper(#[from] hyper::Error),

    #[error(transparent)]
    Http(#[from] hyper::http::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("token request failed with {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("response body is not valid UTF-8: {0}")]
    InvalidUtf8(#[source] std::str::Utf8Error),
}

/// Requests attestation tokens from a TEE server listening on a Unix socket.
#[derive(Debug, Clone)]
pub struct TeeServerClient {
    socket_path: PathBuf,
}

impl Default for TeeServerClient {
    fn default() -> Self {
        TeeServerClient::new(DEFAULT_SOCKET_PATH)
    }
}

impl TeeServerClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        TeeServerClient {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Requests a token and returns it in compact form, without the trailing newline.
    pub async fn request_token(
        &self,
        token_request: &AttestationTokenRequest,
    ) -> Result<String, ClientError> {
        let body = serde_json::to_vec(token_request)?;
        let (status, body) = self
            .send(Method::POST, TOKEN_ENDPOINT, Bytes::from(body))
            .await?;

        if !status.is_success() {
            // Fall back to the raw body if the server did not send a JSON message.
            let message = match serde_json::from_slice::<ErrorMessage>(&body) {
                Ok(error) => error.message,
                Err(_) => String::from_utf8_lossy(&body).into_owned(),
            };
            return Err(ClientError::Status { status, message });
        }

        let token = std::str::from_utf8(&body).map_err(ClientError::InvalidUtf8)?;
        Ok(token.trim_end().to_owned())
    }

    /// Sends a single HTTP/1 request over a fresh connection to the socket.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes), ClientError> {
        let stream = tokio::net::UnixStream::connect(&self.socket_path).await?;
        let stream = TokioIo::new(stream);

        let (mut client, conn) = hyper::client::conn::http1::Builder::new()
            .handshake::<_, Full<Bytes>>(stream)
            .await?;

        tokio::task::spawn(async move {
            if let Err(err) = conn.await {
                debug!("Connection to TEE server failed: {}", err);
            }
        });

        let request = hyper::Request::builder()
            .uri(format!("http://localhost{path}"))
            .method(method)
            .header("Host", "localhost")
            .header("Content-Type", "application/json")
            .body(Full::new(body))?;

        let response = client.send_request(request).await?;
        let status = response.status();
        let body = response.collect().await?.to_bytes();

        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use crate::{ClientError, TeeServerClient};
    use std::path::Path;
    use tee_types::AttestationTokenRequest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    #[test]
    fn test_default_socket_path() {
        assert_eq!(
            TeeServerClient::default().socket_path(),
            Path::new("/run/container_launcher/teeserver.sock")
        );
    }

    #[tokio::test]
    async fn test_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let client = TeeServerClient::new(dir.path().join("missing.sock"));
        let err = client
            .request_token(&AttestationTokenRequest::pki("aud", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[tokio::test]
    async fn test_non_utf8_token() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("teeserver.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.ends_with(b"}") {
                let n = stream.read(&mut buf).await.unwrap();
                assert_ne!(n, 0);
                request.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\n\xff\xfe")
                .await
                .unwrap();
        });

        let err = TeeServerClient::new(&socket_path)
            .request_token(&AttestationTokenRequest::pki("aud", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUtf8(_)));
        server.await.unwrap();
    }
}
