//! Minimal HTTP client for the Docker Engine API over its Unix socket.
//!
//! Only the cheap read-only queries go through the socket (daemon ping,
//! image inspection); everything that streams a container's stdio goes
//! through the CLI.

use std::path::Path;

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;

use crate::ExecutorError;

/// Send a bodiless request to the Engine API and return status and body.
///
/// Non-2xx statuses are returned, not turned into errors, so callers can
/// treat e.g. `404` as an answer.
///
/// # Errors
/// Returns [`ExecutorError::ApiError`] on connection or HTTP protocol errors.
pub(crate) async fn engine_request(
    socket_path: &Path,
    method: Method,
    uri_path: &str,
) -> Result<(StatusCode, String), ExecutorError> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| {
            ExecutorError::ApiError(format!("connect to {}: {e}", socket_path.display()))
        })?;

    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ExecutorError::ApiError(format!("HTTP handshake: {e}")))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("engine API connection closed: {e}");
        }
    });

    let uri: Uri = uri_path
        .parse()
        .map_err(|e| ExecutorError::ApiError(format!("invalid URI path {uri_path}: {e}")))?;

    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Host", "docker")
        .body(Empty::<Bytes>::new())
        .map_err(|e| ExecutorError::ApiError(format!("build request: {e}")))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| ExecutorError::ApiError(format!("send request: {e}")))?;

    let status = resp.status();
    let body_bytes = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| ExecutorError::ApiError(format!("read response body: {e}")))?
        .to_bytes();

    Ok((status, String::from_utf8_lossy(&body_bytes).into_owned()))
}

/// Percent-encode an image reference for use as a single path segment group.
///
/// `/` is kept because the Engine API accepts repository paths verbatim.
pub(crate) fn encode_image_ref(image: &str) -> String {
    let mut out = String::with_capacity(image.len());
    for byte in image.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'.'
            | b'_'
            | b'~'
            | b'/'
            | b':'
            | b'@' => {
                out.push(char::from(byte));
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
