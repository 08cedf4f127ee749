//! Minimal HTTP/1 client for talking to the hub.
//!
//! One TCP connection per request, driven by a background task, the
//! same way the hub's own probes are written. Responses are returned
//! unread so streaming endpoints can be consumed frame by frame.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, HeaderName, USER_AGENT};
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

const AGENT: &str = concat!("roster-sync/", env!("CARGO_PKG_VERSION"));

/// Send a request to `authority` (`host:port`) and return the response head.
pub async fn request(
    authority: &str,
    method: Method,
    path: &str,
    headers: &[(HeaderName, String)],
    body: Bytes,
) -> SyncResult<Response<Incoming>> {
    let connect_err = |reason: String| SyncError::Connect {
        addr: authority.to_string(),
        reason,
    };

    let stream = tokio::net::TcpStream::connect(authority)
        .await
        .map_err(|e| connect_err(e.to_string()))?;
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    // Drive the connection in the background.
    let addr = authority.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, %addr, "hub connection closed with error");
        }
    });

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(HOST, authority)
        .header(USER_AGENT, AGENT);
    for (name, value) in headers {
        builder = builder.header(name, value.as_str());
    }
    let req = builder
        .body(Full::new(body))
        .map_err(|e| SyncError::Request {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

    sender.send_request(req).await.map_err(|e| SyncError::Request {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Fail with [`SyncError::Status`] unless the response is 2xx.
pub fn ensure_success(path: &str, resp: Response<Incoming>) -> SyncResult<Response<Incoming>> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(SyncError::Status {
            path: path.to_string(),
            status: resp.status().as_u16(),
        })
    }
}

async fn read_json<T: DeserializeOwned>(path: &str, resp: Response<Incoming>) -> SyncResult<T> {
    let resp = ensure_success(path, resp)?;
    let bytes = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| SyncError::Body(e.to_string()))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| SyncError::Decode(e.to_string()))
}

/// GET `path` and decode the JSON body.
pub async fn get_json<T: DeserializeOwned>(authority: &str, path: &str) -> SyncResult<T> {
    let resp = request(authority, Method::GET, path, &[], Bytes::new()).await?;
    read_json(path, resp).await
}

/// POST `body` as JSON to `path` and decode the JSON reply.
pub async fn post_json<B: Serialize, T: DeserializeOwned>(
    authority: &str,
    path: &str,
    headers: &[(HeaderName, String)],
    body: &B,
) -> SyncResult<T> {
    let payload = serde_json::to_vec(body).map_err(|e| SyncError::Decode(e.to_string()))?;
    let mut all_headers = vec![(CONTENT_TYPE, "application/json".to_string())];
    all_headers.extend_from_slice(headers);
    let resp = request(authority, Method::POST, path, &all_headers, Bytes::from(payload)).await?;
    read_json(path, resp).await
}
