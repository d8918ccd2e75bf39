use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, HeaderName, header},
    response::Response,
};

use crate::error::UpstreamError;

/// Largest request body relayed upstream.
pub const MAX_FORWARD_BODY: usize = 2 * 1024 * 1024;

/// Upstream
///
/// A service the gateway hands requests to once the gate let them through: the
/// auth service's handler for `/api/auth/*`, and the page renderer for everything else.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, request: Request) -> Result<Response, UpstreamError>;
}

pub type UpstreamState = Arc<dyn Upstream>;

/// HttpUpstream
///
/// Relays the request (method, path, query, headers and body) to `base_url` and the
/// response back verbatim, minus hop-by-hop headers.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let hop_by_hop: [HeaderName; 9] = [
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::HOST,
        header::CONTENT_LENGTH,
    ];
    for name in hop_by_hop {
        headers.remove(name);
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: Request) -> Result<Response, UpstreamError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url, path_and_query);

        let body = to_bytes(body, MAX_FORWARD_BODY)
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| UpstreamError::Response(e.to_string()))?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}
