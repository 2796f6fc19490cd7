//! Client for the downstream service behind `/sample-api`.
//!
//! # Design Decisions
//! - One pooled hyper client shared by all requests
//! - Any non-2xx status is a failure, so the breaker counts it
//! - Response bodies are capped; the endpoint returns text

use axum::{
    body::Body,
    http::{header, uri::InvalidUri, Method, Request, StatusCode, Uri},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::http::request::X_REQUEST_ID;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("invalid downstream URL: {0}")]
    InvalidUrl(#[from] InvalidUri),

    #[error("failed to build request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("downstream returned {0}")]
    Status(StatusCode),

    #[error("failed to read response body: {0}")]
    Body(#[from] axum::Error),
}

#[derive(Clone, Debug)]
pub struct DownstreamClient {
    client: Client<HttpConnector, Body>,
}

impl Default for DownstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DownstreamClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(&self, url: &str, request_id: &str) -> Result<String, DownstreamError> {
        let uri: Uri = url.parse()?;
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::ACCEPT, "text/plain, application/json, */*")
            .header(X_REQUEST_ID, request_id)
            .body(Body::empty())?;

        let response = self.client.request(request).await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "Downstream returned error status");
            return Err(DownstreamError::Status(status));
        }

        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
