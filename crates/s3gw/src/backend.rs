//! The backend account/container/object HTTP service this gateway forwards
//! to, modeled as a trait so controllers can be tested against an in-memory
//! fake instead of a live service.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, Method, StatusCode};

use crate::S3Error;

/// A lazily-consumed byte stream, used for object bodies so a GET or PUT
/// never has to buffer a whole object in memory.
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// A body ready to be sent to, or received from, the backend.
pub enum Body {
    Empty,
    Bytes(Bytes),
    Stream(BodyStream),
}

impl Body {
    #[must_use]
    pub fn from_bytes(b: impl Into<Bytes>) -> Self {
        Self::Bytes(b.into())
    }

    /// Buffers the body fully into memory. Only used for small, bounded
    /// bodies (ACL documents, versioning configuration, JSON listings) —
    /// never for object payloads.
    pub async fn into_bytes(self) -> Result<Bytes, std::io::Error> {
        use futures::StreamExt;
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(b) => Ok(b),
            Self::Stream(mut s) => {
                let mut buf = Vec::new();
                while let Some(chunk) = s.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// A request rewritten for the backend's wire shape:
/// `/v1/<account>[/<container>[/<object>]]`.
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, Option<String>)>,
    pub headers: HeaderMap,
    pub body: Body,
}

impl BackendRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), headers: HeaderMap::new(), body: Body::Empty }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.query.push((key.into(), value));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}

/// The backend's raw response, before any S3 shaping.
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Abstracts over "send this request to the backend and get a response
/// back", so the translation engine can be tested without a live backend.
#[async_trait::async_trait]
pub trait BackendClient: Send + Sync + 'static {
    async fn send(&self, req: BackendRequest) -> Result<BackendResponse, S3Error>;
}

/// Wraps a [`BackendClient`], stamping `X-Auth-Token` onto every outbound
/// request. The gateway derives one token per inbound request from its
/// canonical string (see [`crate::auth::encode_token`]) and forwards it as
/// the backend's opaque bearer credential.
pub struct TokenInjectingBackend<'a> {
    inner: &'a dyn BackendClient,
    token: String,
}

impl<'a> TokenInjectingBackend<'a> {
    #[must_use]
    pub fn new(inner: &'a dyn BackendClient, token: String) -> Self {
        Self { inner, token }
    }
}

#[async_trait::async_trait]
impl BackendClient for TokenInjectingBackend<'_> {
    async fn send(&self, mut req: BackendRequest) -> Result<BackendResponse, S3Error> {
        if let Ok(value) = http::HeaderValue::from_str(&self.token) {
            req.headers.insert("x-auth-token", value);
        }
        self.inner.send(req).await
    }
}

/// A [`BackendClient`] backed by a real HTTP connection via `reqwest`.
pub struct ReqwestBackendClient {
    client: reqwest::Client,
    base_url: url::Url,
}

impl ReqwestBackendClient {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, url::ParseError> {
        let client = reqwest::Client::builder().timeout(timeout).build().expect("building the reqwest client cannot fail here");
        Ok(Self { client, base_url: url::Url::parse(base_url)? })
    }

    fn build_url(&self, req: &BackendRequest) -> url::Url {
        let mut url = self.base_url.clone();
        url.set_path(&req.path);
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &req.query {
                match v {
                    Some(v) => pairs.append_pair(k, v),
                    None => pairs.append_key_only(k),
                };
            }
        }
        url
    }
}

#[async_trait::async_trait]
impl BackendClient for ReqwestBackendClient {
    async fn send(&self, req: BackendRequest) -> Result<BackendResponse, S3Error> {
        let url = self.build_url(&req);

        let mut builder = self.client.request(req.method, url).headers(req.headers);
        builder = match req.body {
            Body::Empty => builder,
            Body::Bytes(b) => builder.body(b),
            Body::Stream(s) => builder.body(reqwest::Body::wrap_stream(s)),
        };

        let resp = builder.send().await.map_err(S3Error::internal)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let stream = resp.bytes_stream();
        use futures::StreamExt;
        let body = Body::Stream(Box::pin(stream.map(|r| r.map_err(std::io::Error::other))));
        Ok(BackendResponse { status, headers, body })
    }
}
