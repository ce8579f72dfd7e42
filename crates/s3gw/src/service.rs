//! The gateway's HTTP entry point: ties authentication, routing, and the
//! per-resource controllers together into a single `hyper`/`tower` service.
//!
//! # Basic usage
//!
//! ```rust,no_run
//! use s3gw::backend::ReqwestBackendClient;
//! use s3gw::config::StaticConfigProvider;
//! use s3gw::service::GatewayServiceBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = ReqwestBackendClient::new("http://127.0.0.1:8090")?;
//! let service = GatewayServiceBuilder::new(backend, StaticConfigProvider::default()).build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     let io = hyper_util::rt::TokioIo::new(stream);
//!     let service = service.clone();
//!     tokio::spawn(async move {
//!         let _ = hyper::server::conn::http1::Builder::new().serve_connection(io, service).await;
//!     });
//! }
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use http::{HeaderValue, Request, Response};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tracing::{debug, error};

use crate::auth::{self, Credentials};
use crate::backend::{Body as BackendBody, BackendClient, BackendRequest, TokenInjectingBackend};
use crate::config::GatewayConfigProvider;
use crate::controllers::{self, GatewayRequest, parse_query};
use crate::route;
use crate::{S3Error, s3_error};

/// HTTP body used on the wire, in both directions.
pub type GatewayBody = http_body_util::combinators::BoxBody<bytes::Bytes, std::io::Error>;

/// Builder for [`GatewayService`].
pub struct GatewayServiceBuilder<B, C> {
    backend: Arc<B>,
    config: Arc<C>,
}

impl<B, C> GatewayServiceBuilder<B, C>
where
    B: BackendClient,
    C: GatewayConfigProvider,
{
    pub fn new(backend: B, config: C) -> Self {
        Self { backend: Arc::new(backend), config: Arc::new(config) }
    }

    #[must_use]
    pub fn build(self) -> GatewayService<B, C> {
        GatewayService { inner: Arc::new(Inner { backend: self.backend, config: self.config }) }
    }
}

struct Inner<B, C> {
    backend: Arc<B>,
    config: Arc<C>,
}

/// The gateway's main service type. Cheaply cloneable; implements both
/// `hyper::service::Service` and `tower::Service` so it can be served
/// directly or composed into a `tower` stack.
pub struct GatewayService<B, C> {
    inner: Arc<Inner<B, C>>,
}

impl<B, C> Clone for GatewayService<B, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B, C> fmt::Debug for GatewayService<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayService").finish_non_exhaustive()
    }
}

impl<B, C> GatewayService<B, C>
where
    B: BackendClient,
    C: GatewayConfigProvider,
{
    #[tracing::instrument(
        level = "debug",
        skip(self, req),
        fields(method = %req.method(), uri = %req.uri(), start_time = ?crate::time::now_utc())
    )]
    pub async fn call(&self, req: Request<GatewayBody>) -> Result<Response<GatewayBody>, std::convert::Infallible> {
        let t0 = std::time::Instant::now();
        let result = self.handle(req).await;
        let duration = t0.elapsed();

        let response = match result {
            Ok(resp) => resp,
            Err(err) => {
                if err.status_code().is_server_error() {
                    error!(?duration, code = %err.code(), "request failed");
                } else {
                    debug!(?duration, code = %err.code(), "request rejected");
                }
                error_response(&err)
            }
        };
        Ok(response)
    }

    async fn handle(&self, req: Request<GatewayBody>) -> Result<Response<GatewayBody>, S3Error> {
        let config = self.inner.config.snapshot();
        let (mut parts, body) = req.into_parts();

        let mut query = parse_query(parts.uri.query().unwrap_or_default());

        let access_key = query.iter().find(|(k, _)| k == "AWSAccessKeyId").and_then(|(_, v)| v.clone());
        if let Some(key) = access_key {
            // Presigned URLs carry their own `Expires`/`Signature` query
            // parameters in place of the `Date`/`Authorization` headers.
            // Synthesize both onto the request before the rest of the
            // pipeline runs, overwriting any `Authorization` header the
            // request already carries.
            let expires = query.iter().find(|(k, _)| k == "Expires").and_then(|(_, v)| v.clone());
            let expires = expires.ok_or_else(|| s3_error!(InvalidArgument, "missing Expires query parameter"))?;
            parts.headers.insert(http::header::DATE, HeaderValue::from_str(&expires).map_err(|_| s3_error!(InvalidArgument, "invalid Expires query parameter"))?);

            let signature = query.iter().find(|(k, _)| k == "Signature").and_then(|(_, v)| v.clone());
            let synthesized = auth::synthesize_authorization(&key, signature.as_deref())?;
            parts.headers.insert(
                http::header::AUTHORIZATION,
                HeaderValue::from_str(&synthesized).map_err(|_| s3_error!(InvalidArgument, "invalid synthesized Authorization header"))?,
            );
        }

        let authorization = match parts.headers.get(http::header::AUTHORIZATION) {
            Some(v) => Some(v.to_str().map_err(|_| s3_error!(InvalidArgument, "invalid Authorization header"))?.to_owned()),
            None => None,
        };

        // Non-S3 traffic coexists on the same listener: if the request carries
        // no credentials at all (not even a presigned query string), it is not
        // ours to shape — forward it to the backend exactly as received.
        let Some(authorization) = authorization else {
            let passthrough_body = BackendBody::Stream(Box::pin(body.into_data_stream()));
            let mut backend_req = BackendRequest::new(parts.method.clone(), parts.uri.path().to_owned()).with_body(passthrough_body);
            backend_req.headers = parts.headers.clone();
            backend_req.query = query;
            let resp = self.inner.backend.send(backend_req).await?;
            let mut builder = Response::builder().status(resp.status);
            for (name, value) in &resp.headers {
                builder = builder.header(name, value);
            }
            return builder.body(body_to_boxed(resp.body)).map_err(S3Error::internal);
        };

        let Credentials { account, .. } = auth::parse_authorization_header(&authorization)?;

        if let Some(date) = parts.headers.get(http::header::DATE).and_then(|v| v.to_str().ok()) {
            let parsed = auth::parse_date_header(date)?;
            auth::check_clock_skew(parsed, chrono::Utc::now(), config.max_skew)?;
        }

        let canonical_resource = auth::canonical_resource(parts.uri.path(), &query);
        let canonical = auth::canonical_string(&parts.method, &parts.headers, &canonical_resource);
        let token = auth::encode_token(&canonical);

        query.retain(|(k, _)| k != "AWSAccessKeyId" && k != "Signature" && k != "Expires");

        let resource = route::resolve(parts.uri.path())?;

        // Never buffered here: object PUT bodies are forwarded to the backend
        // as a lazy stream, while the small-body controllers (ACL, versioning)
        // call `Body::into_bytes` themselves once routed.
        let streamed_body = BackendBody::Stream(Box::pin(body.into_data_stream()));
        let gateway_req = GatewayRequest { method: parts.method, query, headers: parts.headers, body: streamed_body, account };

        let backend = TokenInjectingBackend::new(self.inner.backend.as_ref(), token);
        let resp = controllers::dispatch(resource, gateway_req, &backend, &config).await?;

        let mut builder = Response::builder().status(resp.status);
        for (name, value) in &resp.headers {
            builder = builder.header(name, value);
        }
        let body = body_to_boxed(resp.body);
        builder.body(body).map_err(S3Error::internal)
    }
}

fn body_to_boxed(body: BackendBody) -> GatewayBody {
    use futures::StreamExt;
    use http_body_util::{Full, StreamBody};
    use hyper::body::Frame;

    match body {
        BackendBody::Empty => Full::new(bytes::Bytes::new()).map_err(|never: std::convert::Infallible| match never {}).boxed(),
        BackendBody::Bytes(b) => Full::new(b).map_err(|never: std::convert::Infallible| match never {}).boxed(),
        BackendBody::Stream(s) => StreamBody::new(s.map(|r| r.map(Frame::data))).boxed(),
    }
}

fn error_response(err: &S3Error) -> Response<GatewayBody> {
    use http_body_util::Full;
    let xml = err.to_xml();
    let mut builder = Response::builder().status(err.status_code());
    if let Some(headers) = builder.headers_mut() {
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    }
    builder
        .body(Full::new(bytes::Bytes::from(xml.into_bytes())).map_err(|never: std::convert::Infallible| match never {}).boxed())
        .unwrap_or_else(|_| {
            // Building the response from a status code and a static content
            // type cannot fail; this arm exists only to keep the function total.
            Response::new(Full::new(bytes::Bytes::new()).map_err(|never: std::convert::Infallible| match never {}).boxed())
        })
}

impl<B, C> hyper::service::Service<Request<Incoming>> for GatewayService<B, C>
where
    B: BackendClient,
    C: GatewayConfigProvider,
{
    type Response = Response<GatewayBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        use http_body_util::BodyExt as _;
        let req = req.map(|b| b.map_err(std::io::Error::other).boxed());
        let service = self.clone();
        Box::pin(async move { service.call(req).await })
    }
}

impl<B, C> tower::Service<Request<Incoming>> for GatewayService<B, C>
where
    B: BackendClient,
    C: GatewayConfigProvider,
{
    type Response = Response<GatewayBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        use http_body_util::BodyExt as _;
        let req = req.map(|b| b.map_err(std::io::Error::other).boxed());
        let service = self.clone();
        Box::pin(async move { service.call(req).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRequest, BackendResponse, Body};
    use crate::config::StaticConfigProvider;
    use async_trait::async_trait;
    use http::StatusCode;
    use std::sync::Mutex;

    struct MockBackend {
        response: Mutex<Option<BackendResponse>>,
    }

    #[async_trait]
    impl BackendClient for MockBackend {
        async fn send(&self, _req: BackendRequest) -> Result<BackendResponse, S3Error> {
            Ok(self.response.lock().unwrap().take().expect("mock backend called more than once"))
        }
    }

    fn config() -> StaticConfigProvider {
        StaticConfigProvider::default()
    }

    #[tokio::test]
    async fn unsigned_request_is_forwarded_untouched_to_the_backend() {
        let backend = MockBackend {
            response: Mutex::new(Some(BackendResponse { status: StatusCode::IM_A_TEAPOT, headers: http::HeaderMap::new(), body: Body::Empty })),
        };
        let service = GatewayServiceBuilder::new(backend, config()).build();

        let req = Request::builder()
            .method("GET")
            .uri("/health")
            .body(http_body_util::Full::new(bytes::Bytes::new()).map_err(|e: std::convert::Infallible| match e {}).boxed())
            .unwrap();

        let resp = service.call(req).await.unwrap();
        // Neither an S3 error status nor anything this service invents — whatever
        // the backend returned comes straight back through.
        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn presigned_request_missing_expires_is_invalid_argument() {
        let backend = MockBackend { response: Mutex::new(None) };
        let service = GatewayServiceBuilder::new(backend, config()).build();

        let req = Request::builder()
            .method("GET")
            .uri("/bucket?AWSAccessKeyId=abc")
            .body(http_body_util::Full::new(bytes::Bytes::new()).map_err(|e: std::convert::Infallible| match e {}).boxed())
            .unwrap();

        let resp = service.call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn presigned_request_missing_signature_is_invalid_argument() {
        let backend = MockBackend { response: Mutex::new(None) };
        let service = GatewayServiceBuilder::new(backend, config()).build();

        let req = Request::builder()
            .method("GET")
            .uri("/bucket?AWSAccessKeyId=abc&Expires=1893456000")
            .body(http_body_util::Full::new(bytes::Bytes::new()).map_err(|e: std::convert::Infallible| match e {}).boxed())
            .unwrap();

        let resp = service.call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_list_buckets_round_trips_through_the_service() {
        let backend = MockBackend {
            response: Mutex::new(Some(BackendResponse {
                status: StatusCode::OK,
                headers: http::HeaderMap::new(),
                body: Body::from_bytes(br#"[{"name":"b1"}]"#.to_vec()),
            })),
        };
        let service = GatewayServiceBuilder::new(backend, config()).build();

        let req = Request::builder()
            .method("GET")
            .uri("/")
            .header("Authorization", "AWS acct:sig")
            .body(http_body_util::Full::new(bytes::Bytes::new()).map_err(|e: std::convert::Infallible| match e {}).boxed())
            .unwrap();

        let resp = service.call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("<Name>b1</Name>"));
    }

    #[tokio::test]
    async fn presigned_query_params_override_an_existing_authorization_header() {
        let backend = MockBackend {
            response: Mutex::new(Some(BackendResponse {
                status: StatusCode::OK,
                headers: http::HeaderMap::new(),
                body: Body::from_bytes(br#"[{"name":"b1"}]"#.to_vec()),
            })),
        };
        let service = GatewayServiceBuilder::new(backend, config()).build();

        // A stale/bogus Authorization header is present, but the query string
        // carries a full presigned-URL credential set. The synthesized
        // Authorization header must win.
        let req = Request::builder()
            .method("GET")
            .uri("/?AWSAccessKeyId=acct&Signature=sig&Expires=1893456000")
            .header("Authorization", "AWS other-acct:not-used")
            .body(http_body_util::Full::new(bytes::Bytes::new()).map_err(|e: std::convert::Infallible| match e {}).boxed())
            .unwrap();

        let resp = service.call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
