//! Per-resource controllers: the code that rewrites an inbound S3 request
//! into a [`BackendRequest`](crate::backend::BackendRequest), dispatches it,
//! and shapes the backend's response back into S3 wire form.

pub mod bucket;
pub mod object;
pub mod service;

use http::{HeaderMap, Method, StatusCode};

use crate::backend::{Body, BackendClient};
use crate::config::GatewayConfig;
use crate::route::Resource;
use crate::{S3Error, s3_error};

/// An inbound request, already authenticated, ready for a controller to act
/// on.
pub struct GatewayRequest {
    pub method: Method,
    pub query: Vec<(String, Option<String>)>,
    pub headers: HeaderMap,
    pub body: Body,
    /// The account identifier extracted from the `Authorization` header.
    pub account: String,
}

impl GatewayRequest {
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    #[must_use]
    pub fn has_query_param(&self, key: &str) -> bool {
        self.query.iter().any(|(k, _)| k == key)
    }
}

/// A response ready to be written back to the S3 client.
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl GatewayResponse {
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Body::Empty }
    }

    #[must_use]
    pub fn xml(status: StatusCode, xml: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, "application/xml".parse().unwrap());
        Self { status, headers, body: Body::from_bytes(xml.into_bytes()) }
    }
}

/// Dispatches a request to the controller selected by `resource`.
pub async fn dispatch(
    resource: Resource,
    req: GatewayRequest,
    backend: &dyn BackendClient,
    config: &GatewayConfig,
) -> Result<GatewayResponse, S3Error> {
    match resource {
        Resource::Service => service::handle(req, backend).await,
        Resource::Bucket { name } => bucket::handle(&name, req, backend, config).await,
        Resource::Object { bucket, key } => object::handle(&bucket, &key, req, backend, config).await,
    }
}

/// Maps a backend failure status that every controller treats the same way.
/// Controllers call this first and fall through to their own table for
/// anything it doesn't recognize.
pub(crate) fn common_error(status: StatusCode) -> Option<S3Error> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(s3_error!(AccessDenied, "access denied")),
        _ => None,
    }
}

/// Parses a query string's segments from a raw `&`-joined string, as found
/// on the wire, into the `(key, value)` representation used throughout this
/// crate.
#[must_use]
pub fn parse_query(raw: &str) -> Vec<(String, Option<String>)> {
    raw.split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (urlencoding::decode(k).unwrap_or_default().into_owned(), Some(urlencoding::decode(v).unwrap_or_default().into_owned())),
            None => (urlencoding::decode(pair).unwrap_or_default().into_owned(), None),
        })
        .collect()
}

/// Renders `(key, value)` pairs back into a `&`-joined query string, value
/// omitted when `None`.
#[must_use]
pub fn render_query(pairs: &[(String, Option<String>)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)),
            None => urlencoding::encode(k).into_owned(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_handles_flag_and_keyed_params() {
        let parsed = parse_query("acl&max-keys=10&prefix=a%2Fb");
        assert_eq!(parsed, vec![
            ("acl".to_owned(), None),
            ("max-keys".to_owned(), Some("10".to_owned())),
            ("prefix".to_owned(), Some("a/b".to_owned())),
        ]);
    }

    #[test]
    fn render_query_roundtrips_simple_pairs() {
        let rendered = render_query(&[("format".to_owned(), Some("json".to_owned())), ("versions".to_owned(), None)]);
        assert_eq!(rendered, "format=json&versions");
    }
}
