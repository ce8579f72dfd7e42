//! Object-level operations: GET/HEAD, PUT (including copy and ACL), and
//! DELETE.

use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::acl::{self, AclDocument, BackendAclHeader};
use crate::backend::{BackendClient, BackendRequest, Body};
use crate::config::GatewayConfig;
use crate::header::remap_prefix;
use crate::xml;
use crate::{S3Error, s3_error};

use super::{GatewayRequest, GatewayResponse, common_error};

pub async fn handle(
    bucket: &str,
    key: &str,
    req: GatewayRequest,
    backend: &dyn BackendClient,
    config: &GatewayConfig,
) -> Result<GatewayResponse, S3Error> {
    match req.method {
        Method::GET | Method::HEAD => get_or_head(bucket, key, req, backend).await,
        Method::PUT => put(bucket, key, req, backend, config).await,
        Method::DELETE => delete(bucket, key, &req.account, backend).await,
        _ => Err(s3_error!(InvalidURI, "unsupported method on an object")),
    }
}

async fn get_or_head(bucket: &str, key: &str, req: GatewayRequest, backend: &dyn BackendClient) -> Result<GatewayResponse, S3Error> {
    let is_head = req.method == Method::HEAD;

    if req.has_query_param("acl") {
        return get_acl(bucket, key, &req.account, backend).await;
    }

    let mut backend_req = BackendRequest::new(Method::GET, format!("/v1/{}/{bucket}/{key}", req.account));
    if let Some(version_id) = req.query_param("versionId") {
        backend_req = backend_req.with_query("versionId", Some(version_id.to_owned()));
    }

    let resp = backend.send(backend_req).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        s if s.is_success() => {}
        StatusCode::NOT_FOUND => return Err(s3_error!(NoSuchKey, "no such key: {key}")),
        other => return Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }

    let headers = remap_response_headers(&resp.headers);
    let body = if is_head { Body::Empty } else { resp.body };
    Ok(GatewayResponse { status: resp.status, headers, body })
}

async fn get_acl(bucket: &str, key: &str, account: &str, backend: &dyn BackendClient) -> Result<GatewayResponse, S3Error> {
    let backend_req = BackendRequest::new(Method::HEAD, format!("/v1/{account}/{bucket}/{key}"));
    let resp = backend.send(backend_req).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    if resp.status == StatusCode::NOT_FOUND {
        return Err(s3_error!(NoSuchKey, "no such key: {key}"));
    }

    let owner = resp.headers.get("x-object-owner").and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned();
    let backend_headers: Vec<(String, String)> =
        resp.headers.iter().map(|(k, v)| (k.as_str().to_owned(), v.to_str().unwrap_or_default().to_owned())).collect();
    let view: Vec<BackendAclHeader<'_>> = backend_headers.iter().map(|(k, v)| BackendAclHeader { header_name: k, value: v }).collect();
    let grants = acl::headers_to_grants(&view, true);

    let doc = AclDocument { owner_id: owner.clone(), owner_display_name: Some(owner), grants };
    Ok(GatewayResponse::xml(StatusCode::OK, xml::access_control_policy(&doc)))
}

async fn put(bucket: &str, key: &str, req: GatewayRequest, backend: &dyn BackendClient, config: &GatewayConfig) -> Result<GatewayResponse, S3Error> {
    if req.has_query_param("acl") {
        return put_acl(bucket, key, req, backend, config).await;
    }

    let copy_source = req.headers.get("x-amz-copy-source").and_then(|v| v.to_str().ok()).map(str::to_owned);

    let meta_names: Vec<http::header::HeaderName> = req.headers.keys().filter(|name| name.as_str().starts_with("x-amz-meta-")).cloned().collect();
    let mut headers = req.headers.clone();
    for name in meta_names {
        if let Some(value) = headers.remove(&name) {
            let renamed = remap_prefix(name.as_str(), "x-amz-meta-", "x-object-meta-").expect("name matched the x-amz-meta- prefix above");
            headers.insert(http::header::HeaderName::from_bytes(renamed.as_bytes()).unwrap(), value);
        }
    }
    if let Some(source) = &copy_source {
        headers.remove("x-amz-copy-source");
        headers.insert("x-copy-from", HeaderValue::from_str(source).unwrap());
    }

    if let Some(md5) = req.headers.get("content-md5").and_then(|v| v.to_str().ok()) {
        if md5.is_empty() {
            return Err(s3_error!(InvalidDigest, "empty Content-MD5"));
        }
        let decoded = base64_simd::STANDARD
            .decode_to_vec(md5.as_bytes())
            .map_err(|_| s3_error!(InvalidDigest, "invalid Content-MD5"))?;
        let hex = hex_simd::encode_to_string(&decoded, hex_simd::AsciiCase::Lower);
        if hex.is_empty() {
            return Err(s3_error!(SignatureDoesNotMatch, "empty digest"));
        }
        headers.insert(http::header::ETAG, HeaderValue::from_str(&hex).unwrap());
    }

    let account = req.account.clone();
    let mut backend_req = BackendRequest::new(Method::PUT, format!("/v1/{account}/{bucket}/{key}")).with_body(req.body);
    backend_req.headers = headers;

    let resp = backend.send(backend_req).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        StatusCode::CREATED => {}
        StatusCode::NOT_FOUND => return Err(s3_error!(NoSuchBucket, "no such bucket: {bucket}")),
        StatusCode::UNPROCESSABLE_ENTITY => return Err(s3_error!(InvalidDigest, "digest mismatch")),
        other => return Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }

    let etag = resp.headers.get(http::header::ETAG).and_then(|v| v.to_str().ok()).unwrap_or_default().trim_matches('"').to_owned();
    let last_modified = resp.headers.get(http::header::LAST_MODIFIED).and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned();

    if copy_source.is_some() {
        return Ok(GatewayResponse::xml(StatusCode::OK, xml::copy_object_result(&etag, &last_modified)));
    }

    let mut headers = HeaderMap::new();
    headers.insert(http::header::ETAG, HeaderValue::from_str(&format!("\"{etag}\"")).unwrap());
    Ok(GatewayResponse { status: StatusCode::OK, headers, body: Body::Empty })
}

async fn put_acl(
    bucket: &str,
    key: &str,
    req: GatewayRequest,
    backend: &dyn BackendClient,
    config: &GatewayConfig,
) -> Result<GatewayResponse, S3Error> {
    let account = req.account.clone();
    let bytes = req.body.into_bytes().await.map_err(S3Error::internal)?;
    if bytes.is_empty() {
        return Err(s3_error!(MalformedACLError, "missing ACL body"));
    }
    let doc = acl::parse_access_control_policy(&bytes)?;
    let acl_headers = acl::acp_to_headers(&doc, true, &config.authenticated_users_sentinel);

    let mut backend_req = BackendRequest::new(Method::POST, format!("/v1/{account}/{bucket}/{key}")).with_query("acl", None);
    for (k, v) in acl_headers {
        let value = HeaderValue::from_str(&v).map_err(|_| s3_error!(MalformedACLError, "grantee identifier is not valid header text"))?;
        backend_req.headers.insert(http::header::HeaderName::from_bytes(k.as_bytes()).unwrap(), value);
    }

    let resp = backend.send(backend_req).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        StatusCode::ACCEPTED => Ok(GatewayResponse::empty(StatusCode::OK)),
        StatusCode::NOT_FOUND => Err(s3_error!(NoSuchKey, "no such key: {key}")),
        other => Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }
}

async fn delete(bucket: &str, key: &str, account: &str, backend: &dyn BackendClient) -> Result<GatewayResponse, S3Error> {
    let resp = backend.send(BackendRequest::new(Method::DELETE, format!("/v1/{account}/{bucket}/{key}"))).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        StatusCode::NO_CONTENT => Ok(GatewayResponse::empty(StatusCode::NO_CONTENT)),
        StatusCode::NOT_FOUND => Err(s3_error!(NoSuchKey, "no such key: {key}")),
        other => Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }
}

/// Keeps only the headers an S3 client is allowed to see, remapping object
/// metadata back into the `x-amz-meta-*` namespace.
fn remap_response_headers(headers: &HeaderMap) -> HeaderMap {
    const PASSTHROUGH: &[&str] = &["content-length", "content-type", "content-range", "content-encoding", "etag", "last-modified"];
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let name_str = name.as_str();
        if let Some(renamed) = remap_prefix(name_str, "x-object-meta-", "x-amz-meta-") {
            out.insert(http::header::HeaderName::from_bytes(renamed.as_bytes()).unwrap(), value.clone());
        } else if PASSTHROUGH.contains(&name_str) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}
