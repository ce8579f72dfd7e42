//! Bucket-level operations: listing, location/versioning/logging
//! subresources, ACL, creation, and deletion.

use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::Deserialize;

use crate::acl::{self, AclDocument, BackendAclHeader};
use crate::backend::{BackendClient, BackendRequest, Body};
use crate::config::GatewayConfig;
use crate::xml::{self, ListingEntry, VersionEntry};
use crate::{S3Error, s3_error};

use super::{GatewayRequest, GatewayResponse, common_error};

/// Backend listing names travel percent-encoded; decode before the name
/// reaches XML escaping, matching the reference middleware's `unquote()`
/// ahead of `xml_escape()` on every listed name.
fn decode_listing_name(raw: &str) -> String {
    urlencoding::decode(raw).map(std::borrow::Cow::into_owned).unwrap_or_else(|_| raw.to_owned())
}

pub async fn handle(bucket: &str, req: GatewayRequest, backend: &dyn BackendClient, config: &GatewayConfig) -> Result<GatewayResponse, S3Error> {
    match req.method {
        Method::GET => get(bucket, req, backend, config).await,
        Method::PUT => put(bucket, req, backend, config).await,
        Method::DELETE => delete(bucket, req, backend).await,
        Method::POST => Err(s3_error!(Unsupported, "POST is not supported on a bucket")),
        _ => Err(s3_error!(InvalidURI, "unsupported method on a bucket")),
    }
}

#[derive(Deserialize)]
struct BackendListingItem {
    name: Option<String>,
    subdir: Option<String>,
    hash: Option<String>,
    bytes: Option<u64>,
    last_modified: Option<String>,
    #[serde(default)]
    deleted: bool,
    version_id: Option<String>,
    owner: Option<String>,
}

async fn get(bucket: &str, req: GatewayRequest, backend: &dyn BackendClient, config: &GatewayConfig) -> Result<GatewayResponse, S3Error> {
    let requested_max_keys: u32 = match req.query_param("max-keys") {
        Some(s) => s.parse().map_err(|_| s3_error!(InvalidArgument, "max-keys must be a non-negative integer"))?,
        None => config.max_keys_limit,
    };
    let max_keys = requested_max_keys.min(config.max_keys_limit);

    if req.has_query_param("acl") {
        return get_acl(bucket, &req.account, backend).await;
    }

    // location/versioning/logging all read off the same listing response the
    // default listing branch below uses, rather than issuing their own call.
    let mut backend_req = BackendRequest::new(Method::GET, format!("/v1/{}/{bucket}", req.account))
        .with_query("format", Some("json".to_owned()))
        .with_query("limit", Some((max_keys + 1).to_string()));
    if let Some(prefix) = req.query_param("prefix") {
        backend_req = backend_req.with_query("prefix", Some(prefix.to_owned()));
    }
    if let Some(marker) = req.query_param("marker") {
        backend_req = backend_req.with_query("marker", Some(marker.to_owned()));
    }
    if let Some(delimiter) = req.query_param("delimiter") {
        backend_req = backend_req.with_query("delimiter", Some(delimiter.to_owned()));
    }
    let list_versions = req.has_query_param("versions");
    if list_versions {
        backend_req = backend_req.with_query("versions", None);
    }

    let resp = backend.send(backend_req).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        StatusCode::OK | StatusCode::NO_CONTENT => {}
        StatusCode::NOT_FOUND => return Err(s3_error!(NoSuchBucket, "no such bucket: {bucket}")),
        other => return Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }

    if req.has_query_param("location") {
        return Ok(GatewayResponse::xml(StatusCode::OK, xml::location_constraint(&config.location)));
    }
    if req.has_query_param("versioning") {
        let status = resp
            .headers
            .get("x-container-versioning")
            .and_then(|v| v.to_str().ok())
            .map(|v| if v.eq_ignore_ascii_case("enabled") { "Enabled" } else { "Suspended" });
        return Ok(GatewayResponse::xml(StatusCode::OK, xml::versioning_configuration(status)));
    }
    if req.has_query_param("logging") {
        return Ok(GatewayResponse::xml(StatusCode::OK, xml::bucket_logging_status()));
    }

    let bytes = resp.body.into_bytes().await.map_err(S3Error::internal)?;
    let items: Vec<BackendListingItem> = if bytes.is_empty() { Vec::new() } else { serde_json::from_slice(&bytes).map_err(S3Error::internal)? };

    let is_truncated = max_keys > 0 && items.len() as u32 == max_keys + 1;
    let items = if is_truncated { &items[..items.len() - 1] } else { &items[..] };

    if list_versions {
        let entries: Vec<VersionEntry> = items
            .iter()
            .filter_map(|item| {
                let key = decode_listing_name(item.name.as_deref()?);
                let version_id = item.version_id.clone().unwrap_or_default();
                if item.deleted {
                    Some(VersionEntry::DeleteMarker {
                        key,
                        version_id,
                        is_latest: true,
                        last_modified: item.last_modified.clone().unwrap_or_default(),
                    })
                } else {
                    Some(VersionEntry::Version {
                        key,
                        version_id,
                        is_latest: true,
                        last_modified: item.last_modified.clone().unwrap_or_default(),
                        etag: item.hash.clone().unwrap_or_default(),
                        size: item.bytes.unwrap_or(0),
                    })
                }
            })
            .collect();
        let xml = xml::list_versions_result(bucket, &req.account, &entries);
        return Ok(GatewayResponse::xml(StatusCode::OK, xml));
    }

    let entries: Vec<ListingEntry> = items
        .iter()
        .map(|item| match (&item.subdir, &item.name) {
            (Some(subdir), _) => ListingEntry::CommonPrefix { prefix: decode_listing_name(subdir) },
            (None, Some(name)) => ListingEntry::Object {
                key: decode_listing_name(name),
                last_modified: item.last_modified.clone().unwrap_or_default(),
                etag: item.hash.clone().unwrap_or_default(),
                size: item.bytes.unwrap_or(0),
                owner: item.owner.clone(),
            },
            (None, None) => ListingEntry::CommonPrefix { prefix: String::new() },
        })
        .collect();

    let xml = xml::list_bucket_result(
        bucket,
        req.query_param("prefix").unwrap_or(""),
        req.query_param("marker").unwrap_or(""),
        max_keys,
        is_truncated,
        &req.account,
        &entries,
    );
    Ok(GatewayResponse::xml(StatusCode::OK, xml))
}

async fn get_acl(bucket: &str, account: &str, backend: &dyn BackendClient) -> Result<GatewayResponse, S3Error> {
    let resp = backend.send(BackendRequest::new(Method::HEAD, format!("/v1/{account}/{bucket}"))).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    if resp.status == StatusCode::NOT_FOUND {
        return Err(s3_error!(NoSuchBucket, "no such bucket: {bucket}"));
    }

    let owner = resp.headers.get("x-container-owner").and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned();
    let backend_headers: Vec<(String, String)> =
        resp.headers.iter().map(|(k, v)| (k.as_str().to_owned(), v.to_str().unwrap_or_default().to_owned())).collect();
    let view: Vec<BackendAclHeader<'_>> = backend_headers.iter().map(|(k, v)| BackendAclHeader { header_name: k, value: v }).collect();
    let grants = acl::headers_to_grants(&view, false);

    let doc = AclDocument { owner_id: owner.clone(), owner_display_name: Some(owner), grants };
    Ok(GatewayResponse::xml(StatusCode::OK, xml::access_control_policy(&doc)))
}

async fn put(bucket: &str, req: GatewayRequest, backend: &dyn BackendClient, config: &GatewayConfig) -> Result<GatewayResponse, S3Error> {
    if req.has_query_param("acl") {
        return put_acl(bucket, req, backend, config).await;
    }
    if req.has_query_param("versioning") {
        return put_versioning(bucket, req, backend).await;
    }

    if let Some(len) = req.headers.get(http::header::CONTENT_LENGTH) {
        len.to_str().ok().and_then(|s| s.parse::<u64>().ok()).ok_or_else(|| s3_error!(InvalidArgument, "invalid Content-Length"))?;
    }

    let mut headers = req.headers.clone();
    if let Some(canned) = req.headers.get("x-amz-acl").and_then(|v| v.to_str().ok()) {
        let acl_headers = acl::canned_acl_headers(canned).map_err(|e| match e {
            acl::CannedAclError::Unsupported => s3_error!(Unsupported, "canned ACL {canned} is not supported"),
            acl::CannedAclError::Invalid => s3_error!(InvalidArgument, "invalid canned ACL {canned}"),
        })?;
        headers.remove("x-amz-acl");
        for (k, v) in acl_headers {
            headers.insert(http::header::HeaderName::from_bytes(k.as_bytes()).unwrap(), HeaderValue::from_str(&v).unwrap());
        }
    }

    let mut backend_req = BackendRequest::new(Method::PUT, format!("/v1/{}/{bucket}", req.account));
    backend_req.headers = headers;

    let resp = backend.send(backend_req).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        StatusCode::CREATED | StatusCode::NO_CONTENT => {
            let mut headers = HeaderMap::new();
            headers.insert(http::header::LOCATION, HeaderValue::from_str(bucket).unwrap());
            Ok(GatewayResponse { status: StatusCode::OK, headers, body: Body::Empty })
        }
        StatusCode::ACCEPTED => Err(s3_error!(BucketAlreadyExists, "bucket {bucket} already exists")),
        other => Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }
}

async fn put_acl(bucket: &str, req: GatewayRequest, backend: &dyn BackendClient, config: &GatewayConfig) -> Result<GatewayResponse, S3Error> {
    let account = req.account.clone();
    let bytes = req.body.into_bytes().await.map_err(S3Error::internal)?;
    if bytes.is_empty() {
        return Err(s3_error!(MalformedACLError, "missing ACL body"));
    }
    let doc = acl::parse_access_control_policy(&bytes)?;
    let acl_headers = acl::acp_to_headers(&doc, false, &config.authenticated_users_sentinel);

    let mut backend_req = BackendRequest::new(Method::POST, format!("/v1/{account}/{bucket}"));
    for (k, v) in acl_headers {
        let value = HeaderValue::from_str(&v).map_err(|_| s3_error!(MalformedACLError, "grantee identifier is not valid header text"))?;
        backend_req.headers.insert(http::header::HeaderName::from_bytes(k.as_bytes()).unwrap(), value);
    }

    let resp = backend.send(backend_req).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(GatewayResponse::empty(StatusCode::OK)),
        StatusCode::ACCEPTED => Err(s3_error!(BucketAlreadyExists, "bucket {bucket} already exists")),
        StatusCode::NOT_FOUND => Err(s3_error!(NoSuchBucket, "no such bucket: {bucket}")),
        other => Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }
}

async fn put_versioning(bucket: &str, req: GatewayRequest, backend: &dyn BackendClient) -> Result<GatewayResponse, S3Error> {
    let account = req.account.clone();
    let bytes = req.body.into_bytes().await.map_err(S3Error::internal)?;
    let body = String::from_utf8_lossy(&bytes);
    let value = if body.contains("Enabled") {
        "enabled"
    } else if body.contains("Suspended") {
        "suspended"
    } else {
        return Err(s3_error!(IllegalVersioningConfigurationException, "invalid versioning configuration"));
    };

    let mut backend_req = BackendRequest::new(Method::POST, format!("/v1/{account}/{bucket}"));
    backend_req.headers.insert("x-container-versioning", HeaderValue::from_static(if value == "enabled" { "enabled" } else { "suspended" }));

    let resp = backend.send(backend_req).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(GatewayResponse::empty(StatusCode::OK)),
        StatusCode::ACCEPTED => Err(s3_error!(BucketAlreadyExists, "bucket {bucket} already exists")),
        StatusCode::NOT_FOUND => Err(s3_error!(NoSuchBucket, "no such bucket: {bucket}")),
        other => Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }
}

async fn delete(bucket: &str, req: GatewayRequest, backend: &dyn BackendClient) -> Result<GatewayResponse, S3Error> {
    let resp = backend.send(BackendRequest::new(Method::DELETE, format!("/v1/{}/{bucket}", req.account))).await?;
    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    match resp.status {
        StatusCode::NO_CONTENT => Ok(GatewayResponse::empty(StatusCode::NO_CONTENT)),
        StatusCode::NOT_FOUND => Err(s3_error!(NoSuchBucket, "no such bucket: {bucket}")),
        StatusCode::CONFLICT => Err(s3_error!(BucketNotEmpty, "bucket {bucket} is not empty")),
        other => Err(s3_error!(InvalidURI, "unexpected backend status {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedBackend {
        responses: Mutex<Vec<BackendResponse>>,
    }

    #[async_trait]
    impl BackendClient for ScriptedBackend {
        async fn send(&self, _req: BackendRequest) -> Result<BackendResponse, S3Error> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn empty_req(method: Method, query: Vec<(&str, Option<&str>)>) -> GatewayRequest {
        GatewayRequest {
            method,
            query: query.into_iter().map(|(k, v)| (k.to_owned(), v.map(str::to_owned))).collect(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            account: "acct".to_owned(),
        }
    }

    #[tokio::test]
    async fn listing_decodes_percent_encoded_names_before_escaping() {
        let items = vec![serde_json::json!({"name": "a%2Fb%20c.txt", "bytes": 1, "hash": "h"})];
        let backend = ScriptedBackend {
            responses: Mutex::new(vec![BackendResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Body::from_bytes(serde_json::to_vec(&items).unwrap()),
            }]),
        };
        let req = empty_req(Method::GET, vec![]);
        let resp = get("bucket", req, &backend, &GatewayConfig::default()).await.unwrap();
        let xml = String::from_utf8(resp.body.into_bytes().await.unwrap().to_vec()).unwrap();
        assert!(xml.contains("<Key>a/b c.txt</Key>"));
    }

    #[tokio::test]
    async fn listing_is_truncated_when_backend_returns_limit_plus_one() {
        let items: Vec<serde_json::Value> = (0..2).map(|i| serde_json::json!({"name": format!("k{i}"), "bytes": 1, "hash": "h"})).collect();
        let backend = ScriptedBackend {
            responses: Mutex::new(vec![BackendResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Body::from_bytes(serde_json::to_vec(&items).unwrap()),
            }]),
        };
        let config = GatewayConfig { max_keys_limit: 1000, ..GatewayConfig::default() };
        let req = empty_req(Method::GET, vec![("max-keys", Some("1"))]);
        let resp = get("bucket", req, &backend, &config).await.unwrap();
        let xml = String::from_utf8(resp.body.into_bytes().await.unwrap().to_vec()).unwrap();
        assert!(xml.contains("<IsTruncated>true</IsTruncated>"));
        assert!(xml.contains("<Key>k0</Key>"));
        assert!(!xml.contains("<Key>k1</Key>"));
    }

    #[tokio::test]
    async fn get_logging_on_missing_bucket_is_no_such_bucket() {
        let backend = ScriptedBackend {
            responses: Mutex::new(vec![BackendResponse { status: StatusCode::NOT_FOUND, headers: HeaderMap::new(), body: Body::Empty }]),
        };
        let req = empty_req(Method::GET, vec![("logging", None)]);
        let err = get("bucket", req, &backend, &GatewayConfig::default()).await.unwrap_err();
        assert_eq!(err.code().as_str(), "NoSuchBucket");
    }

    #[tokio::test]
    async fn get_location_reads_off_the_shared_listing_call() {
        let backend = ScriptedBackend {
            responses: Mutex::new(vec![BackendResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Body::from_bytes(b"[]".to_vec()),
            }]),
        };
        let req = empty_req(Method::GET, vec![("location", None)]);
        let resp = get("bucket", req, &backend, &GatewayConfig::default()).await.unwrap();
        let xml = String::from_utf8(resp.body.into_bytes().await.unwrap().to_vec()).unwrap();
        assert!(xml.contains("LocationConstraint"));
    }

    #[tokio::test]
    async fn get_location_with_invalid_max_keys_is_invalid_argument_before_any_backend_call() {
        let backend = ScriptedBackend { responses: Mutex::new(vec![]) };
        let req = empty_req(Method::GET, vec![("location", None), ("max-keys", Some("abc"))]);
        let err = get("bucket", req, &backend, &GatewayConfig::default()).await.unwrap_err();
        assert_eq!(err.code().as_str(), "InvalidArgument");
    }

    #[tokio::test]
    async fn delete_maps_conflict_to_bucket_not_empty() {
        let backend = ScriptedBackend {
            responses: Mutex::new(vec![BackendResponse { status: StatusCode::CONFLICT, headers: HeaderMap::new(), body: Body::Empty }]),
        };
        let req = empty_req(Method::DELETE, vec![]);
        let err = delete("bucket", req, &backend).await.unwrap_err();
        assert_eq!(err.code().as_str(), "BucketNotEmpty");
    }

    #[tokio::test]
    async fn put_with_unknown_canned_acl_is_invalid_argument() {
        let backend = ScriptedBackend { responses: Mutex::new(vec![]) };
        let mut req = empty_req(Method::PUT, vec![]);
        req.headers.insert("x-amz-acl", HeaderValue::from_static("bogus"));
        let err = put("bucket", req, &backend, &GatewayConfig::default()).await.unwrap_err();
        assert_eq!(err.code().as_str(), "InvalidArgument");
    }

    #[tokio::test]
    async fn put_versioning_with_unrecognized_body_is_illegal_configuration() {
        let backend = ScriptedBackend { responses: Mutex::new(vec![]) };
        let mut req = empty_req(Method::PUT, vec![("versioning", None)]);
        req.body = Body::from_bytes(b"<VersioningConfiguration/>".to_vec());
        let err = put_versioning("bucket", req, &backend).await.unwrap_err();
        assert_eq!(err.code().as_str(), "IllegalVersioningConfigurationException");
    }

    #[tokio::test]
    async fn put_acl_with_accepted_backend_status_is_bucket_already_exists() {
        let backend = ScriptedBackend {
            responses: Mutex::new(vec![BackendResponse { status: StatusCode::ACCEPTED, headers: HeaderMap::new(), body: Body::Empty }]),
        };
        let mut req = empty_req(Method::PUT, vec![("acl", None)]);
        req.body = Body::from_bytes(
            br#"<AccessControlPolicy><Owner><ID>acct</ID></Owner><AccessControlList>
                <Grant><Grantee xsi:type="CanonicalUser"><ID>alice</ID></Grantee><Permission>READ</Permission></Grant>
                </AccessControlList></AccessControlPolicy>"#
                .to_vec(),
        );
        let err = put_acl("bucket", req, &backend, &GatewayConfig::default()).await.unwrap_err();
        assert_eq!(err.code().as_str(), "BucketAlreadyExists");
    }

    #[tokio::test]
    async fn put_versioning_with_accepted_backend_status_is_bucket_already_exists() {
        let backend = ScriptedBackend {
            responses: Mutex::new(vec![BackendResponse { status: StatusCode::ACCEPTED, headers: HeaderMap::new(), body: Body::Empty }]),
        };
        let mut req = empty_req(Method::PUT, vec![("versioning", None)]);
        req.body = Body::from_bytes(b"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>".to_vec());
        let err = put_versioning("bucket", req, &backend).await.unwrap_err();
        assert_eq!(err.code().as_str(), "BucketAlreadyExists");
    }

    struct RecordingBackend {
        seen_path: Mutex<Option<String>>,
        seen_headers: Mutex<Option<HeaderMap>>,
        response: Mutex<Option<BackendResponse>>,
    }

    impl RecordingBackend {
        fn new(response: BackendResponse) -> Self {
            Self { seen_path: Mutex::new(None), seen_headers: Mutex::new(None), response: Mutex::new(Some(response)) }
        }
    }

    #[async_trait]
    impl BackendClient for RecordingBackend {
        async fn send(&self, req: BackendRequest) -> Result<BackendResponse, S3Error> {
            *self.seen_path.lock().unwrap() = Some(req.path);
            *self.seen_headers.lock().unwrap() = Some(req.headers);
            Ok(self.response.lock().unwrap().take().expect("mock backend called more than once"))
        }
    }

    #[tokio::test]
    async fn put_acl_targets_the_account_scoped_backend_path() {
        let backend = RecordingBackend::new(BackendResponse { status: StatusCode::NO_CONTENT, headers: HeaderMap::new(), body: Body::Empty });
        let mut req = empty_req(Method::PUT, vec![("acl", None)]);
        req.account = "acct".to_owned();
        req.body = Body::from_bytes(
            br#"<AccessControlPolicy><Owner><ID>acct</ID></Owner><AccessControlList>
                <Grant><Grantee xsi:type="CanonicalUser"><ID>alice</ID></Grantee><Permission>FULL_CONTROL</Permission></Grant>
                </AccessControlList></AccessControlPolicy>"#
                .to_vec(),
        );
        put_acl("bucket", req, &backend, &GatewayConfig::default()).await.unwrap();
        assert_eq!(backend.seen_path.lock().unwrap().as_deref(), Some("/v1/acct/bucket"));
    }

    #[tokio::test]
    async fn put_acl_with_unprintable_grantee_id_is_malformed_acl_not_a_panic() {
        let backend = ScriptedBackend { responses: Mutex::new(vec![]) };
        let mut req = empty_req(Method::PUT, vec![("acl", None)]);
        req.body = Body::from_bytes(
            b"<AccessControlPolicy><Owner><ID>acct</ID></Owner><AccessControlList>\
              <Grant><Grantee xsi:type=\"CanonicalUser\"><ID>bad\nid</ID></Grantee><Permission>READ</Permission></Grant>\
              </AccessControlList></AccessControlPolicy>"
                .to_vec(),
        );
        let err = put_acl("bucket", req, &backend, &GatewayConfig::default()).await.unwrap_err();
        assert_eq!(err.code().as_str(), "MalformedACLError");
    }

    #[tokio::test]
    async fn plain_put_targets_the_account_scoped_backend_path() {
        let backend = RecordingBackend::new(BackendResponse { status: StatusCode::CREATED, headers: HeaderMap::new(), body: Body::Empty });
        let req = empty_req(Method::PUT, vec![]);
        put("bucket", req, &backend, &GatewayConfig::default()).await.unwrap();
        assert_eq!(backend.seen_path.lock().unwrap().as_deref(), Some("/v1/acct/bucket"));
    }

    #[tokio::test]
    async fn plain_put_forwards_untransformed_headers_alongside_canned_acl_headers() {
        let backend = RecordingBackend::new(BackendResponse { status: StatusCode::CREATED, headers: HeaderMap::new(), body: Body::Empty });
        let mut req = empty_req(Method::PUT, vec![]);
        req.headers.insert("x-amz-acl", HeaderValue::from_static("public-read"));
        req.headers.insert("cache-control", HeaderValue::from_static("max-age=3600"));
        put("bucket", req, &backend, &GatewayConfig::default()).await.unwrap();
        let seen = backend.seen_headers.lock().unwrap().take().unwrap();
        assert_eq!(seen.get("cache-control").unwrap(), "max-age=3600");
        assert!(seen.get("x-container-read").is_some());
        assert!(seen.get("x-amz-acl").is_none());
    }
}
