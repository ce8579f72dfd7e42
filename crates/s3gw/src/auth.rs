//! Signature extraction, canonical string construction, and clock-skew
//! checking.
//!
//! This gateway does not verify signatures itself — the backend is the trust
//! root. Its job is to canonicalize the request exactly the way the client
//! signed it and forward that canonical form as an opaque token.

use std::time::Duration;

use base64_simd::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method};

use crate::header::AmzHeaders;
use crate::{S3Error, s3_error};

/// The parsed `Authorization: AWS <account>:<signature>` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub signature: String,
}

/// Parses `AWS <account>:<signature>`.
///
/// The account portion may itself contain a `:` (tenant:user); the split
/// point is the rightmost colon, matching the reference middleware.
///
/// ```
/// # use s3gw::auth::parse_authorization_header;
/// let creds = parse_authorization_header("AWS test:tester:abc123").unwrap();
/// assert_eq!(creds.account, "test:tester");
/// assert_eq!(creds.signature, "abc123");
/// ```
pub fn parse_authorization_header(value: &str) -> Result<Credentials, S3Error> {
    let rest = value.strip_prefix("AWS ").ok_or_else(|| s3_error!(AccessDenied, "not an AWS signature"))?;
    let idx = rest.rfind(':').ok_or_else(|| s3_error!(InvalidArgument, "malformed Authorization header"))?;
    let (account, signature) = rest.split_at(idx);
    let signature = &signature[1..];
    if account.is_empty() || signature.is_empty() {
        return Err(s3_error!(InvalidArgument, "malformed Authorization header"));
    }
    Ok(Credentials { account: account.to_owned(), signature: signature.to_owned() })
}

/// Synthesizes an `Authorization` header from the presigned-URL query
/// parameters `AWSAccessKeyId` and `Signature`, as used by browser-style
/// presigned GET requests.
pub fn synthesize_authorization(access_key_id: &str, signature: Option<&str>) -> Result<String, S3Error> {
    let signature = signature.ok_or_else(|| s3_error!(InvalidArgument, "missing Signature query parameter"))?;
    Ok(format!("AWS {access_key_id}:{signature}"))
}

/// Checks `date` against `now`, allowing up to `max_skew` in either
/// direction.
///
/// A `date` before the Unix epoch is rejected as `AccessDenied` rather than
/// `RequestTimeTooSkewed` — it is not a "your clock is off" situation but a
/// nonsensical timestamp, matching the reference middleware's explicit
/// epoch check ahead of its skew comparison.
pub fn check_clock_skew(date: DateTime<Utc>, now: DateTime<Utc>, max_skew: Duration) -> Result<(), S3Error> {
    if date < DateTime::UNIX_EPOCH {
        return Err(s3_error!(AccessDenied, "Date header predates the Unix epoch"));
    }

    let skew = (now - date).abs();
    let max_skew = chrono::Duration::from_std(max_skew).unwrap_or(chrono::Duration::MAX);
    if skew > max_skew {
        return Err(s3_error!(RequestTimeTooSkewed, "the difference between the request time and the current time is too large"));
    }
    Ok(())
}

/// Parses an RFC 2822 `Date` header value.
pub fn parse_date_header(value: &str) -> Result<DateTime<Utc>, S3Error> {
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| s3_error!(AccessDenied, "invalid Date header"))
}

/// The closed set of sub-resources that participate in the canonical
/// resource string.
const CANONICAL_SUB_RESOURCES: &[&str] =
    &["acl", "location", "logging", "requestPayment", "torrent", "versionId", "versioning", "versions"];

/// Builds the `StringToSign` for a request, per the fixed format:
///
/// ```text
/// METHOD "\n"
/// Content-MD5-or-empty "\n"
/// Content-Type-or-empty "\n"
/// Date-or-empty "\n"
/// sorted "x-amz-*" header lines, each terminated by "\n"
/// CanonicalResource
/// ```
///
/// `x-amz-date`, when present, takes over the `Date` slot and the `Date`
/// slot itself is left empty.
pub fn canonical_string(method: &Method, headers: &HeaderMap, canonical_resource: &str) -> String {
    let content_md5 = header_str(headers, "content-md5");
    let content_type = header_str(headers, "content-type");
    let date = if headers.contains_key("x-amz-date") { "" } else { header_str(headers, "date") };

    let mut s = String::new();
    s.push_str(method.as_str());
    s.push('\n');
    s.push_str(content_md5);
    s.push('\n');
    s.push_str(content_type);
    s.push('\n');
    s.push_str(date);
    s.push('\n');

    let amz = AmzHeaders::from_headers(headers);
    for line in amz.canonical_lines() {
        s.push_str(&line);
        s.push('\n');
    }

    s.push_str(canonical_resource);
    s
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

/// Builds the canonical resource: the request path with the object-name
/// segment's `/` re-encoded as `%2F`, plus any recognized sub-resources from
/// the query string, appended in sorted key order.
///
/// ```
/// # use s3gw::auth::canonical_resource;
/// let qs = [("acl".to_owned(), None), ("max-keys".to_owned(), Some("10".to_owned()))];
/// assert_eq!(canonical_resource("/bucket/key", &qs), "/bucket/key?acl");
/// ```
#[must_use]
pub fn canonical_resource(path: &str, query: &[(String, Option<String>)]) -> String {
    let mut parts: Vec<&str> = path.splitn(3, '/').filter(|s| !s.is_empty()).collect();
    let encoded_path = if parts.len() == 2 {
        let object = parts.pop().unwrap();
        let bucket = parts.pop().unwrap();
        format!("/{bucket}/{}", object.replace('/', "%2F"))
    } else {
        format!("/{}", parts.join("/"))
    };

    let mut selected: Vec<(&str, &Option<String>)> =
        query.iter().filter(|(k, _)| CANONICAL_SUB_RESOURCES.contains(&k.as_str())).map(|(k, v)| (k.as_str(), v)).collect();
    selected.sort_by_key(|(k, _)| *k);

    if selected.is_empty() {
        return encoded_path;
    }

    let rendered = selected
        .into_iter()
        .map(|(k, v)| match v {
            Some(v) if !v.is_empty() => format!("{k}={v}"),
            _ => k.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{encoded_path}?{rendered}")
}

/// Encodes the canonical string as the opaque backend auth token.
#[must_use]
pub fn encode_token(canonical: &str) -> String {
    URL_SAFE_NO_PAD.encode_to_string(canonical.as_bytes())
}
