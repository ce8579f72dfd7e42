//! Bucket name validation.

use std::net::Ipv4Addr;
use std::str::FromStr;

/// Validates a bucket name against the classic S3 naming rules:
///
/// - length between 3 and 63
/// - no underscores
/// - starts and ends with a lowercase letter or digit
/// - no `..`, `.-`, or `-.`
/// - does not look like a dotted-quad IPv4 address
///
/// ```
/// # use s3gw::validation::validate_bucket_name;
/// assert!(validate_bucket_name("my-bucket"));
/// assert!(!validate_bucket_name("my_bucket"));
/// assert!(!validate_bucket_name("ab"));
/// assert!(!validate_bucket_name("1.2.3.4"));
/// ```
#[must_use]
pub fn validate_bucket_name(name: &str) -> bool {
    if name.len() < 3 || name.len() > 63 {
        return false;
    }
    if name.contains('_') {
        return false;
    }
    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return false;
    }

    let bytes = name.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_alphanumeric();
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }

    if looks_like_ipv4(name) {
        return false;
    }

    true
}

fn looks_like_ipv4(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    if !parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())) {
        return false;
    }
    Ipv4Addr::from_str(name).is_ok()
}
