//! Header helpers used while building the canonical string and while
//! remapping object metadata headers.

use std::borrow::Cow;

use http::HeaderMap;

/// The lowercased, sorted `x-amz-*` headers of a request, the shape the
/// canonical string needs.
///
/// Multi-valued headers are joined with a comma, matching how the reference
/// middleware folds repeated headers before signing.
pub struct AmzHeaders<'a> {
    pairs: Vec<(Cow<'a, str>, String)>,
}

impl<'a> AmzHeaders<'a> {
    /// Collects and sorts every `x-amz-*` header (case-insensitively) from
    /// `headers`, excluding `x-amz-date` which the canonical string treats
    /// specially.
    ///
    /// ```
    /// # use http::{HeaderMap, HeaderValue};
    /// # use s3gw::header::AmzHeaders;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("X-Amz-Meta-Foo", HeaderValue::from_static("bar"));
    /// headers.insert("X-Amz-Acl", HeaderValue::from_static("private"));
    /// let amz = AmzHeaders::from_headers(&headers);
    /// let lines: Vec<_> = amz.canonical_lines().collect();
    /// assert_eq!(lines, vec!["x-amz-acl:private".to_owned(), "x-amz-meta-foo:bar".to_owned()]);
    /// ```
    #[must_use]
    pub fn from_headers(headers: &'a HeaderMap) -> Self {
        let mut pairs: Vec<(Cow<'a, str>, String)> = Vec::new();
        for (name, value) in headers {
            let name = name.as_str();
            if !name.starts_with("x-amz-") || name == "x-amz-date" {
                continue;
            }
            let value = value.to_str().unwrap_or_default();
            if let Some(existing) = pairs.iter_mut().find(|(n, _)| n == name) {
                existing.1.push(',');
                existing.1.push_str(value);
            } else {
                pairs.push((Cow::Borrowed(name), value.to_owned()));
            }
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Self { pairs }
    }

    /// Yields `"key:value"` lines in sorted order, as they appear in the
    /// canonical string.
    pub fn canonical_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.pairs.iter().map(|(k, v)| format!("{k}:{v}"))
    }
}

/// Renames every header with prefix `from` to the same suffix under `to`,
/// returning the new header name when a match is found.
///
/// Used both for `x-amz-meta-*` &harr; `x-object-meta-*` translation.
#[must_use]
pub fn remap_prefix(name: &str, from: &str, to: &str) -> Option<String> {
    name.strip_prefix(from).map(|suffix| format!("{to}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn excludes_amz_date() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-date", HeaderValue::from_static("20260101T000000Z"));
        headers.insert("x-amz-acl", HeaderValue::from_static("private"));
        let amz = AmzHeaders::from_headers(&headers);
        let lines: Vec<_> = amz.canonical_lines().collect();
        assert_eq!(lines, vec!["x-amz-acl:private".to_owned()]);
    }

    #[test]
    fn remap_prefix_rewrites_matching_header() {
        assert_eq!(
            remap_prefix("x-amz-meta-foo", "x-amz-meta-", "x-object-meta-"),
            Some("x-object-meta-foo".to_owned())
        );
        assert_eq!(remap_prefix("content-type", "x-amz-meta-", "x-object-meta-"), None);
    }
}
