//! XML response documents.
//!
//! Every document is built through [`quick_xml::Writer`] rather than string
//! interpolation, so every element is guaranteed to close — a plain
//! string-templated `LocationConstraint` is an easy place to drop a closing
//! `>` on the empty-body branch, and this module structurally rules that out.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::BytesText;

use crate::acl::{AclDocument, Grant, Grantee};

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

fn new_writer() -> Writer<Cursor<Vec<u8>>> {
    Writer::new(Cursor::new(Vec::new()))
}

fn finish(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).expect("xml writer only emits valid utf-8")
}

fn text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) {
    writer.create_element(name).write_text_content(BytesText::new(text)).expect("write to in-memory buffer cannot fail");
}

/// The standard `<Error>` document.
///
/// ```
/// # use s3gw::xml::error_document;
/// let xml = error_document("NoSuchBucket", "no such bucket");
/// assert!(xml.starts_with("<?xml"));
/// assert!(xml.contains("<Code>NoSuchBucket</Code>"));
/// ```
#[must_use]
pub fn error_document(code: &str, message: &str) -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    w.create_element("Error")
        .write_inner_content::<_, std::convert::Infallible>(|w| {
            text_element(w, "Code", code);
            text_element(w, "Message", message);
            Ok(())
        })
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

/// One entry in `ListAllMyBucketsResult`.
pub struct BucketEntry {
    pub name: String,
    /// Placeholder creation timestamp; the backend does not expose one.
    pub creation_date: &'static str,
}

/// `ListAllMyBucketsResult` for `GET /`.
#[must_use]
pub fn list_all_my_buckets(owner_id: &str, owner_display_name: &str, buckets: &[BucketEntry]) -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    w.create_element("ListAllMyBucketsResult")
        .with_attribute(("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/"))
        .write_inner_content::<_, std::convert::Infallible>(|w| {
            w.create_element("Owner")
                .write_inner_content::<_, std::convert::Infallible>(|w| {
                    text_element(w, "ID", owner_id);
                    text_element(w, "DisplayName", owner_display_name);
                    Ok(())
                })
                .unwrap();
            w.create_element("Buckets")
                .write_inner_content::<_, std::convert::Infallible>(|w| {
                    for b in buckets {
                        w.create_element("Bucket")
                            .write_inner_content::<_, std::convert::Infallible>(|w| {
                                text_element(w, "Name", &b.name);
                                text_element(w, "CreationDate", b.creation_date);
                                Ok(())
                            })
                            .unwrap();
                    }
                    Ok(())
                })
                .unwrap();
            Ok(())
        })
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

/// One entry of a bucket listing.
pub enum ListingEntry {
    Object { key: String, last_modified: String, etag: String, size: u64, owner: Option<String> },
    CommonPrefix { prefix: String },
}

/// `ListBucketResult` for `GET /bucket`.
#[must_use]
pub fn list_bucket_result(
    bucket: &str,
    prefix: &str,
    marker: &str,
    max_keys: u32,
    is_truncated: bool,
    owner_id: &str,
    entries: &[ListingEntry],
) -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    w.create_element("ListBucketResult")
        .with_attribute(("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/"))
        .write_inner_content::<_, std::convert::Infallible>(|w| {
            text_element(w, "Name", bucket);
            text_element(w, "Prefix", prefix);
            text_element(w, "Marker", marker);
            text_element(w, "MaxKeys", &max_keys.to_string());
            text_element(w, "IsTruncated", if is_truncated { "true" } else { "false" });
            for entry in entries {
                match entry {
                    ListingEntry::Object { key, last_modified, etag, size, owner } => {
                        let entry_owner = owner.as_deref().unwrap_or(owner_id);
                        w.create_element("Contents")
                            .write_inner_content::<_, std::convert::Infallible>(|w| {
                                text_element(w, "Key", key);
                                text_element(w, "LastModified", last_modified);
                                text_element(w, "ETag", &format!("\"{etag}\""));
                                text_element(w, "Size", &size.to_string());
                                w.create_element("Owner")
                                    .write_inner_content::<_, std::convert::Infallible>(|w| {
                                        text_element(w, "ID", entry_owner);
                                        text_element(w, "DisplayName", entry_owner);
                                        Ok(())
                                    })
                                    .unwrap();
                                text_element(w, "StorageClass", "STANDARD");
                                Ok(())
                            })
                            .unwrap();
                    }
                    ListingEntry::CommonPrefix { prefix } => {
                        w.create_element("CommonPrefixes")
                            .write_inner_content::<_, std::convert::Infallible>(|w| {
                                text_element(w, "Prefix", prefix);
                                Ok(())
                            })
                            .unwrap();
                    }
                }
            }
            Ok(())
        })
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

/// One entry of a versioned listing.
pub enum VersionEntry {
    Version { key: String, version_id: String, is_latest: bool, last_modified: String, etag: String, size: u64 },
    DeleteMarker { key: String, version_id: String, is_latest: bool, last_modified: String },
}

/// `ListVersionsResult` for `GET /bucket?versions`.
#[must_use]
pub fn list_versions_result(bucket: &str, owner_id: &str, entries: &[VersionEntry]) -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    w.create_element("ListVersionsResult")
        .with_attribute(("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/"))
        .write_inner_content::<_, std::convert::Infallible>(|w| {
            text_element(w, "Name", bucket);
            for entry in entries {
                match entry {
                    VersionEntry::Version { key, version_id, is_latest, last_modified, etag, size } => {
                        w.create_element("Version")
                            .write_inner_content::<_, std::convert::Infallible>(|w| {
                                text_element(w, "Key", key);
                                text_element(w, "VersionId", version_id);
                                text_element(w, "IsLatest", if *is_latest { "true" } else { "false" });
                                text_element(w, "LastModified", last_modified);
                                text_element(w, "ETag", &format!("\"{etag}\""));
                                text_element(w, "Size", &size.to_string());
                                w.create_element("Owner")
                                    .write_inner_content::<_, std::convert::Infallible>(|w| {
                                        text_element(w, "ID", owner_id);
                                        Ok(())
                                    })
                                    .unwrap();
                                Ok(())
                            })
                            .unwrap();
                    }
                    VersionEntry::DeleteMarker { key, version_id, is_latest, last_modified } => {
                        w.create_element("DeleteMarker")
                            .write_inner_content::<_, std::convert::Infallible>(|w| {
                                text_element(w, "Key", key);
                                text_element(w, "VersionId", version_id);
                                text_element(w, "IsLatest", if *is_latest { "true" } else { "false" });
                                text_element(w, "LastModified", last_modified);
                                Ok(())
                            })
                            .unwrap();
                    }
                }
            }
            Ok(())
        })
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

/// `AccessControlPolicy` response for `GET /bucket?acl` or `GET /object?acl`.
#[must_use]
pub fn access_control_policy(doc: &AclDocument) -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    w.create_element("AccessControlPolicy")
        .with_attribute(("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/"))
        .write_inner_content::<_, std::convert::Infallible>(|w| {
            w.create_element("Owner")
                .write_inner_content::<_, std::convert::Infallible>(|w| {
                    text_element(w, "ID", &doc.owner_id);
                    if let Some(name) = &doc.owner_display_name {
                        text_element(w, "DisplayName", name);
                    }
                    Ok(())
                })
                .unwrap();
            w.create_element("AccessControlList")
                .write_inner_content::<_, std::convert::Infallible>(|w| {
                    for grant in &doc.grants {
                        write_grant(w, grant);
                    }
                    Ok(())
                })
                .unwrap();
            Ok(())
        })
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

fn write_grant(w: &mut Writer<Cursor<Vec<u8>>>, grant: &Grant) {
    w.create_element("Grant")
        .write_inner_content::<_, std::convert::Infallible>(|w| {
            match &grant.grantee {
                Grantee::CanonicalUser { id, display_name } => {
                    w.create_element("Grantee")
                        .with_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"))
                        .with_attribute(("xsi:type", "CanonicalUser"))
                        .write_inner_content::<_, std::convert::Infallible>(|w| {
                            text_element(w, "ID", id);
                            if let Some(name) = display_name {
                                text_element(w, "DisplayName", name);
                            }
                            Ok(())
                        })
                        .unwrap();
                }
                Grantee::Group { uri } => {
                    w.create_element("Grantee")
                        .with_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"))
                        .with_attribute(("xsi:type", "Group"))
                        .write_inner_content::<_, std::convert::Infallible>(|w| {
                            text_element(w, "URI", uri);
                            Ok(())
                        })
                        .unwrap();
                }
            }
            text_element(w, "Permission", grant.permission);
            Ok(())
        })
        .unwrap();
}

/// `LocationConstraint` response for `GET /bucket?location`.
///
/// `"US"` renders as an empty element, matching classic S3 default-region
/// behavior. A plain string template for this branch is exactly the bug
/// class this module exists to rule out (a forgotten `>` leaves the document
/// truncated); going through the writer makes that structurally impossible.
///
/// ```
/// # use s3gw::xml::location_constraint;
/// assert!(location_constraint("US").ends_with("<LocationConstraint xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"></LocationConstraint>"));
/// assert!(location_constraint("EU").contains(">EU<"));
/// ```
#[must_use]
pub fn location_constraint(location: &str) -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    let body = if location == "US" { "" } else { location };
    w.create_element("LocationConstraint")
        .with_attribute(("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/"))
        .write_text_content(BytesText::new(body))
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

/// `VersioningConfiguration` response for `GET /bucket?versioning`.
#[must_use]
pub fn versioning_configuration(status: Option<&str>) -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    w.create_element("VersioningConfiguration")
        .with_attribute(("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/"))
        .write_inner_content::<_, std::convert::Infallible>(|w| {
            if let Some(status) = status {
                text_element(w, "Status", status);
            }
            Ok(())
        })
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

/// `BucketLoggingStatus` response for `GET /bucket?logging`. Logging is
/// always reported disabled (an empty element), as the backend has no
/// concept of it.
#[must_use]
pub fn bucket_logging_status() -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    w.create_element("BucketLoggingStatus")
        .with_attribute(("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/"))
        .write_empty()
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

/// `CopyObjectResult` response for a PUT-copy.
#[must_use]
pub fn copy_object_result(etag: &str, last_modified: &str) -> String {
    let mut w = new_writer();
    w.get_mut().get_mut().extend_from_slice(XML_DECL.as_bytes());
    w.create_element("CopyObjectResult")
        .write_inner_content::<_, std::convert::Infallible>(|w| {
            text_element(w, "LastModified", last_modified);
            text_element(w, "ETag", &format!("\"{etag}\""));
            Ok(())
        })
        .expect("write to in-memory buffer cannot fail");
    finish(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_document_is_well_formed() {
        let xml = error_document("NoSuchKey", "the specified key does not exist");
        assert!(xml.starts_with(XML_DECL));
        assert!(xml.contains("<Code>NoSuchKey</Code>"));
        assert!(xml.contains("<Message>the specified key does not exist</Message>"));
        assert!(xml.ends_with("</Error>"));
    }

    #[test]
    fn location_constraint_us_is_empty_but_well_formed() {
        let xml = location_constraint("US");
        assert!(xml.ends_with("<LocationConstraint xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"></LocationConstraint>"));
    }

    #[test]
    fn location_constraint_other_region_has_text() {
        let xml = location_constraint("EU");
        assert!(xml.contains(">EU<"));
    }

    #[test]
    fn list_all_my_buckets_contains_each_bucket() {
        let xml = list_all_my_buckets(
            "acct",
            "acct",
            &[BucketEntry { name: "b1".to_owned(), creation_date: "2009-02-03T16:45:09.000Z" }],
        );
        assert!(xml.contains("<Name>b1</Name>"));
        assert!(xml.contains("<CreationDate>2009-02-03T16:45:09.000Z</CreationDate>"));
    }

    #[test]
    fn list_bucket_reports_truncation_flag() {
        let entries =
            vec![ListingEntry::Object { key: "a".to_owned(), last_modified: "now".to_owned(), etag: "abc".to_owned(), size: 1, owner: None }];
        let xml = list_bucket_result("b", "", "", 1, true, "acct", &entries);
        assert!(xml.contains("<IsTruncated>true</IsTruncated>"));
        assert!(xml.contains("<Key>a</Key>"));
    }

    #[test]
    fn list_bucket_contents_owner_falls_back_to_account() {
        let entries = vec![
            ListingEntry::Object {
                key: "a".to_owned(),
                last_modified: "now".to_owned(),
                etag: "abc".to_owned(),
                size: 1,
                owner: Some("alice".to_owned()),
            },
            ListingEntry::Object { key: "b".to_owned(), last_modified: "now".to_owned(), etag: "def".to_owned(), size: 2, owner: None },
        ];
        let xml = list_bucket_result("bucket", "", "", 10, false, "acct", &entries);
        assert!(xml.contains("<ID>alice</ID>"));
        assert!(xml.contains("<ID>acct</ID>"));
    }

    #[test]
    fn access_control_policy_renders_group_and_user_grants() {
        let doc = AclDocument {
            owner_id: "acct".to_owned(),
            owner_display_name: Some("acct".to_owned()),
            grants: vec![
                Grant { grantee: Grantee::CanonicalUser { id: "alice".to_owned(), display_name: None }, permission: "READ" },
                Grant { grantee: Grantee::Group { uri: "http://acs.amazonaws.com/groups/global/AllUsers".to_owned() }, permission: "READ" },
            ],
        };
        let xml = access_control_policy(&doc);
        assert!(xml.contains("xsi:type=\"CanonicalUser\""));
        assert!(xml.contains("xsi:type=\"Group\""));
        assert!(xml.contains("<ID>alice</ID>"));
    }
}
