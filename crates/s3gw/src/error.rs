//! The gateway's error taxonomy and its XML wire representation.
//!
//! Every fallible path in this crate returns [`S3Error`]. Controllers never
//! panic and never return a raw HTTP status; they pick one of the codes in
//! [`S3ErrorCode`] and the HTTP layer renders it as the standard S3 error
//! document.

use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;

/// Convenience alias used throughout the crate.
pub type S3Result<T, E = S3Error> = Result<T, E>;

/// Builds an [`S3Error`] from one of the known codes, with a `format!`-style
/// message.
///
/// ```
/// # use s3gw::s3_error;
/// let err = s3_error!(NoSuchBucket, "bucket {} does not exist", "photos");
/// assert_eq!(err.code().as_str(), "NoSuchBucket");
/// ```
#[macro_export]
macro_rules! s3_error {
    ($code:ident) => {
        $crate::S3Error::new($crate::S3ErrorCode::$code, $crate::S3ErrorCode::$code.to_string())
    };
    ($code:ident, $($arg:tt)*) => {
        $crate::S3Error::new($crate::S3ErrorCode::$code, format!($($arg)*))
    };
}

/// The closed set of error codes this gateway ever emits.
///
/// Each variant carries a fixed HTTP status, mirroring the status-code tables
/// in the per-resource controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum S3ErrorCode {
    AccessDenied,
    BucketAlreadyExists,
    BucketNotEmpty,
    InvalidArgument,
    InvalidBucketName,
    InvalidURI,
    InvalidDigest,
    BadDigest,
    NoSuchBucket,
    SignatureDoesNotMatch,
    RequestTimeTooSkewed,
    NoSuchKey,
    Unsupported,
    MissingContentLength,
    IllegalVersioningConfigurationException,
    MalformedACLError,
    /// Not part of the closed client-facing taxonomy; used for backend
    /// failures and other conditions with no dedicated S3 error code.
    InternalError,
}

impl S3ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidURI => "InvalidURI",
            Self::InvalidDigest => "InvalidDigest",
            Self::BadDigest => "BadDigest",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Self::NoSuchKey => "NoSuchKey",
            Self::Unsupported => "Unsupported",
            Self::MissingContentLength => "MissingContentLength",
            Self::IllegalVersioningConfigurationException => "IllegalVersioningConfigurationException",
            Self::MalformedACLError => "MalformedACLError",
            Self::InternalError => "InternalError",
        }
    }

    #[must_use]
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::AccessDenied | Self::SignatureDoesNotMatch | Self::RequestTimeTooSkewed => StatusCode::FORBIDDEN,
            Self::BucketAlreadyExists | Self::BucketNotEmpty => StatusCode::CONFLICT,
            Self::InvalidArgument
            | Self::InvalidBucketName
            | Self::InvalidURI
            | Self::InvalidDigest
            | Self::BadDigest
            | Self::IllegalVersioningConfigurationException
            | Self::MalformedACLError => StatusCode::BAD_REQUEST,
            Self::NoSuchBucket | Self::NoSuchKey => StatusCode::NOT_FOUND,
            Self::Unsupported => StatusCode::NOT_IMPLEMENTED,
            Self::MissingContentLength => StatusCode::LENGTH_REQUIRED,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single S3-shaped failure, ready to be rendered as the standard error
/// document.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct S3Error {
    code: S3ErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl S3Error {
    #[must_use]
    pub fn new(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), source: None }
    }

    /// Wraps an internal error (e.g. the backend being unreachable) as an
    /// [`S3ErrorCode::InternalError`], keeping the original error for logging.
    pub fn internal(source: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            code: S3ErrorCode::InternalError,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn code(&self) -> S3ErrorCode {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Renders the standard `<Error>` document for this failure.
    ///
    /// ```
    /// # use s3gw::{S3Error, S3ErrorCode};
    /// let err = S3Error::new(S3ErrorCode::NoSuchBucket, "no such bucket: x");
    /// let xml = err.to_xml();
    /// assert!(xml.contains("<Code>NoSuchBucket</Code>"));
    /// assert!(xml.contains("<Message>no such bucket: x</Message>"));
    /// ```
    #[must_use]
    pub fn to_xml(&self) -> String {
        crate::xml::error_document(self.code.as_str(), &self.message)
    }
}
