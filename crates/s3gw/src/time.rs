//! Small time helpers used by request instrumentation.

use chrono::{DateTime, Utc};

/// The current time, for attaching to tracing spans.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
