//! Gateway configuration.
//!
//! Mirrors the shape of a typical hot-reloadable service config: an
//! immutable, `Clone`-able [`GatewayConfig`] value served through a
//! [`GatewayConfigProvider`], with a [`StaticConfigProvider`] for the common
//! case and a [`HotReloadConfigProvider`] for processes that want to pick up
//! configuration changes without restarting.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use s3gw::config::{GatewayConfig, GatewayConfigProvider, StaticConfigProvider, HotReloadConfigProvider};
//!
//! let mut config = GatewayConfig::default();
//! config.location = "EU".to_owned();
//!
//! let static_provider = Arc::new(StaticConfigProvider::new(Arc::new(config.clone())));
//! assert_eq!(static_provider.snapshot().location, "EU");
//!
//! let hot = Arc::new(HotReloadConfigProvider::default());
//! assert_eq!(hot.snapshot().location, "US");
//! hot.update(Arc::new(config));
//! assert_eq!(hot.snapshot().location, "EU");
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// Provides read-only access to the current [`GatewayConfig`].
///
/// Built-in providers:
/// - [`StaticConfigProvider`] - configuration fixed at startup
/// - [`HotReloadConfigProvider`] - configuration that can be swapped at runtime
pub trait GatewayConfigProvider: Send + Sync + 'static {
    /// Returns a consistent, immutable snapshot of the current configuration.
    fn snapshot(&self) -> Arc<GatewayConfig>;
}

/// Gateway configuration, loaded once at startup.
///
/// `location` and `log_route` are the two values the S3 protocol surface
/// itself cares about (the `?location` subresource and the logger category
/// respectively); the rest are ambient operational knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct GatewayConfig {
    /// Value reported by `GET /bucket?location`. `"US"` renders as an empty
    /// `LocationConstraint` element, matching classic S3 behavior for the
    /// default region.
    pub location: String,

    /// Logger category passed to `tracing` spans for this gateway instance.
    pub log_route: String,

    /// Base URL of the backend account/container/object HTTP service.
    pub backend_base_url: String,

    /// Upper bound on how large an ACL or versioning-configuration request
    /// body this process will buffer in memory before rejecting it.
    ///
    /// Default: 1 MB.
    pub max_xml_body_size: usize,

    /// Maximum allowed clock skew between the request's `Date` header and
    /// the gateway's clock.
    ///
    /// Default: 10 minutes, matching the reference middleware.
    pub max_skew: Duration,

    /// Timeout applied to each backend HTTP call.
    ///
    /// Default: 30 seconds.
    pub request_timeout: Duration,

    /// Upper bound on `max-keys` accepted from a listing request; requests
    /// asking for more are clamped down to this value.
    ///
    /// Default: 1000, matching S3's own limit.
    pub max_keys_limit: u32,

    /// Backend referrer pattern substituted for the
    /// `…/groups/global/AuthenticatedUsers` grantee URI when translating an
    /// `AccessControlPolicy` document into backend ACL headers.
    ///
    /// The backend has no group distinct from "everyone with a valid
    /// referrer", so this defaults to the same pattern used for `AllUsers`;
    /// deployments that provision a dedicated referrer class for
    /// authenticated requests can point this at it instead.
    ///
    /// Default: `".r:*"`.
    pub authenticated_users_sentinel: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            location: "US".to_owned(),
            log_route: "s3gw".to_owned(),
            backend_base_url: String::new(),
            max_xml_body_size: 1024 * 1024,
            max_skew: Duration::from_secs(10 * 60),
            request_timeout: Duration::from_secs(30),
            max_keys_limit: 1000,
            authenticated_users_sentinel: ".r:*".to_owned(),
        }
    }
}

/// Configuration fixed for the lifetime of the process.
#[derive(Debug)]
pub struct StaticConfigProvider {
    inner: Arc<GatewayConfig>,
}

impl StaticConfigProvider {
    #[must_use]
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { inner: config }
    }
}

impl Default for StaticConfigProvider {
    fn default() -> Self {
        Self::new(Arc::new(GatewayConfig::default()))
    }
}

impl GatewayConfigProvider for StaticConfigProvider {
    fn snapshot(&self) -> Arc<GatewayConfig> {
        Arc::clone(&self.inner)
    }
}

/// Configuration that can be swapped atomically while the process runs, for
/// example in response to a SIGHUP or a config-file watcher.
#[derive(Debug)]
pub struct HotReloadConfigProvider {
    inner: ArcSwap<GatewayConfig>,
}

impl HotReloadConfigProvider {
    #[must_use]
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { inner: ArcSwap::from(config) }
    }

    pub fn update(&self, config: Arc<GatewayConfig>) {
        self.inner.store(config);
    }
}

impl Default for HotReloadConfigProvider {
    fn default() -> Self {
        Self::new(Arc::new(GatewayConfig::default()))
    }
}

impl GatewayConfigProvider for HotReloadConfigProvider {
    fn snapshot(&self) -> Arc<GatewayConfig> {
        self.inner.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.location, "US");
        assert_eq!(config.max_xml_body_size, 1024 * 1024);
        assert_eq!(config.max_skew, Duration::from_secs(600));
        assert_eq!(config.max_keys_limit, 1000);
    }

    #[test]
    fn static_provider_returns_same_arc() {
        let provider = StaticConfigProvider::new(Arc::new(GatewayConfig::default()));
        let a = provider.snapshot();
        let b = provider.snapshot();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn hot_reload_provider_observes_update() {
        let provider = HotReloadConfigProvider::default();
        assert_eq!(provider.snapshot().location, "US");

        provider.update(Arc::new(GatewayConfig {
            location: "EU".to_owned(),
            ..GatewayConfig::default()
        }));

        assert_eq!(provider.snapshot().location, "EU");
    }

    #[test]
    fn hot_reload_snapshot_is_immutable_after_update() {
        let provider = HotReloadConfigProvider::default();
        let snapshot = provider.snapshot();
        provider.update(Arc::new(GatewayConfig {
            location: "EU".to_owned(),
            ..GatewayConfig::default()
        }));
        assert_eq!(snapshot.location, "US");
    }

    #[test]
    fn serde_roundtrip_preserves_fields() {
        let config = GatewayConfig {
            location: "EU".to_owned(),
            max_xml_body_size: 2048,
            ..GatewayConfig::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: GatewayConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }
}
