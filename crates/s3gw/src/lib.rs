//! S3 Gateway
//!
//! `s3gw` translates a subset of the Amazon S3 REST API into requests against a
//! Swift-style account/container/object HTTP backend, and translates the
//! backend's responses back into S3 wire form.
//!
//! # Architecture
//!
//! Requests flow through a fixed pipeline:
//!
//! 1. [`auth`] extracts AWS-style credentials from the request, checks clock
//!    skew, and builds the canonical string used as the backend auth token.
//! 2. [`route`] splits the request path into a [`route::Resource`] (service,
//!    bucket, or object) that selects a controller.
//! 3. [`controllers`] rewrites the request into a [`backend::BackendRequest`],
//!    calls the backend through the [`backend::BackendClient`] trait, and
//!    shapes the backend's response back into S3 form.
//! 4. [`error`] carries any failure as an [`S3Error`] all the way back to the
//!    HTTP layer, where it is rendered as the standard S3 error document.
//!
//! # Example
//!
//! ```rust,no_run
//! use s3gw::backend::ReqwestBackendClient;
//! use s3gw::config::{GatewayConfig, StaticConfigProvider};
//! use s3gw::service::GatewayServiceBuilder;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = ReqwestBackendClient::new("http://127.0.0.1:8090")?;
//! let config = StaticConfigProvider::new(Arc::new(GatewayConfig::default()));
//! let service = GatewayServiceBuilder::new(backend, config).build();
//! // serve `service` with hyper or tower, same as any other HTTP service
//! # let _ = service;
//! # Ok(())
//! # }
//! ```

#![allow(
    clippy::module_name_repetitions,
    clippy::single_match_else,
    clippy::wildcard_imports,
    clippy::missing_errors_doc
)]

#[macro_use]
mod error;

pub mod acl;
pub mod auth;
pub mod backend;
pub mod config;
pub mod controllers;
pub mod header;
pub mod route;
pub mod service;
mod time;
pub mod validation;
pub mod xml;

pub use self::error::{S3Error, S3ErrorCode, S3Result};
