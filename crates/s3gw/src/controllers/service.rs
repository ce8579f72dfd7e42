//! `GET /` — list all buckets owned by the account.

use http::{Method, StatusCode};
use serde::Deserialize;

use crate::backend::{BackendClient, BackendRequest};
use crate::xml::{BucketEntry, list_all_my_buckets};
use crate::{S3Error, s3_error};

use super::{GatewayRequest, GatewayResponse, common_error};

/// Placeholder creation timestamp used for every bucket: the backend does
/// not track container creation time, and naive S3 clients expect the
/// element to be present and parseable.
const PLACEHOLDER_CREATION_DATE: &str = "2009-02-03T16:45:09.000Z";

#[derive(Deserialize)]
struct Container {
    name: String,
    owner: Option<String>,
}

pub async fn handle(req: GatewayRequest, backend: &dyn BackendClient) -> Result<GatewayResponse, S3Error> {
    if req.method != Method::GET {
        return Err(s3_error!(InvalidURI, "unsupported method on the service resource"));
    }

    let backend_req = BackendRequest::new(Method::GET, format!("/v1/{}", req.account)).with_query("format", Some("json".to_owned()));
    let resp = backend.send(backend_req).await?;

    if let Some(err) = common_error(resp.status) {
        return Err(err);
    }
    if resp.status != StatusCode::OK {
        return Err(s3_error!(InvalidURI, "unexpected backend status {}", resp.status));
    }

    let bytes = resp.body.into_bytes().await.map_err(S3Error::internal)?;
    let containers: Vec<Container> = serde_json::from_slice(&bytes).map_err(S3Error::internal)?;

    let owner = containers.first().and_then(|c| c.owner.clone()).unwrap_or_default();
    let buckets: Vec<BucketEntry> =
        containers.into_iter().map(|c| BucketEntry { name: c.name, creation_date: PLACEHOLDER_CREATION_DATE }).collect();

    let xml = list_all_my_buckets(&owner, &owner, &buckets);
    Ok(GatewayResponse::xml(StatusCode::OK, xml))
}
