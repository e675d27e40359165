//! Gatewright gateway infrastructure adapter.
//!
//! Implements the [`converge::GatewayApi`] port over HTTP using [`reqwest`]:
//! the admin API for control-plane mutations and reads, the proxy listener
//! for traffic-path requests.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. All HTTP
//! details (status-code mapping, response-body bounding, rate-limit headers)
//! are handled here; the [`converge`] crate never sees them.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use converge::{
    GatewayApi, GatewayId, GatewayRequestError, GatewayStatus, PluginSpec, ProxyResponse,
    RouteSpec, ServiceSpec, ServiceSummary,
};

/// Upper bound on how much of any response body is buffered.
const BODY_LIMIT: usize = 512;
/// Header carrying the per-minute rate-limit budget that remains.
const RATE_LIMIT_HEADER: &str = "X-RateLimit-Remaining-Minute";
/// Per-request timeout; a hung gateway surfaces as a transport error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the gateway's admin API and proxy listener.
///
/// Every call is synchronous from the pipeline's point of view and a single
/// attempt: failures surface to the caller instead of being retried here.
pub struct GatewayClient {
    http: reqwest::Client,
    admin_base: String,
    proxy_base: String,
}

impl GatewayClient {
    /// Builds a client for the given admin and proxy base URLs.
    pub fn new(
        admin_base: impl Into<String>,
        proxy_base: impl Into<String>,
    ) -> Result<Self, GatewayRequestError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            admin_base: trim_base(admin_base.into()),
            proxy_base: trim_base(proxy_base.into()),
        })
    }

    async fn post_create<T: serde::Serialize>(
        &self,
        url: String,
        payload: &T,
    ) -> Result<GatewayId, GatewayRequestError> {
        tracing::debug!(%url, "create request");
        let response = self
            .http
            .post(url.as_str())
            .json(payload)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();
        let body = bounded_body(response).await.map_err(transport)?;
        decode_create(status, &body)
    }

    async fn get_admin(&self, path: &str) -> Result<String, GatewayRequestError> {
        let url = format!("{}{path}", self.admin_base);
        let response = self.http.get(url.as_str()).send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = bounded_body(response).await.map_err(transport)?;
        if status != 200 {
            return Err(GatewayRequestError::UnexpectedStatus { status, body });
        }
        Ok(body)
    }
}

#[async_trait]
impl GatewayApi for GatewayClient {
    async fn status(&self) -> Result<GatewayStatus, GatewayRequestError> {
        let body = self.get_admin("/status").await?;
        serde_json::from_str(&body).map_err(|err| GatewayRequestError::Transport {
            reason: format!("malformed status body: {err}"),
        })
    }

    async fn create_service(
        &self,
        spec: &ServiceSpec,
    ) -> Result<GatewayId, GatewayRequestError> {
        self.post_create(format!("{}/services", self.admin_base), spec)
            .await
    }

    async fn create_route(
        &self,
        service_ref: &str,
        spec: &RouteSpec,
    ) -> Result<GatewayId, GatewayRequestError> {
        self.post_create(
            format!("{}/services/{service_ref}/routes", self.admin_base),
            spec,
        )
        .await
    }

    async fn create_plugin(
        &self,
        service_ref: &str,
        spec: &PluginSpec,
    ) -> Result<GatewayId, GatewayRequestError> {
        self.post_create(
            format!("{}/services/{service_ref}/plugins", self.admin_base),
            spec,
        )
        .await
    }

    async fn list_services(&self) -> Result<Vec<ServiceSummary>, GatewayRequestError> {
        let body = self.get_admin("/services").await?;
        let listing: ServiceListing =
            serde_json::from_str(&body).map_err(|err| GatewayRequestError::Transport {
                reason: format!("malformed service listing: {err}"),
            })?;
        Ok(listing.data)
    }

    async fn proxy_get(&self, path: &str) -> Result<ProxyResponse, GatewayRequestError> {
        let url = format!("{}{path}", self.proxy_base);
        let response = self.http.get(url.as_str()).send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let rate_limit_remaining = response
            .headers()
            .get(RATE_LIMIT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body_excerpt = bounded_body(response).await.map_err(transport)?;
        Ok(ProxyResponse {
            status,
            body_excerpt,
            rate_limit_remaining,
        })
    }
}

/// Shape of the admin API's collection responses.
#[derive(Deserialize)]
struct ServiceListing {
    data: Vec<ServiceSummary>,
}

/// Shape of the interesting part of a creation response.
#[derive(Deserialize)]
struct CreatedResource {
    id: Option<String>,
}

fn transport(err: reqwest::Error) -> GatewayRequestError {
    GatewayRequestError::Transport {
        reason: err.to_string(),
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

/// Maps a create response: 201 carries the assigned id, 409 means the
/// resource already exists (success, but no fresh id), everything else is
/// an error carrying the bounded body.
fn decode_create(status: u16, body: &str) -> Result<GatewayId, GatewayRequestError> {
    match status {
        201 => {
            let id = serde_json::from_str::<CreatedResource>(body)
                .ok()
                .and_then(|created| created.id);
            Ok(match id {
                Some(id) => GatewayId::Assigned(id),
                None => GatewayId::Unknown,
            })
        }
        409 => Ok(GatewayId::Unknown),
        _ => Err(GatewayRequestError::UnexpectedStatus {
            status,
            body: body.to_string(),
        }),
    }
}

/// Appends `chunk` to `buf` without exceeding [`BODY_LIMIT`]; returns `false`
/// once the buffer is full.
fn append_bounded(buf: &mut Vec<u8>, chunk: &[u8]) -> bool {
    let room = BODY_LIMIT - buf.len();
    let take = room.min(chunk.len());
    buf.extend_from_slice(&chunk[..take]);
    buf.len() < BODY_LIMIT
}

/// Reads at most [`BODY_LIMIT`] bytes of the response body; the rest of the
/// stream is dropped, never buffered.
async fn bounded_body(mut response: reqwest::Response) -> Result<String, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if !append_bounded(&mut buf, &chunk) {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_response_yields_assigned_id() {
        let id = decode_create(201, r#"{"id": "svc-1", "name": "httpbin"}"#).unwrap();
        assert_eq!(id, GatewayId::Assigned("svc-1".into()));
    }

    #[test]
    fn created_response_without_id_yields_unknown() {
        assert_eq!(decode_create(201, r#"{"name": "httpbin"}"#).unwrap(), GatewayId::Unknown);
        assert_eq!(decode_create(201, "not json").unwrap(), GatewayId::Unknown);
    }

    #[test]
    fn conflict_is_success_without_an_id() {
        assert_eq!(decode_create(409, r#"{"message": "exists"}"#).unwrap(), GatewayId::Unknown);
    }

    #[test]
    fn other_statuses_carry_status_and_body() {
        let err = decode_create(400, "schema violation").unwrap_err();
        match err {
            GatewayRequestError::UnexpectedStatus { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "schema violation");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn base_urls_lose_trailing_slashes() {
        assert_eq!(trim_base("http://localhost:8001/".into()), "http://localhost:8001");
        assert_eq!(trim_base("http://localhost:8001".into()), "http://localhost:8001");
    }

    #[test]
    fn body_buffer_is_bounded() {
        let mut buf = Vec::new();
        assert!(append_bounded(&mut buf, &[b'a'; 500]));
        assert!(!append_bounded(&mut buf, &[b'b'; 500]));
        assert_eq!(buf.len(), BODY_LIMIT);
        // Nothing more is accepted once full.
        assert!(!append_bounded(&mut buf, &[b'c'; 10]));
        assert_eq!(buf.len(), BODY_LIMIT);
    }

    #[test]
    fn listing_parses_the_data_envelope() {
        let listing: ServiceListing = serde_json::from_str(
            r#"{"data": [{"name": "httpbin", "host": "httpbin.org"}, {"name": "bare"}], "next": null}"#,
        )
        .unwrap();
        assert_eq!(listing.data.len(), 2);
        assert_eq!(listing.data[0].name, "httpbin");
        assert_eq!(listing.data[0].host.as_deref(), Some("httpbin.org"));
        assert_eq!(listing.data[1].host, None);
    }
}
