//! Producer authentication: API-key header resolution
//!
//! Resolves the `X-API-Key` header to its owning project through a 5-minute
//! cache, compiling the key's constraints on the way in so the request
//! path only does matching.

use std::net::IpAddr;
use std::sync::Arc;

use actix_web::HttpRequest;
use tracing::info;

use crate::api::error::ApiError;
use crate::constraints::{CompiledConstraints, RequestEnvelope};
use crate::services::{ResolvedApiKey, Services};

/// Header carrying the producer credential
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Extract the API-key header; `None` when absent or empty.
pub fn extract_api_key(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Extract the client IP, preferring the first forwarded-for hop over the
/// socket peer.
pub fn extract_client_ip(req: &HttpRequest) -> Option<IpAddr> {
    if let Some(forwarded) = req.headers().get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_hop) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_hop.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = req.headers().get("X-Real-IP") {
        if let Ok(ip_str) = real_ip.to_str() {
            if let Ok(ip) = ip_str.parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    req.peer_addr().map(|addr| addr.ip())
}

/// Build the constraint-evaluator envelope for a producer request.
pub fn build_envelope<'a>(req: &'a HttpRequest, environment: &'a str) -> RequestEnvelope<'a> {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());
    RequestEnvelope {
        client_ip: extract_client_ip(req),
        referer: header("Referer"),
        origin: header("Origin"),
        user_agent: header("User-Agent"),
        environment,
    }
}

/// Resolve an API-key token to its project, through the cache.
pub async fn resolve_api_key(
    services: &Services,
    token: &str,
) -> Result<Arc<ResolvedApiKey>, ApiError> {
    if let Some(resolved) = services.key_cache.get(token) {
        return Ok(resolved);
    }

    let project = services
        .projects
        .find_by_api_key(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid API key".into()))?;

    let api_key = project
        .find_api_key(token)
        .ok_or_else(|| ApiError::Unauthorized("invalid API key".into()))?;

    let resolved = Arc::new(ResolvedApiKey {
        key_id: api_key.id,
        compiled: CompiledConstraints::compile(&api_key.constraints),
        project: project.clone(),
    });
    services.key_cache.insert(token.to_string(), resolved.clone());

    info!(
        project_id = %resolved.project.project_id,
        key_id = %resolved.key_id,
        "API key resolved"
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn api_key_header_must_be_present_and_non_empty() {
        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, "tok_abc"))
            .to_http_request();
        assert_eq!(extract_api_key(&req).as_deref(), Some("tok_abc"));

        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, ""))
            .to_http_request();
        assert_eq!(extract_api_key(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(extract_api_key(&req), None);
    }

    #[test]
    fn forwarded_for_first_hop_wins() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "192.168.1.150, 10.0.0.1"))
            .insert_header(("X-Real-IP", "10.0.0.2"))
            .to_http_request();
        assert_eq!(
            extract_client_ip(&req),
            Some("192.168.1.150".parse().unwrap())
        );
    }

    #[test]
    fn real_ip_backs_up_a_missing_forwarded_header() {
        let req = TestRequest::default()
            .insert_header(("X-Real-IP", "10.0.0.2"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req), Some("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn envelope_collects_headers_and_environment() {
        let req = TestRequest::default()
            .insert_header(("Referer", "https://app.example.com/x"))
            .insert_header(("Origin", "https://app.example.com"))
            .insert_header(("User-Agent", "acme-logger/2.1"))
            .to_http_request();
        let envelope = build_envelope(&req, "production");
        assert_eq!(envelope.referer, Some("https://app.example.com/x"));
        assert_eq!(envelope.origin, Some("https://app.example.com"));
        assert_eq!(envelope.user_agent, Some("acme-logger/2.1"));
        assert_eq!(envelope.environment, "production");
    }
}
