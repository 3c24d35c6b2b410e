//! Catch-all proxy to the SD1 backend.
//!
//! Forwards `{GET,POST,PUT,DELETE} /api/sd1/<path…>` to
//! `{SD1_API_URL}/api/<path…>` with the caller's identity attached as
//! headers. Timeout and retry are explicit configuration, not implied:
//! retries apply to GET only.

use std::time::Duration;

use crate::auth::Identity;
use crate::util::{env_optional, env_u32, env_u64};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const RETRY_SLEEP_MS: u64 = 500;

// ── Configuration ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct ProxyConfig {
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
    pub(crate) retries: u32,
}

impl ProxyConfig {
    pub(crate) fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let base_url = env_optional("SD1_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        url::Url::parse(&base_url).map_err(|e| format!("Invalid SD1_API_URL: {e}"))?;
        let timeout_ms = env_u64("PROXY_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;
        let retries = env_u32("PROXY_RETRIES", 0)?;
        Ok(ProxyConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(timeout_ms.max(1)),
            retries,
        })
    }
}

// ── Pure pieces ──────────────────────────────────────────────────────────

pub(crate) fn outbound_url(base_url: &str, segments: &[&str]) -> String {
    format!("{}/api/{}", base_url.trim_end_matches('/'), segments.join("/"))
}

pub(crate) fn identity_headers(identity: &Identity) -> Vec<(&'static str, String)> {
    vec![
        ("X-User-Id", identity.user_id.clone()),
        ("X-User-Email", identity.email.clone()),
        ("X-User-Role", identity.header_role().to_string()),
    ]
}

#[derive(Debug, PartialEq)]
pub(crate) enum OutboundBody {
    /// GET/DELETE forward without a body.
    None,
    /// JSON (or raw text fallback), sent as application/json.
    Text(String),
    /// Multipart forwarded verbatim with the original content type so the
    /// boundary survives.
    Multipart(Vec<u8>, String),
}

pub(crate) fn prepare_body(method: &str, content_type: Option<&str>, raw: &[u8]) -> OutboundBody {
    match method {
        "POST" | "PUT" => {}
        _ => return OutboundBody::None,
    }
    if let Some(ct) = content_type {
        if ct.to_ascii_lowercase().contains("multipart/form-data") {
            return OutboundBody::Multipart(raw.to_vec(), ct.to_string());
        }
    }
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => OutboundBody::Text(value.to_string()),
        Err(_) => OutboundBody::Text(String::from_utf8_lossy(raw).into_owned()),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ProxyResponse {
    pub(crate) status: u16,
    pub(crate) content_type: String,
    pub(crate) body: String,
}

/// Normalize the upstream body: JSON is re-serialized, anything else is
/// relayed as raw text.
pub(crate) fn relay_body(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value.to_string(),
        Err(_) => text.to_string(),
    }
}

fn retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

// ── Forwarding ───────────────────────────────────────────────────────────

pub(crate) fn forward(
    client: &reqwest::blocking::Client,
    config: &ProxyConfig,
    method: &str,
    segments: &[&str],
    identity: &Identity,
    content_type: Option<&str>,
    raw_body: &[u8],
) -> Result<ProxyResponse, String> {
    let url = outbound_url(&config.base_url, segments);
    let body = prepare_body(method, content_type, raw_body);
    let reqwest_method = reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|_| format!("unsupported method: {method}"))?;

    // GET is the only method safe to replay.
    let attempts = if method == "GET" { config.retries + 1 } else { 1 };

    let mut last_err = String::new();
    for attempt in 0..attempts {
        if attempt > 0 {
            std::thread::sleep(Duration::from_millis(RETRY_SLEEP_MS * attempt as u64));
        }
        let mut request = client
            .request(reqwest_method.clone(), url.as_str())
            .timeout(config.timeout);
        for (name, value) in identity_headers(identity) {
            request = request.header(name, value);
        }
        request = match &body {
            OutboundBody::None => request.header("Content-Type", "application/json"),
            OutboundBody::Text(text) => request
                .header("Content-Type", "application/json")
                .body(text.clone()),
            OutboundBody::Multipart(bytes, ct) => {
                request.header("Content-Type", ct.clone()).body(bytes.clone())
            }
        };

        match request.send() {
            Ok(response) => {
                let status = response.status().as_u16();
                if retryable_status(status) && attempt + 1 < attempts {
                    last_err = format!("upstream status {status}");
                    continue;
                }
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/json")
                    .to_string();
                let text = response
                    .text()
                    .map_err(|e| format!("read upstream body: {e}"))?;
                return Ok(ProxyResponse {
                    status,
                    content_type,
                    body: relay_body(&text),
                });
            }
            Err(e) => {
                last_err = format!("upstream request failed: {e}");
                if attempt + 1 < attempts {
                    continue;
                }
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::{Role, RoleInfo};

    fn identity(role: Option<Role>) -> Identity {
        Identity {
            user_id: "user_42".to_string(),
            email: "p@example.com".to_string(),
            info: RoleInfo { role, permissions: Vec::new(), projects: Vec::new() },
        }
    }

    #[test]
    fn test_outbound_url_joins_segments() {
        assert_eq!(
            outbound_url("http://sd1:8000", &["characters"]),
            "http://sd1:8000/api/characters"
        );
        assert_eq!(
            outbound_url("http://sd1:8000/", &["storyboard", "batch"]),
            "http://sd1:8000/api/storyboard/batch"
        );
        assert_eq!(outbound_url("http://sd1:8000", &[]), "http://sd1:8000/api/");
    }

    #[test]
    fn test_identity_headers_populated() {
        let headers = identity_headers(&identity(Some(Role::Producer)));
        assert_eq!(headers[0], ("X-User-Id", "user_42".to_string()));
        assert_eq!(headers[1], ("X-User-Email", "p@example.com".to_string()));
        assert_eq!(headers[2], ("X-User-Role", "producer".to_string()));
    }

    #[test]
    fn test_identity_headers_default_role() {
        let headers = identity_headers(&identity(None));
        assert_eq!(headers[2], ("X-User-Role", "team_member".to_string()));
    }

    #[test]
    fn test_prepare_body_skips_get_and_delete() {
        assert_eq!(prepare_body("GET", None, b"ignored"), OutboundBody::None);
        assert_eq!(prepare_body("DELETE", Some("application/json"), b"{}"), OutboundBody::None);
    }

    #[test]
    fn test_prepare_body_json_reserialized() {
        let body = prepare_body("POST", Some("application/json"), b"{\"script_data\": {\"a\": 1}}");
        match body {
            OutboundBody::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["script_data"]["a"], 1);
            }
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_body_non_json_falls_back_to_raw() {
        let body = prepare_body("PUT", Some("text/plain"), b"plain payload");
        assert_eq!(body, OutboundBody::Text("plain payload".to_string()));
    }

    #[test]
    fn test_prepare_body_multipart_kept_verbatim() {
        let ct = "multipart/form-data; boundary=----x";
        let raw = b"------x\r\ncontent\r\n------x--";
        let body = prepare_body("POST", Some(ct), raw);
        assert_eq!(body, OutboundBody::Multipart(raw.to_vec(), ct.to_string()));
    }

    #[test]
    fn test_relay_body_json_vs_text() {
        assert_eq!(relay_body("{\"ok\": true}"), "{\"ok\":true}");
        assert_eq!(relay_body("upstream said no"), "upstream said no");
    }

    #[test]
    fn test_forward_relays_status_and_body() {
        use std::io::Read;

        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let upstream = std::thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();
            let header = |name: &'static str| {
                request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv(name))
                    .map(|h| h.value.as_str().to_string())
            };
            let captured = (
                request.method().to_string(),
                request.url().to_string(),
                header("X-User-Id"),
                header("X-User-Email"),
                header("X-User-Role"),
                body,
            );
            let response = tiny_http::Response::from_string("{\"ok\": true}")
                .with_status_code(201);
            request.respond(response).unwrap();
            captured
        });

        let config = ProxyConfig {
            base_url: format!("http://127.0.0.1:{port}"),
            timeout: Duration::from_secs(5),
            retries: 0,
        };
        let client = reqwest::blocking::Client::new();
        let outcome = forward(
            &client,
            &config,
            "POST",
            &["characters"],
            &identity(Some(Role::Writer)),
            Some("application/json"),
            b"{\"script_data\": {\"x\": 1}}",
        )
        .unwrap();

        assert_eq!(outcome.status, 201);
        assert_eq!(outcome.body, "{\"ok\":true}");

        let (method, url, user_id, email, role, body) = upstream.join().unwrap();
        assert_eq!(method, "POST");
        assert_eq!(url, "/api/characters");
        assert_eq!(user_id.as_deref(), Some("user_42"));
        assert_eq!(email.as_deref(), Some("p@example.com"));
        assert_eq!(role.as_deref(), Some("writer"));
        let sent: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(sent["script_data"]["x"], 1);
    }

    #[test]
    fn test_forward_relays_error_status_verbatim() {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let upstream = std::thread::spawn(move || {
            let request = server.recv().unwrap();
            let response = tiny_http::Response::from_string("{\"error\": \"no such scene\"}")
                .with_status_code(404);
            request.respond(response).unwrap();
        });

        let config = ProxyConfig {
            base_url: format!("http://127.0.0.1:{port}"),
            timeout: Duration::from_secs(5),
            retries: 0,
        };
        let client = reqwest::blocking::Client::new();
        let outcome = forward(
            &client,
            &config,
            "GET",
            &["storage", "SCRIPT_DATA"],
            &identity(None),
            None,
            b"",
        )
        .unwrap();
        assert_eq!(outcome.status, 404);
        assert_eq!(outcome.body, "{\"error\":\"no such scene\"}");
        upstream.join().unwrap();
    }

    #[test]
    fn test_forward_unreachable_upstream_errors() {
        let config = ProxyConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(500),
            retries: 0,
        };
        let client = reqwest::blocking::Client::new();
        let result = forward(&client, &config, "POST", &["budget"], &identity(None), None, b"{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_bad_base_url() {
        unsafe { std::env::set_var("SD1_API_URL", "not a url") };
        assert!(ProxyConfig::from_env().is_err());
        unsafe { std::env::remove_var("SD1_API_URL") };
        let config = ProxyConfig::from_env().unwrap();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.retries, 0);
    }
}
