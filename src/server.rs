//! HTTP surface of the gateway: the SD1 catch-all proxy, the billing
//! webhook, and a health probe. One accept loop, requests handled in order.

use std::io::{self, Read};
use std::path::Path;

use serde_json::Value;
use tiny_http::{Method, Response, Server};

use crate::auth::authenticate;
use crate::billing::{BillingConfig, handle_webhook};
use crate::proxy::{ProxyConfig, forward};
use crate::store_db::GatewayDb;

fn find_header(request: &tiny_http::Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_string())
}

fn respond_raw(request: tiny_http::Request, status: u16, content_type: &str, body: String) {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
    {
        response = response.with_header(header);
    }
    let _ = request.respond(response);
}

fn respond_json(request: tiny_http::Request, status: u16, value: &Value) {
    respond_raw(request, status, "application/json", value.to_string());
}

fn read_body(request: &mut tiny_http::Request) -> Vec<u8> {
    let mut body = Vec::new();
    let _ = request.as_reader().read_to_end(&mut body);
    body
}

pub(crate) fn run_server(
    bind: &str,
    port: u16,
    db_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let proxy_config = ProxyConfig::from_env()?;
    let billing_config = BillingConfig::from_env()?;
    let db = GatewayDb::open(db_path)?;
    let client = reqwest::blocking::Client::builder()
        .timeout(proxy_config.timeout)
        .build()?;

    let addr = format!("{bind}:{port}");
    let server = Server::http(&addr)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("server: {e}")))?;
    eprintln!("callsheet gateway listening on http://{addr}");
    eprintln!("[proxy] forwarding /api/sd1/* to {}", proxy_config.base_url);

    for mut request in server.incoming_requests() {
        let method = match request.method() {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            _ => {
                respond_json(request, 405, &serde_json::json!({"error": "Method not allowed"}));
                continue;
            }
        };
        let path = request.url().split('?').next().unwrap_or("").to_string();
        let segments: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        let segments: Vec<&str> = segments.iter().map(|s| s.as_str()).collect();

        match segments.as_slice() {
            ["healthz"] if method == "GET" => {
                respond_json(request, 200, &serde_json::json!({"ok": true}));
            }
            ["api", "billing", "webhooks"] if method == "POST" => {
                let signature = find_header(&request, "Stripe-Signature");
                let body = read_body(&mut request);
                let (status, value) =
                    handle_webhook(&db, &billing_config, &body, signature.as_deref());
                respond_json(request, status, &value);
            }
            ["api", "sd1", rest @ ..] => {
                // Authentication comes before any forwarding.
                let authorization = find_header(&request, "Authorization");
                let Some(identity) = authenticate(&db, authorization.as_deref()) else {
                    respond_json(request, 401, &serde_json::json!({"error": "Unauthorized"}));
                    continue;
                };

                let joined = rest.join("/");
                eprintln!("[proxy] {method} /api/{joined} user={}", identity.user_id);

                let content_type = find_header(&request, "Content-Type");
                let body = read_body(&mut request);
                match forward(
                    &client,
                    &proxy_config,
                    method,
                    rest,
                    &identity,
                    content_type.as_deref(),
                    &body,
                ) {
                    Ok(outcome) => {
                        respond_raw(request, outcome.status, &outcome.content_type, outcome.body);
                    }
                    Err(e) => {
                        eprintln!("[proxy] {method} /api/{joined} failed: {e}");
                        respond_json(
                            request,
                            500,
                            &serde_json::json!({
                                "error": "Internal server error",
                                "message": e,
                            }),
                        );
                    }
                }
            }
            _ => {
                respond_json(request, 404, &serde_json::json!({"error": "Not found"}));
            }
        }
    }
    Ok(())
}
