//! The HTTP side-channel: `GET /bmregistry/getInfo.jsp` and
//! `POST /bmregistry/metrics`, served on a separate port from the
//! registry's own TCP protocol. The Rust counterpart of `http_server.py`'s
//! `BMRegistryHTTPHandler`.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiny_http::{Header, Method, Response, Server};
use tracing::{debug, error, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Runs the HTTP server until `shutdown` is set.
pub fn run(port: u16, shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    let server = Server::http(("0.0.0.0", port))
        .map_err(|e| anyhow::anyhow!("failed to bind http port {port}: {e}"))?;
    info!(port, "http side-channel listening");

    while !shutdown.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_TIMEOUT) {
            Ok(Some(request)) => handle_request(request),
            Ok(None) => continue,
            Err(e) => warn!(error = %e, "http recv error"),
        }
    }

    info!("http side-channel shutting down");
    Ok(())
}

fn handle_request(request: tiny_http::Request) {
    let method = request.method().clone();
    let (path, query) = split_query(request.url());
    let path = path.to_string();

    let result = match (&method, path.as_str()) {
        (Method::Get, "/bmregistry/getInfo.jsp") => handle_get_info(request, &query),
        (Method::Post, "/bmregistry/metrics") => handle_metrics(request),
        _ => respond_status(request, 404, "not found"),
    };
    if let Err(e) = result {
        error!(error = %e, "failed to write http response");
    }
}

/// `appId`/`deviceId` echoed back with a fixed, free-tier entitlement
/// payload. No backing entitlement store exists; this mirrors
/// `handle_get_info`'s hardcoded response exactly.
fn handle_get_info(request: tiny_http::Request, query: &HashMap<String, String>) -> std::io::Result<()> {
    let (Some(app_id), Some(device_id)) = (query.get("appId"), query.get("deviceId")) else {
        return respond_status(request, 400, "missing appId or deviceId");
    };
    let body = serde_json::json!({
        "appId": app_id,
        "deviceId": device_id,
        "play": 0,
        "purchase": 0,
        "premium": false,
        "trial": false,
        "canPlay": true,
    })
    .to_string();
    respond_json(request, 200, body)
}

/// Accepts and logs a client metrics report; there is no metrics sink on
/// the other end, so the body is only ever logged at debug level.
fn handle_metrics(mut request: tiny_http::Request) -> std::io::Result<()> {
    let mut body = String::new();
    request.as_reader().read_to_string(&mut body)?;
    let form = parse_form(&body);
    debug!(
        action = ?form.get("action"),
        events = ?form.get("events"),
        token = ?form.get("token"),
        "metrics posted"
    );
    respond_json(request, 200, r#"{"status":"success"}"#.to_string())
}

fn respond_json(request: tiny_http::Request, status: u16, body: String) -> std::io::Result<()> {
    let response = Response::from_string(body)
        .with_status_code(status)
        .with_header(json_content_type())
        .with_header(cors_header());
    request.respond(response)
}

fn respond_status(request: tiny_http::Request, status: u16, message: &str) -> std::io::Result<()> {
    let response = Response::from_string(message.to_string()).with_status_code(status);
    request.respond(response)
}

fn json_content_type() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap()
}

fn cors_header() -> Header {
    Header::from_bytes(&b"Access-Control-Allow-Origin"[..], &b"*"[..]).unwrap()
}

fn split_query(url: &str) -> (&str, HashMap<String, String>) {
    match url.split_once('?') {
        Some((path, query)) => (path, parse_form(query)),
        None => (url, HashMap::new()),
    }
}

/// Parses an `application/x-www-form-urlencoded` body or query string,
/// shared between the query string and the metrics POST body.
fn parse_form(s: &str) -> HashMap<String, String> {
    s.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (percent_decode(k), percent_decode(v)))
        .collect()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi * 16 + lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_pairs_and_decodes_percent_escapes() {
        let (path, query) = split_query("/bmregistry/getInfo.jsp?appId=my%20app&deviceId=abc123");
        assert_eq!(path, "/bmregistry/getInfo.jsp");
        assert_eq!(query.get("appId").unwrap(), "my app");
        assert_eq!(query.get("deviceId").unwrap(), "abc123");
    }

    #[test]
    fn path_without_query_string_has_no_params() {
        let (path, query) = split_query("/bmregistry/metrics");
        assert_eq!(path, "/bmregistry/metrics");
        assert!(query.is_empty());
    }

    #[test]
    fn plus_decodes_to_space_in_form_bodies() {
        let form = parse_form("action=level+complete&token=abc");
        assert_eq!(form.get("action").unwrap(), "level complete");
    }
}
