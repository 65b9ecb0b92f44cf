//! Text rendering of the artifacts each step shows.

use std::fmt;

use axum::http::StatusCode;
use dpop_core::jws::decode_compact;
use serde_json::{Map, Value};

use super::network::Outbound;

/// One printed step of the walkthrough.
#[derive(Debug, Clone)]
pub struct Section {
    pub step: u8,
    pub title: &'static str,
    pub body: String,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heading = format!("Step {}: {}", self.step, self.title);
        writeln!(f, "{heading}")?;
        writeln!(f, "{}", "=".repeat(heading.len()))?;
        write!(f, "{}", self.body)
    }
}

pub fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn pretty(map: &Map<String, Value>) -> String {
    serde_json::to_string_pretty(map).unwrap_or_else(|_| format!("{map:?}"))
}

/// Compact token plus its decoded header and payload.
pub fn jwt_panel(title: &str, token: &str) -> String {
    match decode_compact(token) {
        Ok(decoded) => format!(
            "{title}\n{}\n  header:\n{}\n  payload:\n{}\n  signature: {} bytes\n",
            indent(token, 2),
            indent(&pretty(&decoded.header), 4),
            indent(&pretty(&decoded.payload), 4),
            decoded.signature.len(),
        ),
        Err(e) => format!("{title}\n{}\n  (not decodable: {e})\n", indent(token, 2)),
    }
}

pub fn request(outbound: &Outbound) -> String {
    let target = match outbound.url.query() {
        Some(q) => format!("{}?{}", outbound.url.path(), q),
        None => outbound.url.path().to_string(),
    };
    let mut out = format!("{} {} HTTP/1.1\n", outbound.method, target);
    if let Some(host) = outbound.url.host_str() {
        out.push_str(&format!("Host: {host}\n"));
    }
    for (name, value) in &outbound.headers {
        out.push_str(&format!("{}: {}\n", header_case(name), value));
    }
    if let Some(body) = &outbound.body {
        out.push('\n');
        out.push_str(body);
        out.push('\n');
    }
    out
}

pub fn response(status: StatusCode, body: &[u8]) -> String {
    let body = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    format!(
        "HTTP/1.1 {} {}\n\n{}\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default(),
        body
    )
}

// "content-type" -> "Content-Type", "dpop" -> "DPoP"
fn header_case(name: &str) -> String {
    if name.eq_ignore_ascii_case("dpop") {
        return "DPoP".to_string();
    }
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use url::Url;

    use super::*;

    #[test]
    fn renders_requests_like_the_wire() {
        let outbound = Outbound::new(
            Method::GET,
            Url::parse("https://api.example.com/profile").unwrap(),
        )
        .header("authorization", "DPoP abc")
        .header("dpop", "x.y.z");
        let text = request(&outbound);
        assert_eq!(
            text,
            "GET /profile HTTP/1.1\nHost: api.example.com\nAuthorization: DPoP abc\nDPoP: x.y.z\n"
        );
    }

    #[test]
    fn jwt_panel_falls_back_for_garbage() {
        assert!(jwt_panel("token", "not-a-jwt").contains("not decodable"));
    }

    #[test]
    fn response_pretty_prints_json() {
        let text = response(StatusCode::BAD_REQUEST, br#"{"error":"invalid_token"}"#);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request"));
        assert!(text.contains("\"error\": \"invalid_token\""));
    }
}
