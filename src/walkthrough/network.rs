//! In-process stand-in for the network: requests are routed by origin to
//! the simulated servers' routers and answered via `oneshot`.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde::de::DeserializeOwned;
use tower::ServiceExt;
use url::Url;

const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// One outbound HTTP request.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl Outbound {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.headers.push((
            "content-type",
            "application/x-www-form-urlencoded".to_string(),
        ));
        self.body = Some(body);
        self
    }

    fn target(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    fn into_request(self) -> Result<Request<Body>> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.target());
        if let Some(host) = self.url.host_str() {
            builder = builder.header(header::HOST, host);
        }
        for (name, value) in &self.headers {
            builder = builder.header(*name, value.as_str());
        }
        let body = self.body.map(Body::from).unwrap_or_else(Body::empty);
        builder.body(body).context("building request")
    }
}

/// A received response, body fully read.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Exchange {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .with_context(|| format!("unexpected response body (status {})", self.status))
    }

    pub fn header_str(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Default)]
pub struct Network {
    hosts: HashMap<String, Router>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, base: &Url, router: Router) {
        self.hosts.insert(base.origin().ascii_serialization(), router);
    }

    pub async fn send(&self, outbound: Outbound) -> Result<Exchange> {
        let origin = outbound.url.origin().ascii_serialization();
        let router = self
            .hosts
            .get(&origin)
            .cloned()
            .ok_or_else(|| anyhow!("no simulated server at {origin}"))?;

        let method = outbound.method.clone();
        let target = outbound.target();
        let response = router.oneshot(outbound.into_request()?).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
            .await
            .context("reading response body")?;
        tracing::debug!(%method, %target, %status, "simulated exchange");

        Ok(Exchange {
            status,
            headers,
            body,
        })
    }
}
