//! DPoP authentication for the simulated servers.

use axum::http::HeaderMap;

pub mod access;

pub const DPOP_HEADER: &str = "dpop";

/// The request's single `DPoP` header value.
///
/// `None` when the header is missing, repeated, or not visible ASCII
/// (RFC 9449 section 4.3 allows exactly one proof per request).
pub fn single_proof(headers: &HeaderMap) -> Option<&str> {
    let mut values = headers.get_all(DPOP_HEADER).iter();
    let first = values.next()?;
    if values.next().is_some() {
        return None;
    }
    first.to_str().ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn accepts_exactly_one_proof() {
        let mut headers = HeaderMap::new();
        assert_eq!(single_proof(&headers), None);

        headers.insert(DPOP_HEADER, HeaderValue::from_static("a.b.c"));
        assert_eq!(single_proof(&headers), Some("a.b.c"));

        headers.append(DPOP_HEADER, HeaderValue::from_static("d.e.f"));
        assert_eq!(single_proof(&headers), None);
    }
}
