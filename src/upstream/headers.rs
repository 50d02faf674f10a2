//! Browser masquerade headers
//!
//! The upstream only answers requests that look like they come from its own
//! web client, so every outbound request (chat, landing page, assets, status
//! probe) carries the same browser header set.

use crate::error::{AppError, AppResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Session token header, sent on chat requests and read from status probes
pub const VQD_TOKEN_HEADER: &str = "x-vqd-4";
/// Auxiliary hash header
pub const VQD_HASH_HEADER: &str = "x-vqd-hash-1";
/// Request header asking the status endpoint to issue a token
pub const VQD_ACCEPT_HEADER: &str = "x-vqd-accept";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

/// Static part of the header set (origin-independent)
const STATIC_HEADERS: &[(&str, &str)] = &[
    ("accept", "*/*"),
    ("accept-encoding", "gzip, deflate, br, zstd"),
    ("accept-language", "zh-CN,zh;q=0.9"),
    ("cookie", "dcm=3; dcs=1"),
    ("priority", "u=1, i"),
    (
        "sec-ch-ua",
        r#""Chromium";v="134", "Not:A-Brand";v="24", "Google Chrome";v="134""#,
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", r#""Windows""#),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("user-agent", USER_AGENT),
];

/// Build the masquerade header set for an upstream rooted at `base_url`
///
/// `Origin` and `Referer` point at the upstream's own root.
///
/// # Errors
///
/// Returns `AppError::Config` if `base_url` cannot be used as a header value.
pub fn masquerade_headers(base_url: &str) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(STATIC_HEADERS.len() + 2);
    for (name, value) in STATIC_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    let root = format!("{}/", base_url.trim_end_matches('/'));
    let root = HeaderValue::from_str(&root).map_err(|e| {
        AppError::Config(format!(
            "upstream base_url '{}' is not a valid header value: {}",
            base_url, e
        ))
    })?;
    headers.insert(reqwest::header::ORIGIN, root.clone());
    headers.insert(reqwest::header::REFERER, root);

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_point_at_upstream_root() {
        let headers = masquerade_headers("https://duckduckgo.com").unwrap();
        assert_eq!(headers["origin"], "https://duckduckgo.com/");
        assert_eq!(headers["referer"], "https://duckduckgo.com/");
    }

    #[test]
    fn test_headers_carry_browser_fingerprint() {
        let headers = masquerade_headers("http://127.0.0.1:9000/").unwrap();
        assert_eq!(headers["cookie"], "dcm=3; dcs=1");
        assert_eq!(headers["sec-fetch-site"], "same-origin");
        assert!(
            headers["user-agent"]
                .to_str()
                .unwrap()
                .contains("Chrome/134")
        );
        assert_eq!(headers["origin"], "http://127.0.0.1:9000/");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = masquerade_headers("https://bad\nhost").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
