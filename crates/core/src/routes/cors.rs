//! The fixed cross-origin preflight response attached to routes.

use serde::{Deserialize, Serialize};

use super::HttpMethod;

pub const ALLOW_ORIGIN_HEADER: &str = "Access-Control-Allow-Origin";
pub const ALLOW_METHODS_HEADER: &str = "Access-Control-Allow-Methods";
pub const ALLOW_HEADERS_HEADER: &str = "Access-Control-Allow-Headers";

const ALLOWED_ORIGIN: &str = "*";
const ALLOWED_HEADERS: &str = "Content-Type";
const PREFLIGHT_STATUS: u16 = 200;

/// Fixed response returned for `OPTIONS` without invoking any backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
}

impl PreflightResponse {
    /// Builds the preflight response advertising `OPTIONS` plus the given
    /// real methods.
    pub fn for_methods(methods: &[HttpMethod]) -> Self {
        Self {
            status_code: PREFLIGHT_STATUS,
            headers: vec![
                (ALLOW_ORIGIN_HEADER.to_string(), ALLOWED_ORIGIN.to_string()),
                (ALLOW_METHODS_HEADER.to_string(), allow_methods_value(methods)),
                (ALLOW_HEADERS_HEADER.to_string(), ALLOWED_HEADERS.to_string()),
            ],
        }
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Methods advertised in `Access-Control-Allow-Methods`.
    pub fn allowed_methods(&self) -> Vec<HttpMethod> {
        self.header(ALLOW_METHODS_HEADER)
            .map(|value| {
                value
                    .split(',')
                    .filter_map(|m| m.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `OPTIONS` first, then the real methods in canonical order, e.g.
/// `OPTIONS,GET,POST`.
pub fn allow_methods_value(methods: &[HttpMethod]) -> String {
    let mut real: Vec<HttpMethod> = methods
        .iter()
        .copied()
        .filter(|m| *m != HttpMethod::Options)
        .collect();
    real.sort();
    real.dedup();

    std::iter::once(HttpMethod::Options)
        .chain(real)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
