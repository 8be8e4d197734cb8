//! Request-line parsing and routing.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Index,
    Health,
    OpenApi,
    /// Native description document, optionally narrowed to one handler.
    Describe { handler: Option<String> },
    Metrics,
    /// `POST /{handler...}/{method}`, carried as a dotted path.
    Call(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method not allowed; use {allowed}")]
    MethodNotAllowed { allowed: &'static str },
    #[error("payload too large: body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("length required: {0}")]
    LengthRequired(String),
}

pub fn parse_request_line(line: &str) -> Result<(String, String), RouteError> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing target".to_string()))?;
    Ok((method.to_ascii_uppercase(), target.to_string()))
}

pub fn parse_route(method: &str, target: &str) -> Result<Route, RouteError> {
    let (path, query) = split_target(target);
    let utility = |route: Route| {
        if method == "GET" {
            Ok(route)
        } else {
            Err(RouteError::MethodNotAllowed { allowed: "GET" })
        }
    };

    match path.trim_end_matches('/') {
        "" => utility(Route::Index),
        "/_http/health" => utility(Route::Health),
        "/_http/openapi" => utility(Route::OpenApi),
        "/_http/metrics" => utility(Route::Metrics),
        "/_http/describe" => {
            let handler = parse_query_params(query).remove("handler");
            utility(Route::Describe { handler })
        }
        other if other.starts_with("/_http/") => {
            Err(RouteError::NotFound(format!("unknown route: {other}")))
        }
        other => {
            let segments: Vec<String> = other
                .split('/')
                .filter(|s| !s.is_empty())
                .map(percent_decode)
                .collect();
            if segments.len() < 2 {
                return Err(RouteError::NotFound(format!(
                    "unknown route: {other} (use /<handler>/<method>)"
                )));
            }
            if method != "POST" {
                return Err(RouteError::MethodNotAllowed { allowed: "POST" });
            }
            Ok(Route::Call(segments.join(".")))
        }
    }
}

fn split_target(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

pub fn parse_query_params(query: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode(k);
        if !key.is_empty() {
            out.insert(key, percent_decode(v));
        }
    }
    out
}

pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(h), Some(l)) => {
                        out.push(h * 16 + l);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}
