//! `Accept` header negotiation between HAL+JSON and plain JSON.

use http::HeaderMap;
use http::header::ACCEPT;

use crate::error::NotAcceptable;

pub const HAL_JSON: &str = "application/hal+json";
pub const JSON: &str = "application/json";

/// Offered media types, most preferred first.
pub const AVAILABLE_CONTENT_TYPES: &[&str] = &[HAL_JSON, JSON];

/// Accept ranges that are satisfied by `application/hal+json`.
const HAL_JSON_COMPATIBLE: &[&str] = &[HAL_JSON, "application/*", "*/*"];

/// The `Content-Type` header value for a negotiated media type.
pub fn content_type_header(media_type: &str) -> String {
    format!("{media_type}; charset=UTF-8")
}

/// Picks the response media type for the request's `Accept` header(s).
///
/// A missing `Accept` header means anything goes. Quality values are not
/// ranked: HAL is served whenever the client accepts it at all.
pub fn best_content_type(headers: &HeaderMap) -> Result<&'static str, NotAcceptable> {
    let mut accepted = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|range| range.split(';').next())
        .map(|range| range.trim().to_ascii_lowercase())
        .filter(|range| !range.is_empty())
        .peekable();
    if accepted.peek().is_none() {
        return Ok(HAL_JSON);
    }
    let accepted: Vec<String> = accepted.collect();
    if accepted
        .iter()
        .any(|range| HAL_JSON_COMPATIBLE.contains(&range.as_str()))
    {
        return Ok(HAL_JSON);
    }
    if accepted.iter().any(|range| range == JSON) {
        return Ok(JSON);
    }
    Err(NotAcceptable {
        available: AVAILABLE_CONTENT_TYPES.to_vec(),
    })
}
