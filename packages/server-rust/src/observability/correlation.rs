//! Correlation and trace identity extraction from inbound headers.

use std::time::Duration;

use http::HeaderMap;

/// Header carrying the correlation id on requests and responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Fallback header read when `x-request-id` is absent.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
/// W3C trace context header.
pub const TRACEPARENT_HEADER: &str = "traceparent";
/// gRPC deadline header.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Returns the caller-supplied correlation id, trimmed. Blank means absent.
#[must_use]
pub fn extract_correlation_id(headers: &HeaderMap) -> Option<String> {
    header_str(headers, REQUEST_ID_HEADER)
        .or_else(|| header_str(headers, CORRELATION_ID_HEADER))
        .map(str::to_string)
}

/// Generates a fresh correlation id (UUID v4).
#[must_use]
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Returns the trace id of a valid `traceparent` header.
///
/// Accepts `<version>-<32 hex trace id>-<16 hex parent id>-<2 hex flags>`
/// with a version other than `ff` and a non-zero trace id.
#[must_use]
pub fn trace_id_from_traceparent(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, TRACEPARENT_HEADER)?;
    let mut parts = value.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let parent_id = parts.next()?;
    let flags = parts.next()?;

    let valid = is_lower_hex(version, 2)
        && version != "ff"
        && is_lower_hex(trace_id, 32)
        && trace_id.bytes().any(|b| b != b'0')
        && is_lower_hex(parent_id, 16)
        && is_lower_hex(flags, 2);
    valid.then(|| trace_id.to_string())
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Generates a fresh 128-bit trace id as 32 lowercase hex characters.
#[must_use]
pub fn new_trace_id() -> String {
    loop {
        let bytes: [u8; 16] = rand::random();
        if bytes.iter().any(|b| *b != 0) {
            return hex::encode(bytes);
        }
    }
}

/// Builds a sampled W3C `traceparent` value for `trace_id` with a fresh
/// parent span id.
#[must_use]
pub fn traceparent_for(trace_id: &str) -> String {
    let mut span_id: [u8; 8] = rand::random();
    span_id[0] |= 1;
    format!("00-{trace_id}-{}-01", hex::encode(span_id))
}

/// Parses a `grpc-timeout` header value: up to 8 digits and a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`).
#[must_use]
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

/// Reads the call deadline from the `grpc-timeout` header, if any.
#[must_use]
pub fn grpc_timeout(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, GRPC_TIMEOUT_HEADER).and_then(parse_grpc_timeout)
}
