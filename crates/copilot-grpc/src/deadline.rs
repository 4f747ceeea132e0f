//! Caller deadlines carried in the `grpc-timeout` request header.

use std::time::Duration;

use tonic::metadata::MetadataMap;

pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Upper bound on how much earlier than the caller's deadline a handler stops.
const MAX_MARGIN: Duration = Duration::from_millis(100);

/// How long a handler may wait on downstream work for this request.
///
/// The transport cancels the request once `grpc-timeout` elapses, so the
/// handler gives up a tenth of the budget earlier (at most [`MAX_MARGIN`])
/// and still gets to answer with its own status.
pub fn handler_budget(metadata: &MetadataMap) -> Option<Duration> {
    grpc_timeout(metadata).map(|timeout| timeout - (timeout / 10).min(MAX_MARGIN))
}

/// Parse the caller's `grpc-timeout` header, if present and well formed.
///
/// The header is an ASCII integer of at most eight digits followed by a unit:
/// `H` hours, `M` minutes, `S` seconds, `m` millis, `u` micros, `n` nanos.
pub fn grpc_timeout(metadata: &MetadataMap) -> Option<Duration> {
    let raw = metadata.get(GRPC_TIMEOUT_HEADER)?.to_str().ok()?;
    parse(raw)
}

fn parse(raw: &str) -> Option<Duration> {
    if raw.len() < 2 {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(value * 60 * 60),
        "M" => Duration::from_secs(value * 60),
        "S" => Duration::from_secs(value),
        "m" => Duration::from_millis(value),
        "u" => Duration::from_micros(value),
        "n" => Duration::from_nanos(value),
        _ => return None,
    };
    Some(timeout)
}
