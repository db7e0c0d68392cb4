use sha2::{Digest, Sha256};

/// Upper bound on stored trace length, in characters.
pub const MAX_TRACE_CHARS: usize = 1000;
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";
pub const SHORT_MESSAGE_CHARS: usize = 100;

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Cuts a trace to [`MAX_TRACE_CHARS`] and appends [`TRUNCATION_MARKER`].
/// Shorter traces are returned as-is.
pub fn truncate_trace(trace: &str) -> String {
    match trace.char_indices().nth(MAX_TRACE_CHARS) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&trace[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => trace.to_string(),
    }
}

/// Content two failures must share to count as the same failure: the trace,
/// or the message when the trace is empty.
pub fn dedup_content<'a>(trace: &'a str, message: &'a str) -> &'a str {
    let trace = trace.trim();
    if trace.is_empty() {
        message
    } else {
        trace
    }
}

/// Content hash of a failure (hex SHA-256 of [`dedup_content`]).
pub fn failure_hash(trace: &str, message: &str) -> String {
    sha256_hex(dedup_content(trace, message))
}

/// First [`SHORT_MESSAGE_CHARS`] characters of the trace, or the message
/// when there is no trace.
pub fn short_message(trace: &str, message: &str) -> String {
    let source = dedup_content(trace, message);
    source.chars().take(SHORT_MESSAGE_CHARS).collect()
}
