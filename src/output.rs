//! The bounded-output gate.
//!
//! Every textual result the orchestrator may consume passes through
//! [`bound_output`]: results over 4000 bytes keep a head slice and gain a
//! single-line notice naming the operation and hinting at a narrower
//! invocation. Content destined for a subordinate agent bypasses the gate.

/// Hard cap on orchestrator-facing output, in bytes.
pub const MAX_OUTPUT: usize = 4000;

/// Truncates `text` so the result never exceeds [`MAX_OUTPUT`] bytes.
///
/// The truncation notice names `operation` so the orchestrator knows which
/// verb produced the clipped result, and points at the narrower retrieval
/// paths (`extract --lines`, `--grep`, `--chunk-id`).
#[must_use]
pub fn bound_output(operation: &str, text: &str) -> String {
    bound_output_at(operation, text, MAX_OUTPUT)
}

/// Truncates `text` to at most `max_bytes`, appending a notice when clipped.
///
/// Exposed separately so formatters that reserve budget for their own
/// trailers (scan reports, result summaries) can gate at a smaller size.
#[must_use]
pub fn bound_output_at(operation: &str, text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let notice = format!(
        "\n... [output truncated at {max_bytes} bytes by {operation} -- narrow with extract --lines, --grep, or --chunk-id]"
    );
    let budget = max_bytes.saturating_sub(notice.len());
    let head = truncate_on_char_boundary(text, budget);
    format!("{head}{notice}")
}

/// Cuts a string at the largest char boundary not exceeding `max_bytes`.
fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
