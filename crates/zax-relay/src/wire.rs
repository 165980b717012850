//! Line framing shared by every relay endpoint.
//!
//! Bodies are lines joined by CRLF. The client must also accept bare
//! LF from lenient servers. Base64 payloads never contain line breaks,
//! so splitting is unambiguous.

/// The canonical line separator.
pub const CRLF: &str = "\r\n";

/// Join request lines with CRLF.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join(CRLF)
}

/// Split a response body into lines.
///
/// Accepts CRLF or bare LF and drops trailing empty lines (a final
/// newline is not an extra line).
pub fn split_lines(body: &str) -> Vec<String> {
    let mut lines: Vec<String> = body
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}
