//! Security helpers for Lexia services.

/// Compare two secrets without short-circuiting on the first differing byte.
///
/// Length mismatch still returns early; secret length is not treated as sensitive.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check a presented header value against an optional configured secret.
///
/// No configured secret means every caller is accepted.
pub fn secret_matches(expected: Option<&str>, presented: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => presented.is_some_and(|p| constant_time_eq(expected, p)),
    }
}
