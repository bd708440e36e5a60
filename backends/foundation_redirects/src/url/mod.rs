//! URL handling for redirect targets.
//!
//! WHY: A `Location` header can be absolute, protocol-relative, path-relative
//! or carry characters that are not valid in a URL. Every follow-up request
//! needs a single canonical absolute URL.
//!
//! WHAT: Redirect target normalization with fragment carry-over, percent
//! re-quoting, and the (scheme, host, port) [`TrustBoundary`] used to decide
//! credential forwarding.

mod boundary;
mod error;
mod normalize;

pub use boundary::*;
pub use error::*;
pub use normalize::*;

/// Splits the scheme off a raw URL string without fully parsing it.
///
/// Returns `None` when the string has no syntactically valid scheme
/// (ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) followed by `:`).
#[must_use]
pub fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let colon = raw.find(':')?;
    let scheme = &raw[..colon];

    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }

    Some((scheme, &raw[colon + 1..]))
}

/// Returns true if the raw URL string carries a network location
/// (`scheme://authority` or `//authority`).
#[must_use]
pub fn has_network_location(raw: &str) -> bool {
    let rest = match split_scheme(raw) {
        Some((_, rest)) => rest,
        None => raw,
    };

    match rest.strip_prefix("//") {
        Some(after) => {
            let end = after.find(['/', '?', '#']).unwrap_or(after.len());
            end > 0
        }
        None => false,
    }
}
