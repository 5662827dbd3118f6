//! Utility functions for turning user input into a domain key.
//!
//! Input arrives as anything from a bare hostname to a full URL with path,
//! port and query. Everything is reduced to a lowercase hostname without a
//! leading `www.` so it can be used as a stable cache key.

use crate::error::AnalysisError;
use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref SCHEME_AND_WWW: Regex =
        Regex::new(r"(?i)^(?:[a-z][a-z0-9+.\-]*://)?(?:www\.)?").expect("valid scheme pattern");
}

/// Normalize a URL or bare domain into a domain key.
///
/// The input is parsed as a URL (with `https://` prepended when no scheme is
/// present) and its host taken. When structured parsing fails, a textual
/// strip of the scheme and `www.` prefix is used instead.
///
/// # Examples
///
/// ```rust
/// use domain_intel_lib::normalize_domain;
///
/// assert_eq!(normalize_domain("https://www.Example.com/path").unwrap(), "example.com");
/// assert_eq!(normalize_domain("example.com").unwrap(), "example.com");
/// ```
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if the input is empty, nothing
/// resembling a host remains after normalization, or the host starts with `-`.
pub fn normalize_domain(input: &str) -> Result<String, AnalysisError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(AnalysisError::invalid_input(input, "URL is required"));
    }

    let domain = parse_host(trimmed).unwrap_or_else(|| strip_fallback(trimmed));

    if domain.is_empty() {
        return Err(AnalysisError::invalid_input(
            input,
            "Could not determine a domain from the URL",
        ));
    }

    // Keys are passed to the whois command; a leading dash reads as an option
    if domain.starts_with('-') {
        return Err(AnalysisError::invalid_input(
            input,
            "Domain must not start with '-'",
        ));
    }

    Ok(domain)
}

/// Structured path: parse as a URL and take the host.
fn parse_host(input: &str) -> Option<String> {
    let candidate = if has_scheme(input) {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();

    if host.is_empty() {
        return None;
    }

    Some(strip_www(&host).to_string())
}

/// Textual fallback for input the URL parser rejects.
fn strip_fallback(input: &str) -> String {
    let without_prefix = SCHEME_AND_WWW.replace(input, "");

    without_prefix
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('@')
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('.')
        .to_lowercase()
}

fn has_scheme(input: &str) -> bool {
    match input.find("://") {
        Some(idx) => {
            let scheme = &input[..idx];
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
