//! Endpoint sanitization and URL validation.
//!
//! # Responsibilities
//! - Strip HTML tags, stray angle brackets and the `javascript:` scheme
//! - Remove path traversal (`../`, `..\`), drop `.` and `..` segments
//!   (including `%2e` spellings) and collapse repeated slashes
//! - Guarantee a leading `/`
//! - Check the final URL scheme before dispatch
//! - Reject a built URL whose path leaves the base path
//!
//! # Design Decisions
//! - Removals repeat until nothing changes, so removing one sequence can
//!   never splice together another (e.g. `javajavascript:script:`)
//! - Pure functions; the output of `sanitize` is a fixpoint of `sanitize`

use url::Url;

use crate::http::types::PipelineError;

const SCRIPT_SCHEME: &str = "javascript:";

/// Normalize a raw endpoint path before it becomes part of a URL.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = collapse_slashes(&drop_dot_segments(&strip_traversal(
            &strip_script_scheme(&strip_tags(&current)),
        )));
        if next == current {
            break;
        }
        current = next;
    }

    if !current.starts_with('/') {
        current.insert(0, '/');
    }
    current
}

/// Join a sanitized endpoint onto the base URL and check the result.
///
/// The resolved path must stay at or below the base URL's path.
pub fn build_url(base: &Url, endpoint: &str) -> Result<Url, PipelineError> {
    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), endpoint);
    let url = Url::parse(&joined)
        .map_err(|e| PipelineError::Validation(format!("invalid URL '{}': {}", joined, e)))?;
    validate_url(&url)?;

    let prefix = base.path().trim_end_matches('/');
    let path = url.path();
    if path != prefix && !path.starts_with(&format!("{}/", prefix)) {
        return Err(PipelineError::Validation(format!(
            "URL path '{}' escapes base path '{}'",
            path,
            base.path()
        )));
    }
    Ok(url)
}

/// Only http and https URLs may be dispatched.
pub fn validate_url(url: &Url) -> Result<(), PipelineError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PipelineError::Validation(format!(
            "unsupported URL scheme '{}'",
            other
        ))),
    }
}

/// Remove `<...>` tags, then any unmatched angle bracket.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        rest = match rest[start..].find('>') {
            Some(end) => &rest[start + end + 1..],
            None => &rest[start + 1..],
        };
    }
    out.push_str(rest);
    out.retain(|c| c != '>');
    out
}

fn strip_script_scheme(input: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical.
    let lower = input.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut pos = 0;
    while let Some(found) = lower[pos..].find(SCRIPT_SCHEME) {
        out.push_str(&input[pos..pos + found]);
        pos += found + SCRIPT_SCHEME.len();
    }
    out.push_str(&input[pos..]);
    out
}

fn strip_traversal(input: &str) -> String {
    input.replace("../", "").replace("..\\", "")
}

/// Drop `.` and `..` path segments. The query string is left alone.
fn drop_dot_segments(input: &str) -> String {
    let (path, query) = match input.find('?') {
        Some(at) => input.split_at(at),
        None => (input, ""),
    };
    let mut out = path
        .split(['/', '\\'])
        .filter(|segment| !is_dot_segment(segment))
        .collect::<Vec<_>>()
        .join("/");
    out.push_str(query);
    out
}

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

fn collapse_slashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_slash = false;
    for c in input.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}
