//! Credential masking and error-message sanitizing
//!
//! Anything that might end up in a log line or a user-facing error goes
//! through `sanitize_message` so the API key can never leak, even when it
//! was interpolated into a third-party error string.

use once_cell::sync::Lazy;
use regex::Regex;

static API_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"sk-[A-Za-z0-9]{10,}").unwrap());
static KEY_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)OPENAI_API_KEY[=\s:]+\S+").unwrap());
static CREDENTIAL_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|secret)[=\s:]+\S+").unwrap());
static HOME_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(home|Users)/[^/\s]+").unwrap());

/// Mask an API key for display. Shows at most the first and last three
/// characters so a user can still recognize which key is configured.
pub fn mask_api_key(key: &str) -> String {
    if key.is_empty() {
        return "***NO_KEY***".into();
    }
    // Indexed by char, not byte: a key holding multi-byte characters must
    // mask cleanly instead of panicking on a non-boundary slice.
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "***SHORT_KEY***".into();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}***{tail}")
}

/// Check the key has the expected `sk-` format without logging it.
pub fn looks_like_api_key(key: &str) -> bool {
    let Some(body) = key.strip_prefix("sk-") else {
        return false;
    };
    body.len() >= 32 && body.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Strip key material, credential assignments, and home-directory user
/// names from a message before it is surfaced anywhere.
pub fn sanitize_message(message: &str) -> String {
    let out = API_KEY.replace_all(message, "***API_KEY***");
    let out = KEY_ASSIGNMENT.replace_all(&out, "OPENAI_API_KEY=***MASKED***");
    let out = CREDENTIAL_ASSIGNMENT.replace_all(&out, "${1}=***MASKED***");
    HOME_DIR.replace_all(&out, "/${1}/***").into_owned()
}
