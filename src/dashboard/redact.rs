//! Secret redaction for everything the API sends out.
//!
//! Three shapes are masked, in this order:
//! 1. `Bearer <token>` anywhere in a line.
//! 2. The value after a sensitive key (`api_key=…`, `"token": "…"`,
//!    `Authorization: …`), quoted or bare.
//! 3. Any run of 32+ ASCII letters and digits containing both, which is
//!    what broker tokens and API keys look like when they leak without a
//!    key in front of them.
//!
//! Redacting an already-redacted line leaves it unchanged.

use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Key fragments whose values are never shown. Matched case-insensitively.
const SENSITIVE_KEYS: &[&str] = &[
    "api_key",
    "api-key",
    "apikey",
    "access_token",
    "token",
    "secret",
    "password",
    "passwd",
    "authorization",
    "private_key",
    "credential",
];

const MIN_TOKEN_LEN: usize = 32;

/// True when a JSON object key or log field name names a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|k| key.contains(k))
}

/// Mask every secret-shaped substring of `line`.
pub fn redact_line(line: &str) -> String {
    let line = redact_bearer(line);
    let line = redact_pairs(&line);
    redact_long_tokens(&line)
}

/// Redact string values and sensitive keys throughout a JSON document.
pub fn redact_json(value: &mut Value) {
    match value {
        Value::String(s) => {
            let redacted = redact_line(s);
            if redacted != *s {
                *s = redacted;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json),
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if is_sensitive_key(key) && !v.is_null() {
                    *v = Value::String(REDACTED.to_string());
                } else {
                    redact_json(v);
                }
            }
        }
        _ => {}
    }
}

fn is_quote(b: u8) -> bool {
    b == b'"' || b == b'\''
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    i
}

/// End of the value starting at `start`. Quoted values run to the closing
/// quote; bare ones stop at whitespace or a delimiter.
fn value_end(bytes: &[u8], start: usize, quote: Option<u8>) -> usize {
    let mut j = start;
    while j < bytes.len() {
        let b = bytes[j];
        let end = match quote {
            Some(q) => b == q,
            None => {
                b.is_ascii_whitespace() || is_quote(b) || matches!(b, b',' | b'&' | b';' | b'}' | b')' | b']')
            }
        };
        if end {
            break;
        }
        j += 1;
    }
    j
}

fn redact_bearer(input: &str) -> String {
    const BEARER: &[u8] = b"bearer ";
    let lower = input.to_ascii_lowercase();
    let lower = lower.as_bytes();
    let bytes = input.as_bytes();

    let mut out = String::with_capacity(input.len());
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        if !lower[i..].starts_with(BEARER) {
            i += 1;
            continue;
        }
        let start = skip_spaces(bytes, i + BEARER.len());
        let end = value_end(bytes, start, None);
        if end > start {
            out.push_str(&input[copied..start]);
            out.push_str(REDACTED);
            copied = end;
        }
        i = end.max(i + 1);
    }
    out.push_str(&input[copied..]);
    out
}

fn redact_pairs(input: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let lower = lower.as_bytes();
    let bytes = input.as_bytes();

    let mut out = String::with_capacity(input.len());
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        let Some(key) = SENSITIVE_KEYS.iter().find(|k| lower[i..].starts_with(k.as_bytes())) else {
            i += 1;
            continue;
        };

        // The rest of the identifier: OANDA_API_TOKEN, client_secret_v2.
        let mut j = i + key.len();
        while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && is_quote(bytes[j]) {
            j += 1;
        }
        j = skip_spaces(bytes, j);
        if j >= bytes.len() || !(bytes[j] == b'=' || bytes[j] == b':') {
            i += key.len();
            continue;
        }
        j = skip_spaces(bytes, j + 1);

        let quote = match bytes.get(j) {
            Some(&q) if is_quote(q) => {
                j += 1;
                Some(q)
            }
            _ => None,
        };
        let start = j;
        let end = value_end(bytes, start, quote);
        if end > start && &input[start..end] != REDACTED {
            out.push_str(&input[copied..start]);
            out.push_str(REDACTED);
            copied = end;
        }
        i = end.max(i + 1);
    }
    out.push_str(&input[copied..]);
    out
}

fn redact_long_tokens(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_alphanumeric() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
            i += 1;
        }
        let run = &bytes[start..i];
        let has_digit = run.iter().any(u8::is_ascii_digit);
        let has_alpha = run.iter().any(u8::is_ascii_alphabetic);
        if run.len() >= MIN_TOKEN_LEN && has_digit && has_alpha {
            out.push_str(&input[copied..start]);
            out.push_str(REDACTED);
            copied = i;
        }
    }
    out.push_str(&input[copied..]);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
