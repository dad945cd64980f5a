//! Small helpers shared by the parsers and render stages.
//!
//! # Modules
//!
//! - [`backoff`] - Exponential backoff for retried fetches
//!
//! The free functions cover the escaping schemes the renderer needs:
//! HTML text escaping for substituted user preference values, JSON that
//! can sit inside an inline `<script>` element, and
//! `application/x-www-form-urlencoded` encoding for generated URLs.

pub mod backoff;

pub use backoff::exponential_backoff_with_delay;

/// Escape text for safe inclusion in HTML markup or attribute values.
pub fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Serialize `value` as JSON that cannot terminate an enclosing `<script>` element.
///
/// `<`, `>` and `&` become `\u003c`, `\u003e` and `\u0026`; the line
/// separators U+2028 and U+2029 are escaped as well. The result parses to
/// the same value.
///
/// # Errors
///
/// Fails when `value` cannot be serialized.
pub fn script_json<T: serde::Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_string(value)?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            _ => escaped.push(c),
        }
    }
    Ok(escaped)
}

/// URL-encode a value for use as a query parameter.
pub fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Build a query string from ordered key/value pairs.
///
/// Pairs with an empty value are kept; the ordering of `pairs` is preserved.
pub fn query_string<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
