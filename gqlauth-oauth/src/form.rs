//! `application/x-www-form-urlencoded` request bodies.

/// Placeholder sent for absent values.
pub const NULL_VALUE: &str = "null";

/// Encode key/value pairs as a form body.
///
/// Keys and values are percent-encoded. A `None` value is sent as the
/// literal `null`; an empty value stays empty.
pub fn form_url_encode<K, V>(pairs: &[(K, Option<V>)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .iter()
        .map(|(key, value)| {
            let value = value
                .as_ref()
                .map(|v| AsRef::<str>::as_ref(v))
                .unwrap_or(NULL_VALUE);
            format!(
                "{}={}",
                urlencoding::encode(key.as_ref()),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
