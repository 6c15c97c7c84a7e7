//! Request and response metadata carried as HTTP headers.

use std::collections::HashMap;

/// Header name -> value. Inbound names are lower-cased by the transport.
pub type Metadata = HashMap<String, String>;

/// Looks up `name` ignoring ASCII case.
///
/// Tries an exact match first so lower-case lookups never allocate.
#[must_use]
pub fn get_ignore_case<'a>(metadata: &'a Metadata, name: &str) -> Option<&'a str> {
    if let Some(value) = metadata.get(name) {
        return Some(value.as_str());
    }
    metadata
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
