//! Case-insensitive header multimap shared by the framing and HTTP layers.
//!
//! SPDY name/value blocks carry both ordinary HTTP fields and protocol
//! meta-fields whose keys begin with `:`. Ordinary keys are stored in
//! canonical `Word-Word` form; colon keys are stored verbatim in lowercase,
//! the only form they appear in on the wire.

use std::collections::{BTreeMap, btree_map};

/// SPDY/3 meta-header carrying the request method.
pub const HDR_METHOD: &str = ":method";
/// SPDY/3 meta-header carrying the full request URI.
pub const HDR_PATH: &str = ":path";
/// SPDY/3 meta-header carrying the URI scheme.
pub const HDR_SCHEME: &str = ":scheme";
/// SPDY/3 meta-header carrying the authority.
pub const HDR_HOST: &str = ":host";
/// SPDY/3 meta-header carrying the HTTP version.
pub const HDR_VERSION: &str = ":version";
/// SPDY/3 meta-header carrying the response status line.
pub const HDR_STATUS: &str = ":status";

/// An ordered multimap of header fields with case-insensitive keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    map: BTreeMap<String, Vec<String>>,
}

impl Headers {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append a value for `key`, keeping existing values.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.map
            .entry(canonical_key(key))
            .or_default()
            .push(value.into());
    }

    /// Replace all values for `key` with a single value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.map.insert(canonical_key(key), vec![value.into()]);
    }

    /// First value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map
            .get(&canonical_key(key))
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values for `key`.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.map
            .get(&canonical_key(key))
            .map_or(&[], Vec::as_slice)
    }

    /// Whether `key` is present with at least one value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool { self.map.contains_key(&canonical_key(key)) }

    /// Remove every value for `key`.
    pub fn remove(&mut self, key: &str) { self.map.remove(&canonical_key(key)); }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize { self.map.len() }

    /// Whether the map holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    /// Iterate over `(key, values)` pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter { self.map.iter() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.add(&k.into(), v);
        }
        h
    }
}

/// Canonical storage form of a header key.
///
/// Colon-prefixed meta-headers are lowercased verbatim. Anything that is not
/// a valid HTTP token is kept as given. Ordinary fields become
/// `Word-Word` form, e.g. `content-length` ⇒ `Content-Length`.
fn canonical_key(key: &str) -> String {
    if key.starts_with(':') {
        return key.to_ascii_lowercase();
    }
    if !key.bytes().all(is_token_byte) {
        return key.to_owned();
    }
    let mut out = String::with_capacity(key.len());
    let mut upper = true;
    for b in key.bytes() {
        let c = if upper {
            b.to_ascii_uppercase()
        } else {
            b.to_ascii_lowercase()
        };
        out.push(c as char);
        upper = b == b'-';
    }
    out
}

fn is_token_byte(b: u8) -> bool {
    matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9')
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}
