//! Call metadata (headers and trailers).
//!
//! Keys are case-insensitive and stored lower-cased. Keys ending in `-bin`
//! carry binary values, everything else carries text.

use bytes::Bytes;

/// Suffix marking a binary metadata key.
pub const BINARY_SUFFIX: &str = "-bin";

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    /// Text value.
    Ascii(String),
    /// Binary value (`-bin` keys).
    Binary(Bytes),
}

impl MetadataValue {
    /// Text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Ascii(s) => Some(s),
            MetadataValue::Binary(_) => None,
        }
    }

    /// Raw bytes of the value.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MetadataValue::Ascii(s) => s.as_bytes(),
            MetadataValue::Binary(b) => b,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Ascii(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Ascii(value)
    }
}

impl From<Bytes> for MetadataValue {
    fn from(value: Bytes) -> Self {
        MetadataValue::Binary(value)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(value: Vec<u8>) -> Self {
        MetadataValue::Binary(Bytes::from(value))
    }
}

/// Ordered multi-map of metadata entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing every existing value for it.
    ///
    /// Binary values are stored under a key ending in `-bin`; the suffix is
    /// appended when missing.
    pub fn insert(&mut self, key: &str, value: impl Into<MetadataValue>) {
        let value = value.into();
        let key = normalize_key(key, &value);
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value));
    }

    /// Add a value for `key`, keeping existing ones.
    pub fn append(&mut self, key: &str, value: impl Into<MetadataValue>) {
        let value = value.into();
        let key = normalize_key(key, &value);
        self.entries.push((key, value));
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        let key = key.to_ascii_lowercase();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// First text value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetadataValue::as_str)
    }

    /// Every value for `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> Vec<&MetadataValue> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Remove every value for `key`, returning how many were removed.
    pub fn remove(&mut self, key: &str) -> usize {
        let key = key.to_ascii_lowercase();
        let before = self.entries.len();
        self.entries.retain(|(k, _)| *k != key);
        before - self.entries.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn normalize_key(key: &str, value: &MetadataValue) -> String {
    let key = key.to_ascii_lowercase();
    match value {
        MetadataValue::Binary(_) if !key.ends_with(BINARY_SUFFIX) => {
            format!("{key}{BINARY_SUFFIX}")
        }
        _ => key,
    }
}

impl<K: AsRef<str>, V: Into<MetadataValue>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.append(key.as_ref(), value);
        }
        metadata
    }
}
