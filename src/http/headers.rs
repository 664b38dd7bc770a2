/// A single header entry.
///
/// Both the key and the value are trimmed on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name, with the casing it was first inserted with
    pub key: String,
    /// Header value
    pub value: String,
}

impl Header {
    pub fn new(key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        Self {
            key: key.as_ref().trim().to_string(),
            value: value.as_ref().trim().to_string(),
        }
    }
}

/// Ordered, case-insensitive header collection.
///
/// Holds at most one entry per distinct (case-insensitive) key. Setting a key
/// that already exists overwrites its value in place, so the original
/// insertion position and casing are preserved.
///
/// # Example
///
/// ```
/// # use trellis::http::headers::Headers;
/// let mut headers = Headers::new();
/// headers.set("Content-Type", "text/plain");
/// headers.set("content-type", "text/html");
///
/// assert_eq!(headers.len(), 1);
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a header.
    ///
    /// Blank keys or values are ignored, the same way an unset header is.
    pub fn set(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        let header = Header::new(key, value);

        if header.key.is_empty() || header.value.is_empty() {
            return;
        }

        match self.position(&header.key) {
            Some(idx) => self.entries[idx].value = header.value,
            None => self.entries.push(header),
        }
    }

    /// Looks a header value up by name, ignoring case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|idx| self.entries[idx].value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Removes a header, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.position(key).map(|idx| self.entries.remove(idx).value)
    }

    /// Keeps only the headers for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Header) -> bool) {
        self.entries.retain(|h| keep(h));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|h| h.key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|h| h.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serializes every entry as `key: value\r\n` followed by the blank line
    /// that ends a header block. The blank line is written even when the
    /// collection is empty.
    pub fn write(&self, out: &mut Vec<u8>) {
        for header in &self.entries {
            out.extend_from_slice(header.key.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(header.value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");
    }

    fn position(&self, key: &str) -> Option<usize> {
        let key = key.trim();
        self.entries
            .iter()
            .position(|h| h.key.eq_ignore_ascii_case(key))
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
