//! Mapping of caller keys onto backend keys
//!
//! The remote store sees `<namespace><key>` so the cache's entries can be
//! listed and cleared without touching other tenants of the same Redis.
//! The file backend sees a sanitized file name. Sanitizing is lossy: keys that
//! differ only in characters outside `[A-Za-z0-9._-]` share a file.

/// Namespace prepended to every remote key
pub const DEFAULT_NAMESPACE: &str = "weather:";

/// Extension of files written by the file backend
pub const DEFAULT_EXTENSION: &str = "cache";

/// Translates caller keys into remote keys and file names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    namespace: String,
    extension: String,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE, DEFAULT_EXTENSION)
    }
}

impl KeyCodec {
    /// Creates a codec with a custom namespace and file extension
    ///
    /// The extension is given without the leading dot.
    pub fn new(namespace: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            extension: extension.into(),
        }
    }

    /// Prefix shared by every remote key of this cache
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// File extension, without the dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Key handed to the remote backend
    pub fn remote_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// File name handed to the file backend
    pub fn file_name(&self, key: &str) -> String {
        format!("{}.{}", sanitize(key), self.extension)
    }
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`
///
/// One replacement per character, so multi-byte characters shrink to a
/// single underscore.
pub fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
