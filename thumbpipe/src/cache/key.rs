//! Cache key identifying one thumbnail rendition.

use std::fmt;

/// Cache key uniquely identifying a thumbnail.
///
/// Two requests for the same source at the same target size and scale
/// produce equal keys. The key is the identity used both for request
/// coalescing and for memory/disk cache lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps an already-derived key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives a key from a source identity, target size and scale factor.
    ///
    /// The scale is rendered with up to three decimals so that `2.0` and
    /// `2.0000001` (float noise from layout code) map to the same key.
    pub fn derive(source_identity: &str, width: u32, height: u32, scale: f32) -> Self {
        let scale = format!("{:.3}", scale);
        let scale = scale.trim_end_matches('0').trim_end_matches('.');
        Self(format!("{}@{}x{}@{}x", source_identity, width, height, scale))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = CacheKey::derive("file:///photos/1.jpg", 512, 512, 2.0);
        let b = CacheKey::derive("file:///photos/1.jpg", 512, 512, 2.0);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "file:///photos/1.jpg@512x512@2x");
    }

    #[test]
    fn test_derive_distinguishes_size_and_scale() {
        let base = CacheKey::derive("clip-7", 128, 128, 2.0);
        assert_ne!(base, CacheKey::derive("clip-7", 128, 256, 2.0));
        assert_ne!(base, CacheKey::derive("clip-7", 128, 128, 3.0));
        assert_ne!(base, CacheKey::derive("clip-8", 128, 128, 2.0));
    }

    #[test]
    fn test_derive_fractional_scale() {
        let key = CacheKey::derive("clip", 100, 50, 1.5);
        assert_eq!(key.as_str(), "clip@100x50@1.5x");
    }

    #[test]
    fn test_derive_ignores_float_noise() {
        let a = CacheKey::derive("clip", 64, 64, 2.0);
        let b = CacheKey::derive("clip", 64, 64, 2.000_000_1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_matches_as_str() {
        let key = CacheKey::new("A");
        assert_eq!(key.to_string(), "A");
        assert_eq!(CacheKey::from("A"), key);
    }
}
