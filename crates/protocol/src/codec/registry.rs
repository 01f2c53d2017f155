//! Tag → codec lookup table.
//!
//! Populated at construction time, then shared read-only (typically behind an
//! `Arc`) by every session. Registration takes `&mut self`, so once a registry
//! is shared it can no longer change.

use std::collections::HashMap;

use super::Codec;

/// Maps declared type tags to codecs.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Codec>,
}

impl CodecRegistry {
    /// Tag of the pixel-buffer preset.
    pub const NDARRAY: &'static str = "ndarray";
    /// Tag of the structured-value preset.
    pub const DICT: &'static str = "dict";

    /// A registry with no entries; every declared type resolves to identity.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// A registry holding the built-in presets.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Self::NDARRAY, Codec::Image);
        registry.register(Self::DICT, Codec::Json);
        registry
    }

    /// Binds `tag` to `codec`, returning the codec it replaces, if any.
    pub fn register(&mut self, tag: impl Into<String>, codec: Codec) -> Option<Codec> {
        self.codecs.insert(tag.into(), codec)
    }

    /// Builder-style [`CodecRegistry::register`].
    #[must_use]
    pub fn with(mut self, tag: impl Into<String>, codec: Codec) -> Self {
        self.register(tag, codec);
        self
    }

    /// Exact-match lookup.
    pub fn get(&self, tag: &str) -> Option<&Codec> {
        self.codecs.get(tag)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
