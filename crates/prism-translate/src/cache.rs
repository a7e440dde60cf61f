//! In-memory translation cache keyed by module content and target.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use tracing::debug;

use crate::error::TranslateError;
use crate::options::{Target, TranslateOptions};
use crate::{translate, Translation};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    hash: blake3::Hash,
    target: Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookupSource {
    /// The translation was already cached.
    Memory,
    /// The translator ran and the result was inserted.
    Translated,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheLookup<'a> {
    pub source: CacheLookupSource,
    translation: &'a Translation,
}

impl std::ops::Deref for CacheLookup<'_> {
    type Target = Translation;

    fn deref(&self) -> &Self::Target {
        self.translation
    }
}

/// Successful translations keyed by the blake3 hash of the module bytes and the full target
/// options. Failures are never cached.
#[derive(Debug, Default)]
pub struct TranslationCache {
    map: HashMap<CacheKey, Translation>,
    options: TranslateOptions,
}

impl TranslationCache {
    pub fn new(options: TranslateOptions) -> Self {
        Self {
            map: HashMap::new(),
            options,
        }
    }

    pub fn options(&self) -> TranslateOptions {
        self.options
    }

    /// Changing the shared options invalidates every entry.
    pub fn set_options(&mut self, options: TranslateOptions) {
        if self.options != options {
            self.options = options;
            self.map.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn get_or_translate(
        &mut self,
        bytes: &[u8],
        target: &Target,
    ) -> Result<CacheLookup<'_>, TranslateError> {
        let key = CacheKey {
            hash: blake3::hash(bytes),
            target: target.clone(),
        };
        match self.map.entry(key) {
            Entry::Occupied(e) => Ok(CacheLookup {
                source: CacheLookupSource::Memory,
                translation: e.into_mut(),
            }),
            Entry::Vacant(e) => {
                debug!(target = %target, hash = %e.key().hash, "translation cache miss");
                let translation = translate(bytes, target, self.options)?;
                Ok(CacheLookup {
                    source: CacheLookupSource::Translated,
                    translation: e.insert(translation),
                })
            }
        }
    }
}
