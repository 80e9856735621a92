//! Color identifier lookup.
//!
//! The host owns the mapping from color identifiers to actual colors. The
//! export engine reaches it through [`ColorLookup`]; conversion to the 8-bit
//! RGBA stored in color libraries happens here, not in the host.
//!
//! ## Lookup Modes
//!
//! | Type | Use Case |
//! |------|----------|
//! | [`PaletteColorLookup`] | Color table carried in a session snapshot |
//! | [`CachedColorLookup`] | Wraps any lookup with an LRU cache of converted colors |
//! | [`ChainedColorLookup`] | Session palette first, host lookup second |

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;

use crate::types::snapshot::PaletteEntry;
use crate::types::{ColorId, HostColor, Rgba};

/// Host capability: convert a color identifier into a color.
pub trait ColorLookup: Send + Sync {
    /// Look up `id`. Returns `None` for identifiers the host does not know.
    fn lookup(&self, id: ColorId) -> Option<HostColor>;

    /// Look up `id` and convert it to library RGBA.
    fn rgba(&self, id: ColorId) -> Option<Rgba> {
        self.lookup(id).map(|color| color.to_rgba())
    }
}

impl<L: ColorLookup + ?Sized> ColorLookup for &L {
    fn lookup(&self, id: ColorId) -> Option<HostColor> {
        (**self).lookup(id)
    }

    fn rgba(&self, id: ColorId) -> Option<Rgba> {
        (**self).rgba(id)
    }
}

impl<L: ColorLookup + ?Sized> ColorLookup for Arc<L> {
    fn lookup(&self, id: ColorId) -> Option<HostColor> {
        (**self).lookup(id)
    }

    fn rgba(&self, id: ColorId) -> Option<Rgba> {
        (**self).rgba(id)
    }
}

/// Color table lookup.
///
/// Packed custom identifiers (see [`ColorId::packed_rgb`]) resolve to their
/// explicit RGB with opaque alpha even when absent from the table.
#[derive(Debug, Clone, Default)]
pub struct PaletteColorLookup {
    colors: BTreeMap<ColorId, [f32; 3]>,
}

impl PaletteColorLookup {
    /// Create an empty palette.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a palette from snapshot entries. Later entries replace earlier ones.
    pub fn from_entries(entries: &[PaletteEntry]) -> Self {
        let colors = entries.iter().map(|e| (ColorId(e.id), e.rgb)).collect();
        Self { colors }
    }

    /// Add or replace a color.
    pub fn insert(&mut self, id: ColorId, rgb: [f32; 3]) {
        self.colors.insert(id, rgb);
    }

    /// Builder-style insert.
    pub fn with(mut self, id: impl Into<ColorId>, rgb: [f32; 3]) -> Self {
        self.insert(id.into(), rgb);
        self
    }

    /// Number of table entries.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl ColorLookup for PaletteColorLookup {
    fn lookup(&self, id: ColorId) -> Option<HostColor> {
        if let Some([r, g, b]) = id.packed_rgb() {
            return Some(HostColor::Rgba(Rgba::new(r, g, b, 255)));
        }
        self.colors.get(&id).copied().map(HostColor::Normalized)
    }
}

/// Tries `primary`, then `fallback`.
///
/// Conversion goes through each lookup's own [`ColorLookup::rgba`], so a
/// cached fallback keeps its cache.
#[derive(Debug, Clone)]
pub struct ChainedColorLookup<A, B> {
    primary: A,
    fallback: B,
}

impl<A: ColorLookup, B: ColorLookup> ChainedColorLookup<A, B> {
    /// Create a new chained lookup.
    pub fn new(primary: A, fallback: B) -> Self {
        Self { primary, fallback }
    }
}

impl<A: ColorLookup, B: ColorLookup> ColorLookup for ChainedColorLookup<A, B> {
    fn lookup(&self, id: ColorId) -> Option<HostColor> {
        self.primary.lookup(id).or_else(|| self.fallback.lookup(id))
    }

    fn rgba(&self, id: ColorId) -> Option<Rgba> {
        self.primary.rgba(id).or_else(|| self.fallback.rgba(id))
    }
}

/// Configuration for the color lookup cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 4_096,
            enabled: true,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups forwarded to the inner lookup.
    pub misses: u64,
}

/// LRU-cached color lookup.
///
/// Thread-safe; shared by all exports of one [`Exporter`](crate::Exporter).
/// Only successful conversions are cached.
pub struct CachedColorLookup<L> {
    inner: L,
    cache: Option<RwLock<LruCache<ColorId, Rgba>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<L: ColorLookup> CachedColorLookup<L> {
    /// Wrap `inner` with a cache configured by `config`.
    pub fn new(inner: L, config: &CacheConfig) -> Self {
        let cache = match NonZeroUsize::new(config.max_entries) {
            Some(size) if config.enabled => Some(RwLock::new(LruCache::new(size))),
            _ => None,
        };

        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get the wrapped lookup.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Get cache statistics.
    ///
    /// Returns `None` if caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
            }
        })
    }

    /// Drop all cached colors.
    ///
    /// Needed when the host redefines colors between exports.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

impl<L: ColorLookup> ColorLookup for CachedColorLookup<L> {
    fn lookup(&self, id: ColorId) -> Option<HostColor> {
        self.inner.lookup(id)
    }

    fn rgba(&self, id: ColorId) -> Option<Rgba> {
        let Some(cache) = &self.cache else {
            return self.inner.rgba(id);
        };

        if let Some(&rgba) = cache.read().peek(&id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(rgba);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let rgba = self.inner.rgba(id)?;
        cache.write().put(id, rgba);
        Some(rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_normalized_lookup() {
        let palette = PaletteColorLookup::new().with(7, [0.0, 0.5, 1.0]);
        assert_eq!(palette.rgba(ColorId(7)), Some(Rgba::new(0, 127, 255, 255)));
        assert_eq!(palette.rgba(ColorId(8)), None);
    }

    #[test]
    fn test_packed_custom_color_passes_through() {
        let palette = PaletteColorLookup::new();
        let id = ColorId::from_rgb(10, 20, 30);
        assert_eq!(palette.lookup(id), Some(HostColor::Rgba(Rgba::new(10, 20, 30, 255))));
    }

    #[test]
    fn test_cache_hits_and_misses() {
        let palette = PaletteColorLookup::new().with(1, [1.0, 0.0, 0.0]);
        let cached = CachedColorLookup::new(palette, &CacheConfig::default());

        assert_eq!(cached.rgba(ColorId(1)), Some(Rgba::new(255, 0, 0, 255)));
        assert_eq!(cached.rgba(ColorId(1)), Some(Rgba::new(255, 0, 0, 255)));
        assert_eq!(cached.rgba(ColorId(2)), None);

        let stats = cached.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.len, 1);
    }

    #[test]
    fn test_disabled_cache() {
        let palette = PaletteColorLookup::new().with(1, [1.0, 1.0, 1.0]);
        let config = CacheConfig {
            max_entries: 16,
            enabled: false,
        };
        let cached = CachedColorLookup::new(palette, &config);
        assert_eq!(cached.rgba(ColorId(1)), Some(Rgba::new(255, 255, 255, 255)));
        assert!(cached.cache_stats().is_none());
    }

    #[test]
    fn test_chained_prefers_primary() {
        let session = PaletteColorLookup::new().with(1, [0.0, 0.0, 0.0]);
        let host = CachedColorLookup::new(
            PaletteColorLookup::new().with(1, [1.0, 1.0, 1.0]).with(2, [1.0, 0.0, 0.0]),
            &CacheConfig::default(),
        );
        let chained = ChainedColorLookup::new(&session, &host);

        assert_eq!(chained.rgba(ColorId(1)), Some(Rgba::new(0, 0, 0, 255)));
        assert_eq!(chained.rgba(ColorId(2)), Some(Rgba::new(255, 0, 0, 255)));
        assert_eq!(chained.rgba(ColorId(3)), None);
        assert_eq!(host.cache_stats().unwrap().misses, 2);
    }

    #[test]
    fn test_clear_cache() {
        let palette = PaletteColorLookup::new().with(3, [0.0, 0.0, 0.0]);
        let cached = CachedColorLookup::new(palette, &CacheConfig::default());
        cached.rgba(ColorId(3));
        cached.clear_cache();
        assert_eq!(cached.cache_stats().unwrap().len, 0);
    }
}
