//! Turns downloaded media bytes into row media slots.

use std::path::Path;

use media_cache::{ArtBounds, ArtifactKind, CacheStats, ContentCache, render_ascii_art};
use sync_core::{MediaRef, MediaSlot, SyncFault};
use tracing::{debug, warn};

/// ASCII-art resolver backed by the content cache.
///
/// When the cache directory cannot be opened the resolver keeps working
/// without persistence.
#[derive(Debug)]
pub struct MediaResolver {
    cache: Option<ContentCache>,
    bounds: ArtBounds,
}

impl MediaResolver {
    pub fn open(dir: &Path, budget_bytes: u64, bounds: ArtBounds) -> Self {
        let cache = match ContentCache::open(dir, budget_bytes, bounds) {
            Ok(cache) => Some(cache),
            Err(err) => {
                let fault = SyncFault::CacheIo {
                    message: err.to_string(),
                };
                warn!(fault = fault.label(), error = %err, "media cache disabled");
                None
            }
        };
        Self { cache, bounds }
    }

    /// Resolver that derives art on every request.
    pub fn uncached(bounds: ArtBounds) -> Self {
        Self {
            cache: None,
            bounds,
        }
    }

    pub fn resolve(&mut self, media: &MediaRef, bytes: &[u8]) -> MediaSlot {
        let art = match self.cache.as_mut() {
            Some(cache) => cache.get(bytes, ArtifactKind::Art).map(|lookup| {
                debug!(media = %media.0, key = %lookup.key, hit = lookup.hit, "media resolved");
                lookup.artifact.as_art().map(str::to_owned)
            }),
            None => render_ascii_art(bytes, self.bounds).map(Some),
        };

        match art {
            Ok(Some(art)) => MediaSlot::Ready(art),
            Ok(None) => MediaSlot::Unavailable,
            Err(err) => {
                debug!(media = %media.0, error = %err, "media could not be rendered");
                MediaSlot::Unavailable
            }
        }
    }

    pub fn stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ContentCache::stats)
    }

    pub fn is_persistent(&self) -> bool {
        self.cache.is_some()
    }
}
