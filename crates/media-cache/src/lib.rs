//! Content-addressed media artifact cache and ASCII-art rendering.

pub mod ascii_art;
pub mod cache;
pub mod error;

pub use ascii_art::{ArtBounds, DENSITY_RAMP, render_ascii_art};
pub use cache::{Artifact, ArtifactKind, CacheLookup, CacheStats, ContentCache};
pub use error::MediaCacheError;
