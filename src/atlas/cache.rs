use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{AtlasRect, HitTestIndex, OpacityMask, ShelfPacker, SurfaceBackend, UvRect};
use crate::{
    error::KuraError,
    parsing::AtlasConfig,
    rdb::{AssetId, AssetIndex, Decoder, OverrideSource, PixelBuffer},
    utils::{Miss, Slot, SlotCache},
};

/// What the renderer needs to draw one sprite.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpriteHandle {
    pub present: bool,
    /// Index of the atlas surface holding the sprite.
    pub surface: usize,
    pub uv: UvRect,
    pub width: u32,
    pub height: u32,
}

impl SpriteHandle {
    pub const MISSING: SpriteHandle = SpriteHandle {
        present: false,
        surface: 0,
        uv: UvRect {
            u0: 0.0,
            v0: 0.0,
            u1: 0.0,
            v1: 0.0,
        },
        width: 0,
        height: 0,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpriteSource {
    Override,
    Archive,
}

#[derive(Debug)]
pub struct LoadedSprite {
    pub pixels: PixelBuffer,
    pub source: SpriteSource,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Decoder invocations over the decoder's lifetime, failed ones included.
    pub decodes: u64,
    pub override_loads: u64,
    pub archive_loads: u64,
    pub failures: u64,
    pub resident: usize,
}

/// One failure reported by a cache. Each asset id is reported at most once
/// between resets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub family: String,
    pub id: AssetId,
    pub miss: Miss,
    pub message: String,
}

#[derive(Clone, Copy, Debug)]
struct ResidentSprite {
    surface: usize,
    rect: AtlasRect,
    uv: UvRect,
}

impl ResidentSprite {
    fn handle(&self) -> SpriteHandle {
        SpriteHandle {
            present: true,
            surface: self.surface,
            uv: self.uv,
            width: self.rect.width,
            height: self.rect.height,
        }
    }
}

struct AtlasPage<S> {
    surface: S,
    packer: ShelfPacker,
}

/// Produces pixels for an asset id: the override source first, then the
/// archive. Holds only shared read-only state, so clones can decode on
/// worker threads while the owning cache stays untouched.
#[derive(Clone)]
pub struct SpriteLoader {
    index: Arc<AssetIndex>,
    decoder: Arc<Decoder>,
    overrides: Option<Arc<dyn OverrideSource>>,
}

impl SpriteLoader {
    pub fn new(
        index: Arc<AssetIndex>,
        decoder: Arc<Decoder>,
        overrides: Option<Arc<dyn OverrideSource>>,
    ) -> Self {
        Self {
            index,
            decoder,
            overrides,
        }
    }

    pub fn load(&self, id: AssetId) -> Result<LoadedSprite, KuraError> {
        if let Some(pixels) = self.overrides.as_ref().and_then(|src| src.try_load(id)) {
            // Override dimensions win; replacement packs are often upscaled.
            if let Some(entry) = self.index.get(id) {
                let recorded = (entry.width as u32, entry.height as u32);
                if recorded != (0, 0) && recorded != (pixels.width(), pixels.height()) {
                    debug!(
                        resource = "override",
                        id,
                        recorded = ?recorded,
                        actual = ?(pixels.width(), pixels.height()),
                        "override dimensions differ from index"
                    );
                }
            }
            return Ok(LoadedSprite {
                pixels,
                source: SpriteSource::Override,
            });
        }

        let entry = self.index.get(id).ok_or(KuraError::InvalidAssetId(id))?;
        let pixels = self.decoder.decode(id, entry)?;
        Ok(LoadedSprite {
            pixels,
            source: SpriteSource::Archive,
        })
    }
}

pub struct AtlasCacheBuilder {
    family: String,
    index: Arc<AssetIndex>,
    decoder: Arc<Decoder>,
    overrides: Option<Arc<dyn OverrideSource>>,
    config: AtlasConfig,
}

impl AtlasCacheBuilder {
    pub fn new(family: &str, index: Arc<AssetIndex>, decoder: Arc<Decoder>) -> Self {
        Self {
            family: family.to_string(),
            index,
            decoder,
            overrides: None,
            config: AtlasConfig::default(),
        }
    }

    pub fn overrides(mut self, overrides: Arc<dyn OverrideSource>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Out-of-range values are clamped, see [`AtlasConfig::clamped`].
    pub fn config(mut self, config: AtlasConfig) -> Self {
        self.config = config.clamped();
        self
    }

    pub fn build<B: SurfaceBackend>(self, backend: B) -> AtlasCache<B> {
        let len = self.index.len();
        AtlasCache {
            family: self.family,
            config: self.config,
            loader: SpriteLoader::new(self.index, self.decoder, self.overrides),
            backend,
            pages: Vec::new(),
            slots: SlotCache::new(len),
            hits: HitTestIndex::new(len),
            stats: CacheStats::default(),
            diagnostics: Vec::new(),
        }
    }
}

////////////////////////////////////////////////
/// AtlasCache
/// * Lazily packs the sprites of one asset family into shared atlas
///   surfaces and remembers where each one landed.
///
/// * One slot per index entry. A slot is filled on first successful load,
///   or marked missing on failure so the id is never decoded again. Slots are
///   never evicted one by one; `reset` drops every slot, every hit-test mask
///   and every surface together.
///
/// * Every mutating call takes `&mut self`, so atlas writes are serialized
///   on whichever thread owns the cache. Use [`SharedAtlasCache`] to share
///   it across threads.
////////////////////////////////////////////////
pub struct AtlasCache<B: SurfaceBackend> {
    family: String,
    config: AtlasConfig,
    loader: SpriteLoader,
    backend: B,
    pages: Vec<AtlasPage<B::Surface>>,
    slots: SlotCache<ResidentSprite>,
    hits: HitTestIndex,
    stats: CacheStats,
    diagnostics: Vec<Diagnostic>,
}

impl<B: SurfaceBackend> AtlasCache<B> {
    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn loader(&self) -> SpriteLoader {
        self.loader.clone()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the sprite for `id`, loading and packing it on first use.
    /// Failures come back as a handle with `present == false`.
    pub fn get(&mut self, id: AssetId) -> SpriteHandle {
        if let Some(handle) = self.lookup(id) {
            return handle;
        }

        let loaded = self.loader.load(id);
        let (handle, surface) = self.complete(id, loaded);
        if let Some(surface) = surface {
            self.flush_surface(surface);
        }
        handle
    }

    /// Cached answer for `id`, or `None` when the slot has not been tried.
    pub fn lookup(&mut self, id: AssetId) -> Option<SpriteHandle> {
        match self.slots.get(id as usize) {
            Some(Slot::Empty) => None,
            Some(Slot::Resident(sprite)) => {
                self.stats.hits += 1;
                Some(sprite.handle())
            }
            Some(Slot::Missing(_)) | None => {
                self.stats.misses += 1;
                Some(SpriteHandle::MISSING)
            }
        }
    }

    /// Inserts the result of a [`SpriteLoader::load`] made elsewhere. If the
    /// slot was settled in the meantime the new pixels are dropped.
    pub fn insert_loaded(
        &mut self,
        id: AssetId,
        loaded: Result<LoadedSprite, KuraError>,
    ) -> SpriteHandle {
        if let Some(handle) = self.lookup(id) {
            return handle;
        }

        let (handle, surface) = self.complete(id, loaded);
        if let Some(surface) = surface {
            self.flush_surface(surface);
        }
        handle
    }

    /// Loads every untried id in `ids`, decoding on the rayon pool and packing
    /// on this thread. Returns how many sprites became resident.
    pub fn prefetch(&mut self, ids: &[AssetId]) -> usize {
        let mut pending: Vec<AssetId> = ids
            .iter()
            .copied()
            .filter(|id| self.slots.get(*id as usize).is_some_and(Slot::is_empty))
            .collect();
        pending.sort_unstable();
        pending.dedup();
        if pending.is_empty() {
            return 0;
        }

        let loader = &self.loader;
        let loaded: Vec<(AssetId, Result<LoadedSprite, KuraError>)> = pending
            .par_iter()
            .map(|&id| (id, loader.load(id)))
            .collect();

        let mut touched: Vec<usize> = Vec::new();
        let mut resident = 0;
        for (id, result) in loaded {
            let (handle, surface) = self.complete(id, result);
            if handle.present {
                resident += 1;
            }
            if let Some(surface) = surface {
                if !touched.contains(&surface) {
                    touched.push(surface);
                }
            }
        }
        for surface in touched {
            self.flush_surface(surface);
        }

        debug!(resource = "atlas", family = %self.family, requested = ids.len(), resident, "prefetch");
        resident
    }

    /// Opacity query against a resident sprite. See [`HitTestIndex::test`].
    pub fn test(&self, id: AssetId, x: i32, y: i32, scale: f32) -> bool {
        self.hits.test(id, x, y, scale)
    }

    pub fn hit_test_index(&self) -> &HitTestIndex {
        &self.hits
    }

    pub fn surface(&self, index: usize) -> Option<&B::Surface> {
        self.pages.get(index).map(|page| &page.surface)
    }

    pub fn surface_count(&self) -> usize {
        self.pages.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            decodes: self.loader.decoder.decode_count(),
            resident: self.slots.resident_count(),
            ..self.stats
        }
    }

    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Drops every slot, hit-test mask and surface. Ids that failed before,
    /// including capacity failures, are tried again on their next `get`.
    pub fn reset(&mut self) {
        for page in self.pages.drain(..) {
            self.backend.destroy_surface(page.surface);
        }
        self.slots.clear();
        self.hits.clear();
        self.stats = CacheStats::default();

        info!(resource = "atlas", family = %self.family, max_dimension = self.config.max_dimension, "atlas reset");
    }

    /// Applies a new configuration, resetting the cache only when it changed.
    pub fn reconfigure(&mut self, config: AtlasConfig) -> bool {
        let config = config.clamped();
        if config == self.config {
            return false;
        }
        self.config = config;
        self.reset();
        true
    }

    /// Settles an empty slot. Returns the handle and the surface written to,
    /// which the caller must flush.
    fn complete(
        &mut self,
        id: AssetId,
        loaded: Result<LoadedSprite, KuraError>,
    ) -> (SpriteHandle, Option<usize>) {
        let result = loaded.and_then(|LoadedSprite { pixels, source }| {
            let sprite = self.insert(id, &pixels)?;
            Ok((sprite, source))
        });

        match result {
            Ok((sprite, source)) => {
                match source {
                    SpriteSource::Override => self.stats.override_loads += 1,
                    SpriteSource::Archive => self.stats.archive_loads += 1,
                }
                info!(resource = "sprite", family = %self.family, id, source = ?source);
                (sprite.handle(), Some(sprite.surface))
            }
            Err(err) => {
                self.fail(id, err);
                (SpriteHandle::MISSING, None)
            }
        }
    }

    fn insert(&mut self, id: AssetId, pixels: &PixelBuffer) -> Result<ResidentSprite, KuraError> {
        let (width, height) = (pixels.width(), pixels.height());
        if width == 0 || height == 0 {
            return Err(KuraError::corrupt(id, "zero-sized sprite"));
        }

        let (surface, rect) = self.allocate(width, height)?;
        let page = &mut self.pages[surface];
        self.backend.write_region(&mut page.surface, rect, pixels)?;

        let sprite = ResidentSprite {
            surface,
            rect,
            uv: rect.uv(page.packer.dimension()),
        };
        let packed = page.packer.allocations();
        self.hits
            .insert(id, OpacityMask::from_pixels(pixels, self.config.alpha_threshold));
        self.slots.fill(id as usize, sprite);

        debug!(resource = "atlas", family = %self.family, id, surface, x = rect.x, y = rect.y, width, height, packed);
        Ok(sprite)
    }

    fn allocate(&mut self, width: u32, height: u32) -> Result<(usize, AtlasRect), KuraError> {
        let max_dimension = self.config.max_dimension;
        let exceeded = KuraError::CapacityExceeded {
            width,
            height,
            max_dimension,
        };
        if width > max_dimension || height > max_dimension {
            return Err(exceeded);
        }

        for (i, page) in self.pages.iter_mut().enumerate() {
            if let Some(rect) = page.packer.allocate(width, height) {
                return Ok((i, rect));
            }
        }

        if self.pages.len() >= self.config.max_pages {
            return Err(exceeded);
        }

        let label = format!("{}::atlas{}", self.family, self.pages.len());
        let surface = self.backend.create_surface(&label, max_dimension)?;
        let mut packer = ShelfPacker::new(max_dimension, self.config.padding);
        let rect = packer.allocate(width, height).ok_or(exceeded)?;
        self.pages.push(AtlasPage { surface, packer });

        info!(resource = "atlas", family = %self.family, surface = %label, dimension = max_dimension);
        Ok((self.pages.len() - 1, rect))
    }

    fn flush_surface(&mut self, surface: usize) {
        if let Some(page) = self.pages.get_mut(surface) {
            if let Err(err) = self.backend.flush(&mut page.surface) {
                warn!(resource = "atlas", family = %self.family, surface, error = %err, "atlas flush failed");
            }
        }
    }

    fn fail(&mut self, id: AssetId, err: KuraError) {
        let miss = match &err {
            KuraError::InvalidAssetId(_) => Miss::InvalidAssetId,
            KuraError::CorruptRecord { .. } => Miss::CorruptRecord,
            KuraError::UnsupportedFormat { .. } => Miss::UnsupportedFormat,
            KuraError::CapacityExceeded { .. } => Miss::CapacityExceeded,
            _ => Miss::UploadFailure,
        };

        self.slots.mark_missing(id as usize, miss);
        self.stats.misses += 1;
        if miss == Miss::InvalidAssetId {
            return;
        }

        self.stats.failures += 1;
        warn!(resource = "sprite", family = %self.family, id, miss = ?miss, error = %err, "sprite unavailable");
        self.diagnostics.push(Diagnostic {
            family: self.family.clone(),
            id,
            miss,
            message: err.to_string(),
        });
    }
}

impl<B: SurfaceBackend> Drop for AtlasCache<B> {
    fn drop(&mut self) {
        for page in self.pages.drain(..) {
            self.backend.destroy_surface(page.surface);
        }
    }
}

/// An [`AtlasCache`] behind one mutex. Decoding runs outside the lock; only
/// the insert step holds it, so `reset` waits for in-flight inserts.
pub struct SharedAtlasCache<B: SurfaceBackend> {
    inner: Arc<Mutex<AtlasCache<B>>>,
}

impl<B: SurfaceBackend> Clone for SharedAtlasCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SurfaceBackend> SharedAtlasCache<B> {
    pub fn new(cache: AtlasCache<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AtlasCache<B>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: AssetId) -> SpriteHandle {
        let loader = {
            let mut cache = self.lock();
            if let Some(handle) = cache.lookup(id) {
                return handle;
            }
            cache.loader()
        };

        let loaded = loader.load(id);
        self.lock().insert_loaded(id, loaded)
    }

    pub fn test(&self, id: AssetId, x: i32, y: i32, scale: f32) -> bool {
        self.lock().test(id, x, y, scale)
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn reconfigure(&self, config: AtlasConfig) -> bool {
        self.lock().reconfigure(config)
    }

    /// Runs `f` with exclusive access, e.g. to read surfaces for drawing.
    pub fn with<R>(&self, f: impl FnOnce(&mut AtlasCache<B>) -> R) -> R {
        f(&mut self.lock())
    }
}
