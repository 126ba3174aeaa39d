pub mod atlas;
pub mod parsing;
pub mod rdb;
pub mod utils;

use std::{collections::HashMap, sync::Arc};

pub use atlas::*;
pub use parsing::*;
pub use rdb::*;
pub use utils::*;

use tracing::{info, warn};

pub struct StoreInfo<'a> {
    pub base_dir: &'a str,
    pub layout_file: Option<&'a str>,
}

struct Family {
    index: Arc<AssetIndex>,
    decoder: Arc<Decoder>,
    overrides: Option<Arc<dyn OverrideSource>>,
}

////////////////////////////////////////////////
/// Kura Store
/// * Opens every archive family named by the layout file and keeps
///   their indices and decoders alive.
///
/// * Read-only. Missing or malformed archives are logged once and behave as
///   empty families, so every lookup against them misses.
///
/// * Caches are handed out per family and share nothing with each other;
///   the store itself holds no GPU state.
////////////////////////////////////////////////
pub struct Store {
    layout: StoreLayoutFile,
    hues: Option<Arc<HueTable>>,
    families: HashMap<String, Family>,
}

impl Store {
    pub fn new(info: &StoreInfo) -> Result<Self, KuraError> {
        let layout: StoreLayoutFile = match info.layout_file {
            Some(f) => serde_json::from_str(&std::fs::read_to_string(f)?)?,
            None => Default::default(),
        };

        let hues = layout
            .hues
            .as_ref()
            .and_then(|name| load_hues(&format!("{}/{}", info.base_dir, name)));

        let families = layout
            .families
            .iter()
            .map(|(name, family)| {
                (
                    name.clone(),
                    load_family(info.base_dir, name, family, hues.clone()),
                )
            })
            .collect();

        Ok(Self {
            layout,
            hues,
            families,
        })
    }

    pub fn layout(&self) -> &StoreLayoutFile {
        &self.layout
    }

    pub fn hues(&self) -> Option<&Arc<HueTable>> {
        self.hues.as_ref()
    }

    pub fn family_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.families.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn index(&self, family: &str) -> Option<&Arc<AssetIndex>> {
        self.families.get(family).map(|f| &f.index)
    }

    pub fn decoder(&self, family: &str) -> Option<&Arc<Decoder>> {
        self.families.get(family).map(|f| &f.decoder)
    }

    /// Builds a fresh cache for `family` using the layout's atlas settings.
    pub fn cache<B: SurfaceBackend>(
        &self,
        family: &str,
        backend: B,
    ) -> Result<AtlasCache<B>, KuraError> {
        let entry = self
            .families
            .get(family)
            .ok_or_else(|| KuraError::ArchiveUnavailable(family.to_string()))?;

        let mut builder = AtlasCacheBuilder::new(family, entry.index.clone(), entry.decoder.clone())
            .config(self.layout.atlas);
        if let Some(overrides) = &entry.overrides {
            builder = builder.overrides(overrides.clone());
        }

        Ok(builder.build(backend))
    }

    pub fn shared_cache<B: SurfaceBackend>(
        &self,
        family: &str,
        backend: B,
    ) -> Result<SharedAtlasCache<B>, KuraError> {
        Ok(SharedAtlasCache::new(self.cache(family, backend)?))
    }
}

fn load_hues(path: &str) -> Option<Arc<HueTable>> {
    let view = ArchiveView::open_or_empty(path);
    if view.is_empty() {
        return None;
    }

    match HueTable::load(&view) {
        Ok(table) => {
            info!(resource = "hues", path, hues = table.len());
            Some(Arc::new(table))
        }
        Err(err) => {
            warn!(resource = "hues", path, error = %err, "hue table unreadable, recoloring disabled");
            None
        }
    }
}

fn load_family(
    base_dir: &str,
    name: &str,
    layout: &FamilyLayout,
    hues: Option<Arc<HueTable>>,
) -> Family {
    let table = ArchiveView::open_or_empty(format!("{}/{}", base_dir, layout.table));
    let parts: Vec<ArchiveView> = layout
        .data
        .iter()
        .map(|file| ArchiveView::open_or_empty(format!("{}/{}", base_dir, file)))
        .collect();

    let index = if table.is_empty() {
        AssetIndex::empty()
    } else {
        AssetIndex::load(&table, &parts).unwrap_or_else(|err| {
            warn!(resource = "index", family = name, error = %err, "index unreadable, family is empty");
            AssetIndex::empty()
        })
    };

    let sources = match index.layout() {
        TableLayout::Flat => vec![table],
        TableLayout::MultiPart => parts,
    };

    let overrides = layout.overrides.as_ref().map(|dir| {
        Arc::new(DirectoryOverride::new(format!("{}/{}", base_dir, dir))) as Arc<dyn OverrideSource>
    });

    info!(resource = "family", family = name, entries = index.len(), overrides = overrides.is_some());

    Family {
        index: Arc::new(index),
        decoder: Arc::new(Decoder::new(sources, hues)),
        overrides,
    }
}

#[test]
fn store_init_without_archives() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = dir.path().to_string_lossy().into_owned();

    let store = Store::new(&StoreInfo {
        base_dir: &base,
        layout_file: None,
    })
    .expect("store without archives still opens");

    assert_eq!(store.family_names(), vec!["art"]);
    assert!(store.hues().is_none());
    assert!(store.index("art").is_some_and(|index| index.is_empty()));

    let mut cache = store.cache("art", HostBackend::new()).expect("art cache");
    assert!(!cache.get(0).present);
    assert!(store.cache("gumps", HostBackend::new()).is_err());
}
