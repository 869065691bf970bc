//! Per-model clip catalogs and the process-wide catalog cache
//!
//! A catalog is built once by replaying a model script against an asset store
//! and is immutable afterwards. Clip resources referenced by several
//! declarations are parsed once and shared.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::asset::{AssetStore, clip_asset_name};
use crate::clip::{Clip, ClipData};
use crate::error::{AnimError, Result};
use crate::script::{ClipDecl, ClipSource, ModelScript};

/// Extension of binary model scripts
pub const SCRIPT_EXTENSION: &str = "MSB";

/// Options for building catalogs
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogOptions {
    /// Extension of clip resources (`MODEL-CLIP.EXT`)
    pub clip_extension: String,
    /// Frame rate used when a clip declares none
    pub default_fps: f32,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            clip_extension: "MAN".to_string(),
            default_fps: 60.0,
        }
    }
}

/// Resolve clip names to clips
pub trait ClipLookup {
    /// Exact-name lookup; `None` when the clip does not exist
    fn find_clip(&self, name: &str) -> Option<&Arc<Clip>>;

    fn has_clip(&self, name: &str) -> bool {
        self.find_clip(name).is_some()
    }
}

/// The clips of one model
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    name: String,
    clips: Vec<Arc<Clip>>,
    by_name: HashMap<String, usize>,
    resource_loads: usize,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load the model script `MODEL.MSB` and every clip it declares
    pub fn load(store: &dyn AssetStore, model: &str, options: &CatalogOptions) -> Result<Self> {
        let script_name = format!("{model}.{SCRIPT_EXTENSION}");
        let data = store.open(&script_name)?;
        let script = ModelScript::parse(&data)?;
        Self::from_script(store, model, &script, options)
    }

    /// Build a catalog by replaying a parsed model script
    ///
    /// Declarations whose clip resource is missing from the store, and aliases
    /// of unknown clips, are skipped. A corrupt clip resource aborts the load.
    pub fn from_script(
        store: &dyn AssetStore,
        model: &str,
        script: &ModelScript,
        options: &CatalogOptions,
    ) -> Result<Self> {
        let mut catalog = Self::new(model);
        let mut resources: HashMap<String, Arc<ClipData>> = HashMap::new();

        for decl in &script.clips {
            let data = match &decl.source {
                ClipSource::Resource { .. } => {
                    let file = clip_asset_name(model, &decl.name, &options.clip_extension);
                    let key = file.to_ascii_uppercase();
                    if let Some(data) = resources.get(&key) {
                        Arc::clone(data)
                    } else {
                        if !store.exists(&file) {
                            log::warn!("Clip '{}' of '{model}' has no resource {file}", decl.name);
                            continue;
                        }
                        let bytes = store.open(&file)?;
                        let data = Arc::new(ClipData::parse(&bytes, options.default_fps)?);
                        catalog.resource_loads += 1;
                        resources.insert(key, Arc::clone(&data));
                        data
                    }
                }
                ClipSource::Alias(target) => match catalog.sequence(target) {
                    Some(clip) => Arc::clone(clip.data()),
                    None => {
                        log::warn!(
                            "Alias '{}' of '{model}' refers to unknown clip '{target}'",
                            decl.name
                        );
                        continue;
                    }
                },
            };
            catalog.push(clip_from_decl(decl, data));
        }

        log::debug!(
            "Catalog '{model}': {} clips from {} resources",
            catalog.len(),
            catalog.resource_loads
        );
        Ok(catalog)
    }

    /// Add a clip; a clip with an already known name is ignored
    pub fn push(&mut self, clip: Clip) -> bool {
        if self.by_name.contains_key(clip.name()) {
            log::debug!("Duplicate clip '{}' in '{}'", clip.name(), self.name);
            return false;
        }
        self.by_name.insert(clip.name().to_string(), self.clips.len());
        self.clips.push(Arc::new(clip));
        true
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exact-name lookup
    pub fn sequence(&self, name: &str) -> Option<&Arc<Clip>> {
        self.by_name.get(name).map(|&i| &self.clips[i])
    }

    /// Clips in declaration order
    pub fn clips(&self) -> &[Arc<Clip>] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Number of clip resources parsed while building this catalog
    pub fn resource_loads(&self) -> usize {
        self.resource_loads
    }
}

impl ClipLookup for Catalog {
    fn find_clip(&self, name: &str) -> Option<&Arc<Clip>> {
        self.sequence(name)
    }
}

fn clip_from_decl(decl: &ClipDecl, data: Arc<ClipData>) -> Clip {
    Clip::new(decl.name.clone(), data)
        .with_layer(decl.layer)
        .with_flags(decl.flags)
        .with_next(decl.next.clone())
        .with_blend(decl.blend_in, decl.blend_out)
        .with_reversed(decl.reversed)
        .with_combo(decl.combo.clone())
}

type CatalogSlot = Arc<Mutex<Option<Arc<Catalog>>>>;

/// Process-wide cache of catalogs keyed by model name
///
/// Concurrent requests for the same model are serialized on that model's
/// slot, so each model script is parsed at most once. Failed loads are not
/// kept.
pub struct CatalogCache {
    store: Arc<dyn AssetStore>,
    options: CatalogOptions,
    slots: Mutex<HashMap<String, CatalogSlot>>,
    loads: AtomicUsize,
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("options", &self.options)
            .field("models", &self.slots.lock().len())
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}

impl CatalogCache {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self::with_options(store, CatalogOptions::default())
    }

    pub fn with_options(store: Arc<dyn AssetStore>, options: CatalogOptions) -> Self {
        Self {
            store,
            options,
            slots: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn options(&self) -> &CatalogOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    fn slot(&self, model: &str) -> CatalogSlot {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(model.to_ascii_uppercase()).or_default())
    }

    /// Catalog of `model`, loading it on first request
    pub fn get(&self, model: &str) -> Result<Arc<Catalog>> {
        if model.is_empty() {
            return Err(AnimError::AssetNotFound(String::new()));
        }
        let slot = self.slot(model);
        let mut guard = slot.lock();
        if let Some(catalog) = guard.as_ref() {
            return Ok(Arc::clone(catalog));
        }

        let catalog = match Catalog::load(self.store.as_ref(), model, &self.options) {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                drop(guard);
                self.forget_empty(model, &slot);
                return Err(e);
            }
        };
        self.loads.fetch_add(1, Ordering::Relaxed);
        *guard = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Remove `slot` from the map unless another request filled or holds it
    fn forget_empty(&self, model: &str, slot: &CatalogSlot) {
        let mut slots = self.slots.lock();
        let key = model.to_ascii_uppercase();
        let unused = slots.get(&key).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && current.try_lock().is_some_and(|g| g.is_none())
        });
        if unused {
            slots.remove(&key);
        }
    }

    /// Number of models with a cache entry
    pub fn model_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Catalog of `model` if it was already loaded
    pub fn cached(&self, model: &str) -> Option<Arc<Catalog>> {
        let slot = self.slots.lock().get(&model.to_ascii_uppercase()).cloned()?;
        let guard = slot.lock();
        guard.clone()
    }

    /// Register a catalog built elsewhere, replacing any cached one
    pub fn insert(&self, catalog: Catalog) -> Arc<Catalog> {
        let slot = self.slot(catalog.name());
        let catalog = Arc::new(catalog);
        *slot.lock() = Some(Arc::clone(&catalog));
        catalog
    }

    /// Number of model scripts parsed so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Drop every cached catalog; instances keep the ones they hold
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}
