/// Garment asset registry
///
/// The embedding application creates one registry, optionally preloads it
/// at startup, and hands it to every viewer that needs garments. Loads are
/// cached per garment type, failures included: a broken asset is reported
/// the same way on every call until it is explicitly evicted.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};
use parking_lot::{Mutex, RwLock};

use crate::config::ViewerConfig;
use crate::error::AssetError;
use crate::garment::{GarmentProfile, GarmentType};
use crate::gltf_loader;
use crate::scene::GarmentAsset;

/// Where model bytes come from.
pub trait AssetSource: Send + Sync {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Reads model files below a root directory.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        // Public asset paths are written site-absolute ("/tshirt.glb")
        self.root.join(path.trim_start_matches('/'))
    }
}

impl AssetSource for DirectorySource {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }
}

/// Model bytes supplied up front by the host (browser fetch, tests).
#[derive(Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: Vec<u8>) {
        self.files
            .write()
            .insert(path.trim_start_matches('/').to_string(), data);
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .read()
            .get(path.trim_start_matches('/'))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}

impl<T: AssetSource + ?Sized> AssetSource for Arc<T> {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        (**self).read(path)
    }
}

type CachedAsset = Result<Arc<GarmentAsset>, AssetError>;

pub struct AssetRegistry {
    source: Box<dyn AssetSource>,
    profiles: BTreeMap<GarmentType, GarmentProfile>,
    cache: Mutex<HashMap<GarmentType, CachedAsset>>,
}

impl AssetRegistry {
    pub fn new(source: impl AssetSource + 'static, config: &ViewerConfig) -> Self {
        Self {
            source: Box::new(source),
            profiles: config.garments.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn profile(&self, garment: GarmentType) -> Option<&GarmentProfile> {
        self.profiles.get(&garment)
    }

    /// Return the shared asset for `garment`, loading it on first use.
    pub fn resolve(&self, garment: GarmentType) -> Result<Arc<GarmentAsset>, AssetError> {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(&garment) {
            return cached.clone();
        }

        let loaded = self.load(garment).map(Arc::new);
        match &loaded {
            Ok(asset) => info!(
                "loaded {garment} asset ({} primitives, {} triangles)",
                asset.primitives().len(),
                asset.triangle_count()
            ),
            Err(err) => error!("{err}"),
        }

        cache.insert(garment, loaded.clone());
        loaded
    }

    /// Load every configured garment so the first switch does not stall.
    pub fn preload(&self) -> Vec<(GarmentType, Result<(), AssetError>)> {
        self.profiles
            .keys()
            .map(|garment| (*garment, self.resolve(*garment).map(|_| ())))
            .collect()
    }

    /// Register an asset built in memory, replacing any cached entry.
    pub fn insert(&self, asset: GarmentAsset) -> Arc<GarmentAsset> {
        let asset = Arc::new(asset);
        self.cache
            .lock()
            .insert(asset.garment(), Ok(Arc::clone(&asset)));
        asset
    }

    pub fn is_cached(&self, garment: GarmentType) -> bool {
        self.cache.lock().contains_key(&garment)
    }

    /// Forget a cached asset or failure so the next resolve reloads it.
    pub fn evict(&self, garment: GarmentType) {
        self.cache.lock().remove(&garment);
    }

    fn load(&self, garment: GarmentType) -> Result<GarmentAsset, AssetError> {
        let profile = self.profile(garment).ok_or(AssetError::NoProfile(garment))?;
        let data = self.source.read(&profile.asset).map_err(|err| AssetError::Io {
            garment,
            path: Path::new(&profile.asset).to_path_buf(),
            reason: err.to_string(),
        })?;

        gltf_loader::load_garment(garment, &data)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::gltf_loader::tests::two_panel_gltf;

    struct CountingSource {
        inner: MemorySource,
        reads: AtomicUsize,
    }

    impl AssetSource for CountingSource {
        fn read(&self, path: &str) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(path)
        }
    }

    fn counting_source() -> Arc<CountingSource> {
        let inner = MemorySource::new();
        inner.insert("/tshirt.glb", two_panel_gltf());
        Arc::new(CountingSource {
            inner,
            reads: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_resolve_is_cached() {
        let source = counting_source();
        let registry = AssetRegistry::new(source.clone(), &ViewerConfig::default());

        let first = registry.resolve(GarmentType::Tshirt).unwrap();
        let second = registry.resolve(GarmentType::Tshirt).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_asset_is_unavailable_and_not_retried() {
        let source = counting_source();
        let registry = AssetRegistry::new(source.clone(), &ViewerConfig::default());

        let err = registry.resolve(GarmentType::Hoodie).unwrap_err();
        assert!(matches!(err, AssetError::Io { garment: GarmentType::Hoodie, .. }));
        assert_eq!(registry.resolve(GarmentType::Hoodie).unwrap_err(), err);
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);

        source.inner.insert("hoodie.glb", two_panel_gltf());
        registry.evict(GarmentType::Hoodie);
        assert!(registry.resolve(GarmentType::Hoodie).is_ok());
    }

    #[test]
    fn test_preload_reports_each_garment() {
        let registry = AssetRegistry::new(counting_source(), &ViewerConfig::default());
        let results = registry.preload();
        assert_eq!(results.len(), 2);
        assert!(results.contains(&(GarmentType::Tshirt, Ok(()))));
        assert!(registry.is_cached(GarmentType::Hoodie));
    }

    #[test]
    fn test_unconfigured_garment() {
        let mut config = ViewerConfig::default();
        config.garments.remove(&GarmentType::Hoodie);
        let registry = AssetRegistry::new(counting_source(), &config);
        assert_eq!(
            registry.resolve(GarmentType::Hoodie).unwrap_err(),
            AssetError::NoProfile(GarmentType::Hoodie)
        );
    }

    #[test]
    fn test_directory_source_strips_site_root() {
        let source = DirectorySource::new("/srv/public");
        assert_eq!(source.resolve("/tshirt.glb"), PathBuf::from("/srv/public/tshirt.glb"));
    }
}
