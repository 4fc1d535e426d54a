use crate::config::{CONFIG_FILE, CacheBackend, Config, DATABASE_FILE, resolve_workspace_path};
use crate::definition::Catalog;
use crate::registry::ReportRegistry;
use crate::Result;
use reportkit_cache::{
    CacheManager, CacheStore, DummyCacheManager, GenerationCacheManager, Generations, MemoryStore,
    NullStore, SqliteStore,
};
use reportkit_store::{Backend, SqliteBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opened workspace: backend, cache and registered reports.
pub struct Runtime {
    data_dir: PathBuf,
    config: Config,
    backend: Arc<dyn Backend>,
    generations: Arc<Generations>,
    cache_manager: Arc<dyn CacheManager>,
    catalog: Arc<Catalog>,
    registry: ReportRegistry,
}

impl Runtime {
    /// Resolve the workspace directory and open it with its `reportkit.toml`.
    pub fn load(explicit_path: Option<&str>) -> Result<Self> {
        let data_dir = resolve_workspace_path(explicit_path)?;
        let config = Config::load_from(&data_dir.join(CONFIG_FILE))?;
        Self::open(&data_dir, config)
    }

    pub fn open(data_dir: &Path, config: Config) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let backend: Arc<dyn Backend> =
            Arc::new(SqliteBackend::open(&data_dir.join(DATABASE_FILE))?);
        let store: Arc<dyn CacheStore> = match config.cache.backend {
            CacheBackend::Sqlite => Arc::new(SqliteStore::open(&config.cache.store_path(data_dir))?),
            CacheBackend::Memory => Arc::new(MemoryStore::new()),
            CacheBackend::None => Arc::new(NullStore),
        };
        let generations = Arc::new(Generations::new(store));
        let cache_manager: Arc<dyn CacheManager> = match config.cache.backend {
            CacheBackend::None => Arc::new(DummyCacheManager),
            _ => Arc::new(
                GenerationCacheManager::new(generations.clone()).with_ttl(config.cache.ttl()),
            ),
        };

        let catalog = Arc::new(Catalog::from_config(&config.collections)?);
        for schema in catalog.schemas() {
            backend.register(schema.clone())?;
        }

        let mut registry = ReportRegistry::new(backend.clone(), generations.clone());
        for definition in &config.reports {
            let collection = catalog.get(&definition.collection)?.id.clone();
            for dependency in definition.monitored_collections(&catalog)? {
                registry.monitor(&dependency)?;
            }

            let definition = Arc::new(definition.clone());
            let catalog = catalog.clone();
            let backend = backend.clone();
            let cache_manager = cache_manager.clone();
            registry.register(
                definition.name.clone(),
                collection,
                Arc::new(move || definition.build(&catalog, backend.clone(), cache_manager.clone())),
            )?;
        }

        tracing::debug!(
            data_dir = %data_dir.display(),
            collections = catalog.len(),
            reports = registry.len(),
            "workspace opened"
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            backend,
            generations,
            cache_manager,
            catalog,
            registry,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn generations(&self) -> &Arc<Generations> {
        &self.generations
    }

    pub fn cache_manager(&self) -> &Arc<dyn CacheManager> {
        &self.cache_manager
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ReportRegistry {
        &self.registry
    }

    /// Invalidate every cached result at once. Returns the new global generation.
    pub fn flush_cache(&self) -> Result<i64> {
        let generation = self.generations.bump_global()?;
        tracing::info!(generation, "cache flushed");
        Ok(generation)
    }

    /// Restart the generation counter of one declared collection.
    pub fn reset_collection(&self, id: &str) -> Result<()> {
        let schema = self.catalog.get(id)?;
        self.generations.reset(&schema.id)?;
        Ok(())
    }
}
