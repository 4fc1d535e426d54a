use crate::error::Result;
use crate::generations::{GLOBAL_KEY, Generations};
use crate::store::CacheValue;
use reportkit_types::CollectionId;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything a cache key is derived from.
#[derive(Debug, Clone, Copy)]
pub struct KeyInput<'a> {
    pub target: &'a CollectionId,
    pub dependents: &'a [CollectionId],
    /// Canonical text of columns, keyword filters, positional filters and ordering.
    pub fingerprint: &'a str,
}

/// Result-set cache used by datasources.
pub trait CacheManager: Send + Sync {
    fn key(&self, input: &KeyInput<'_>) -> Result<String>;

    fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn store(&self, key: &str, payload: Vec<u8>) -> Result<()>;

    fn delete(&self, key: &str) -> Result<bool>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// 128-bit hex digest (the first 16 bytes of SHA-256).
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.finalize()[..16]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Keys results by the generation of every collection they depend on.
///
/// Key layout: `reportkit/<global>/<collection>/<generation>/.../<digest>`,
/// collections sorted by identity.
pub struct GenerationCacheManager {
    generations: Arc<Generations>,
    ttl: Option<Duration>,
}

impl GenerationCacheManager {
    pub fn new(generations: Arc<Generations>) -> Self {
        Self {
            generations,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn generations(&self) -> &Arc<Generations> {
        &self.generations
    }
}

impl CacheManager for GenerationCacheManager {
    fn key(&self, input: &KeyInput<'_>) -> Result<String> {
        let mut parts: BTreeMap<&CollectionId, i64> = BTreeMap::new();
        for collection in std::iter::once(input.target).chain(input.dependents.iter()) {
            parts.insert(collection, self.generations.current(collection)?);
        }

        let mut key = format!("{}/{}", GLOBAL_KEY, self.generations.global()?);
        for (collection, generation) in parts {
            key.push_str(&format!("/{}/{}", collection, generation));
        }
        key.push('/');
        key.push_str(&digest(input.fingerprint));
        Ok(key)
    }

    fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(match self.generations.store().get(key)? {
            Some(CacheValue::Bytes(payload)) => Some(payload),
            _ => None,
        })
    }

    fn store(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.generations
            .store()
            .set(key, CacheValue::Bytes(payload), self.ttl)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.generations.store().delete(key)
    }
}

/// Caching switched off: empty key, nothing stored, nothing found.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyCacheManager;

impl CacheManager for DummyCacheManager {
    fn key(&self, _input: &KeyInput<'_>) -> Result<String> {
        Ok(String::new())
    }

    fn retrieve(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn store(&self, _key: &str, _payload: Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
