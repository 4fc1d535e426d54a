use reportkit_cache::{
    CacheManager, GenerationCacheManager, Generations, KeyInput, MemoryStore, SqliteStore,
};
use reportkit_store::{Backend, MemoryBackend};
use reportkit_types::{CollectionId, Entity, FieldDef, FieldKind, Schema};
use std::sync::Arc;
use tempfile::TempDir;

fn key_for(manager: &GenerationCacheManager, target: &CollectionId) -> String {
    manager
        .key(&KeyInput {
            target,
            dependents: &[],
            fingerprint: "columns-filters",
        })
        .unwrap()
}

#[test]
fn test_every_mutation_changes_the_key() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let schema = Arc::new(
        Schema::new("auth.User", "auth_user").field(FieldDef::new("username", FieldKind::Char)),
    );
    backend.register(schema.clone())?;

    let generations = Arc::new(Generations::new(Arc::new(MemoryStore::new())));
    generations.monitor(&schema.id, backend.signals())?;
    let manager = GenerationCacheManager::new(generations.clone());

    let before = key_for(&manager, &schema.id);
    assert_eq!(key_for(&manager, &schema.id), before);

    let id = backend.insert(Entity::new(schema.clone()).with("username", "sax"))?;
    let after_create = key_for(&manager, &schema.id);
    assert_ne!(after_create, before);

    let updated = Entity::new(schema.clone())
        .with("id", id)
        .with("username", "sax2");
    backend.update(&updated)?;
    let after_update = key_for(&manager, &schema.id);
    assert_ne!(after_update, after_create);

    backend.delete(&schema.id, id)?;
    assert_ne!(key_for(&manager, &schema.id), after_update);
    assert_eq!(generations.current(&schema.id)?, 3);
    Ok(())
}

#[test]
fn test_dependent_generation_changes_the_key() -> anyhow::Result<()> {
    let generations = Arc::new(Generations::new(Arc::new(MemoryStore::new())));
    let manager = GenerationCacheManager::new(generations.clone());
    let target = CollectionId::new("auth.Permission");
    let dependents = [CollectionId::new("contenttypes.ContentType")];
    let key = || {
        manager.key(&KeyInput {
            target: &target,
            dependents: &dependents,
            fingerprint: "x",
        })
    };

    let first = key()?;
    generations.invalidate(&dependents[0])?;
    generations.invalidate(&dependents[0])?;
    assert_ne!(key()?, first);

    let second = key()?;
    generations.bump_global()?;
    assert_ne!(key()?, second);
    Ok(())
}

#[test]
fn test_sqlite_store_shares_generations_between_handles() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.db");
    let users = CollectionId::new("auth.User");

    let one = Generations::new(Arc::new(SqliteStore::open(&path)?));
    let two = Generations::new(Arc::new(SqliteStore::open(&path)?));
    one.reset(&users)?;
    one.invalidate(&users)?;

    assert_eq!(two.current(&users)?, 1);
    two.invalidate(&users)?;
    assert_eq!(one.current(&users)?, 2);
    Ok(())
}
