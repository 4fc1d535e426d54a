use anyhow::Result;
use reportkit_runtime::Runtime;

pub fn flush(runtime: &Runtime) -> Result<()> {
    let generation = runtime.flush_cache()?;
    println!("Cache flushed (global generation {})", generation);
    Ok(())
}

pub fn reset(runtime: &Runtime, collection: &str) -> Result<()> {
    runtime.reset_collection(collection)?;
    println!("Generation reset for {}", collection);
    Ok(())
}
