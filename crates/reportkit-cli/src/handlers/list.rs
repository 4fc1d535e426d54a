use anyhow::Result;
use reportkit_runtime::Runtime;

pub fn handle(runtime: &Runtime) -> Result<()> {
    let registry = runtime.registry();
    if registry.is_empty() {
        println!(
            "No reports configured in {}",
            runtime.data_dir().join("reportkit.toml").display()
        );
        return Ok(());
    }

    let width = registry.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, collection) in registry.iter() {
        println!("{:<width$}  {}", name, collection, width = width);
    }
    Ok(())
}
