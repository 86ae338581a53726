use anyhow::{Context, Result};
use crossterm::style::Stylize;
use dotplug_core::Manifest;
use std::path::Path;

/// Validate a manifest and print the order its applications would finish in
/// on a single worker.
pub async fn check(path: &Path) -> Result<()> {
    let manifest = Manifest::load(path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let order = manifest.install_order()?;

    println!(
        "{} {} ({} applications)",
        "✓".green(),
        path.display(),
        order.len()
    );
    for (i, name) in order.iter().enumerate() {
        let app = manifest.apps.iter().find(|a| a.name == *name);
        let version = app.map(|a| a.version.as_str()).unwrap_or("-");
        let build = app.map(|a| a.build.as_str()).unwrap_or("-");
        let version = format!("{version:<12}");
        println!(
            "  {:>3}  {:<24} {} {}",
            i + 1,
            name.as_str(),
            version.dark_grey(),
            build.dark_grey()
        );
    }
    Ok(())
}
