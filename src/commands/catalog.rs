use anyhow::{Context, Result};
use std::path::Path;

use retrotrack::config::Config;
use retrotrack::models::NewVariant;
use retrotrack::resolve::IdentityResolver;
use retrotrack::storage::{create_sqlite_repository, SharedRepository};

pub(crate) fn open_repository(config: &Config) -> Result<SharedRepository> {
    create_sqlite_repository(&config.database.sqlite_path).with_context(|| {
        format!(
            "Failed to open database: {}",
            config.database.sqlite_path.display()
        )
    })
}

/// Load raw variants from a JSON array and insert them unresolved
pub fn import(config: &Config, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read variants file: {}", file.display()))?;
    let variants: Vec<NewVariant> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse variants file: {}", file.display()))?;

    let repo = open_repository(config)?;

    let mut inserted = 0;
    let mut skipped = 0;
    for variant in &variants {
        if variant.product_name.trim().is_empty() || variant.console_name.trim().is_empty() {
            tracing::warn!(external_id = ?variant.external_id, "Skipping variant without names");
            skipped += 1;
            continue;
        }
        match repo.insert_variant(variant) {
            Ok(_) => inserted += 1,
            Err(e) => {
                tracing::warn!(
                    external_id = ?variant.external_id,
                    product = %variant.product_name,
                    error = %e,
                    "Variant not imported"
                );
                skipped += 1;
            }
        }
    }

    println!("Import complete");
    println!("  Inserted: {inserted}");
    println!("  Skipped:  {skipped}");
    Ok(())
}

/// Consolidate unresolved variants into canonical entities
pub fn resolve(config: &Config) -> Result<()> {
    let repo = open_repository(config)?;
    let stats = IdentityResolver::new(repo).run()?;

    println!("Identity resolution complete");
    println!("  Groups:           {}", stats.groups);
    println!("  Entities created: {}", stats.entities_created);
    println!("  Entities reused:  {}", stats.entities_reused);
    println!("  Variants linked:  {}", stats.variants_linked);
    println!("  Variants skipped: {}", stats.variants_skipped);
    Ok(())
}

/// Unlink every variant and drop all canonical entities
pub fn reset(config: &Config) -> Result<()> {
    let repo = open_repository(config)?;
    let removed = repo.reset_identities()?;

    tracing::info!(removed, "Identities reset");
    println!("Reset complete: {removed} canonical entities removed, all variants unlinked");
    Ok(())
}
