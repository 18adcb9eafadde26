use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;

use macrotrack_core::StoreHandle;

use super::helpers::print_json;

pub(crate) async fn cmd_export(store: &StoreHandle, file: Option<PathBuf>, json: bool) -> Result<()> {
    let snapshot = store.exec(|db| db.export_all_data()).await?;
    let text = serde_json::to_string_pretty(&snapshot)?;

    match file {
        None => println!("{text}"),
        Some(path) => {
            std::fs::write(&path, text)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "file": path.display().to_string(),
                        "persons": snapshot.persons.len(),
                        "entries": snapshot.entries.len(),
                        "weightLogs": snapshot.weight_logs.len(),
                    })
                );
            } else {
                println!(
                    "Exported {} persons, {} entries and {} weight logs to {}",
                    snapshot.persons.len(),
                    snapshot.entries.len(),
                    snapshot.weight_logs.len(),
                    path.display()
                );
            }
        }
    }
    Ok(())
}

fn read_payload(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Import file is not valid JSON: {}", path.display()))
}

pub(crate) async fn cmd_import(store: &StoreHandle, file: &Path, json: bool) -> Result<()> {
    let payload = read_payload(file)?;
    let summary = store.exec(move |db| db.import_all_data(&payload)).await?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Imported {} persons, {} entries, {} favorites, {} recents, {} weight logs, {} cached products",
            summary.persons,
            summary.entries,
            summary.favorites,
            summary.recents,
            summary.weight_logs,
            summary.products_cache
        );
        if summary.dropped > 0 {
            eprintln!("Skipped {} invalid or orphaned rows", summary.dropped);
        }
    }
    Ok(())
}

pub(crate) async fn cmd_seed(store: &StoreHandle, json: bool) -> Result<()> {
    let seeded = store.exec(|db| db.seed_sample_data()).await?;

    if json {
        print_json(&seeded)?;
    } else {
        let names: Vec<&str> = seeded.persons.iter().map(|p| p.name.as_str()).collect();
        println!(
            "Seeded {} with {} entries for today",
            names.join(" and "),
            seeded.entries.len()
        );
    }
    Ok(())
}

pub(crate) async fn cmd_wipe(store: &StoreHandle, yes: bool, json: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to delete all data without --yes");
    }
    store.exec(|db| db.delete_all_data()).await?;

    if json {
        println!("{}", serde_json::json!({ "wiped": true }));
    } else {
        println!("Deleted all data");
    }
    Ok(())
}
