//! Whole-database export and import.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;

use crate::error::Result;
use crate::models::{
    CachedProduct, Entry, Favorite, ImportSummary, META_LAST_IMPORT_AT, Person, Recent, Snapshot,
    WeightLog, validate_cached_product, validate_entry, validate_iso_day, validate_nutrition,
    validate_person, validate_positive, validate_required,
};
use crate::schema::{Collection, SCHEMA_VERSION};
use crate::trend;
use crate::tx::Tx;

/// Read every data collection. Runs inside one transaction, so the snapshot
/// is consistent.
pub(crate) fn export_snapshot(tx: &Tx<'_>) -> Result<Snapshot> {
    Ok(Snapshot {
        schema_version: SCHEMA_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        persons: tx.persons()?.get_all()?,
        entries: tx.entries()?.get_all()?,
        products_cache: tx.products()?.get_all()?,
        favorites: tx.favorites()?.get_all()?,
        recents: tx.recents()?.get_all()?,
        weight_logs: tx.weight_logs()?.get_all()?,
    })
}

/// Weight log as it may appear in an exported file: the id is optional and
/// fields are only checked after parsing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingWeightLog {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    person_id: String,
    #[serde(default)]
    date: String,
    scale_weight: f64,
    #[serde(default)]
    trend_weight: Option<f64>,
}

/// A named list from the payload. Missing or non-array values read as empty.
fn list<'a>(payload: &'a Value, key: &str) -> &'a [Value] {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

/// Decode and check each row on its own; rows that fail are counted and skipped.
fn sanitize<T: DeserializeOwned>(
    rows: &[Value],
    collection: Collection,
    check: impl Fn(&T) -> Result<()>,
    dropped: &mut usize,
) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for (position, raw) in rows.iter().enumerate() {
        let parsed = serde_json::from_value::<T>(raw.clone())
            .map_err(crate::error::StoreError::from)
            .and_then(|row| check(&row).map(|()| row));
        match parsed {
            Ok(row) => out.push(row),
            Err(e) => {
                warn!(%collection, position, error = %e, "Dropping invalid row from import");
                *dropped += 1;
            }
        }
    }
    out
}

/// Keep one row per key. A later row replaces an earlier one in place.
fn dedupe_by<T, K: Eq + Hash>(rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::with_capacity(rows.len());
    for row in rows {
        match positions.entry(key(&row)) {
            MapEntry::Occupied(slot) => out[*slot.get()] = row,
            MapEntry::Vacant(slot) => {
                slot.insert(out.len());
                out.push(row);
            }
        }
    }
    out
}

/// Drop rows owned by a person that is not part of the import.
fn owned_by_known<T>(
    rows: Vec<T>,
    collection: Collection,
    persons: &HashSet<String>,
    owner: impl Fn(&T) -> &str,
    dropped: &mut usize,
) -> Vec<T> {
    let before = rows.len();
    let kept: Vec<T> = rows
        .into_iter()
        .filter(|row| persons.contains(owner(row)))
        .collect();
    let orphans = before - kept.len();
    if orphans > 0 {
        warn!(%collection, orphans, "Dropping rows that reference unknown persons");
        *dropped += orphans;
    }
    kept
}

fn check_weight_log(log: &IncomingWeightLog) -> Result<()> {
    validate_required("personId", &log.person_id)?;
    validate_iso_day("date", &log.date)?;
    validate_positive("scaleWeight", log.scale_weight)?;
    Ok(())
}

fn check_favorite(favorite: &Favorite) -> Result<()> {
    validate_required("personId", &favorite.person_id)?;
    validate_required("foodId", &favorite.food_id)?;
    validate_nutrition(&favorite.nutrition)
}

fn check_recent(recent: &Recent) -> Result<()> {
    validate_required("id", &recent.id)?;
    validate_required("personId", &recent.person_id)?;
    validate_required("foodId", &recent.food_id)?;
    validate_nutrition(&recent.nutrition)
}

/// Replace the data collections with `payload`.
///
/// Lists are deduplicated by natural key with the last occurrence winning.
/// Recents collapse to one row per person and food, weight logs to one row
/// per person and day. Rows that fail the
/// checks applied to direct writes, or that reference persons absent from the
/// payload, are dropped. Metadata other than `lastImportAt` is kept.
pub(crate) fn import_snapshot(tx: &Tx<'_>, payload: &Value) -> Result<ImportSummary> {
    let mut dropped = 0;

    let persons: Vec<Person> = sanitize(
        list(payload, "persons"),
        Collection::Persons,
        validate_person,
        &mut dropped,
    );
    let persons = dedupe_by(persons, |p| p.id.clone());
    let known: HashSet<String> = persons.iter().map(|p| p.id.clone()).collect();

    let entries: Vec<Entry> = sanitize(
        list(payload, "entries"),
        Collection::Entries,
        validate_entry,
        &mut dropped,
    );
    let entries = dedupe_by(entries, |e| e.id.clone());
    let entries = owned_by_known(
        entries,
        Collection::Entries,
        &known,
        |e| e.person_id.as_str(),
        &mut dropped,
    );

    let products: Vec<CachedProduct> = sanitize(
        list(payload, "productsCache"),
        Collection::ProductsCache,
        validate_cached_product,
        &mut dropped,
    );
    let products = dedupe_by(products, |p| p.barcode.clone());

    let favorites: Vec<Favorite> = sanitize(
        list(payload, "favorites"),
        Collection::Favorites,
        check_favorite,
        &mut dropped,
    );
    let favorites = dedupe_by(favorites, Favorite::key);
    let favorites = owned_by_known(
        favorites,
        Collection::Favorites,
        &known,
        |f| f.person_id.as_str(),
        &mut dropped,
    );

    let recents: Vec<Recent> = sanitize(
        list(payload, "recents"),
        Collection::Recents,
        check_recent,
        &mut dropped,
    );
    let recents = dedupe_by(recents, |r| r.id.clone());
    let recents = dedupe_by(recents, |r| (r.person_id.clone(), r.food_id.clone()));
    let recents = owned_by_known(
        recents,
        Collection::Recents,
        &known,
        |r| r.person_id.as_str(),
        &mut dropped,
    );

    let weight_logs: Vec<IncomingWeightLog> = sanitize(
        list(payload, "weightLogs"),
        Collection::WeightLogs,
        check_weight_log,
        &mut dropped,
    );
    let weight_logs = dedupe_by(weight_logs, |w| (w.person_id.clone(), w.date.clone()));
    let weight_logs = owned_by_known(
        weight_logs,
        Collection::WeightLogs,
        &known,
        |w| w.person_id.as_str(),
        &mut dropped,
    );

    for collection in Collection::DATA.iter().rev() {
        tx.clear(*collection)?;
    }

    let person_store = tx.persons()?;
    for person in &persons {
        person_store.put(person)?;
    }
    let entry_store = tx.entries()?;
    for entry in &entries {
        entry_store.put(entry)?;
    }
    let product_store = tx.products()?;
    for product in &products {
        product_store.put(product)?;
    }
    let favorite_store = tx.favorites()?;
    for favorite in &favorites {
        favorite_store.put(favorite)?;
    }
    let recent_store = tx.recents()?;
    for recent in &recents {
        recent_store.put(recent)?;
    }

    // Incoming ids are kept when unique; the rest get fresh ids after them.
    let mut id_counts: HashMap<i64, usize> = HashMap::new();
    for id in weight_logs.iter().filter_map(|w| w.id) {
        *id_counts.entry(id).or_default() += 1;
    }
    let keeps_id = |w: &IncomingWeightLog| {
        w.id.is_some_and(|id| id > 0 && id_counts.get(&id) == Some(&1))
    };
    let weight_store = tx.weight_logs()?;
    for log in weight_logs.iter().filter(|w| keeps_id(*w)) {
        weight_store.put(&WeightLog {
            id: log.id.unwrap_or_default(),
            person_id: log.person_id.clone(),
            date: log.date.clone(),
            scale_weight: log.scale_weight,
            trend_weight: log.trend_weight.filter(|t| t.is_finite()),
        })?;
    }
    for log in weight_logs.iter().filter(|w| !keeps_id(*w)) {
        weight_store.insert(
            &log.person_id,
            &log.date,
            log.scale_weight,
            log.trend_weight.filter(|t| t.is_finite()),
        )?;
    }

    for person in &persons {
        trend::recompute_for_person(&weight_store, &person.id)?;
    }

    tx.meta()?
        .put(META_LAST_IMPORT_AT, &json!(Utc::now().to_rfc3339()))?;

    Ok(ImportSummary {
        persons: persons.len(),
        entries: entries.len(),
        products_cache: products.len(),
        favorites: favorites.len(),
        recents: recents.len(),
        weight_logs: weight_logs.len(),
        dropped,
    })
}
