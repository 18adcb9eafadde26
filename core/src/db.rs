use std::path::Path;

use chrono::{Local, Utc};
use rusqlite::Connection;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::config::DatastoreConfig;
use crate::error::{Result, StoreError};
use crate::models::{
    CachedProduct, CascadeSummary, Entry, Favorite, FavoriteKey, FavoriteState, FoodItem,
    ImportSummary, META_SAMPLE_SEEDED_AT, MacroTargets, NewEntry, Person, Recent, SampleData,
    Snapshot, WeightLog, last_portion_meta_key, validate_cached_product, validate_entry,
    validate_food_item, validate_iso_day, validate_person, validate_positive, validate_required,
};
use crate::schema::{self, Collection};
use crate::transfer;
use crate::trend;
use crate::tx::{AccessMode, Tx};

pub const DEFAULT_RECENTS_LIMIT: usize = 20;

const CASCADE_SCOPE: [Collection; 5] = [
    Collection::Persons,
    Collection::Entries,
    Collection::Favorites,
    Collection::Recents,
    Collection::WeightLogs,
];

const ENTRY_SCOPE: [Collection; 4] = [
    Collection::Persons,
    Collection::Entries,
    Collection::Recents,
    Collection::Meta,
];

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct Datastore {
    conn: Connection,
}

impl Datastore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &DatastoreConfig::default())
    }

    pub fn open_with(path: &Path, config: &DatastoreConfig) -> Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Schema)?;
        let db = Self::init(conn, config)?;
        info!(path = %path.display(), "Opened datastore");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Schema)?;
        Self::init(conn, &DatastoreConfig::default())
    }

    fn init(mut conn: Connection, config: &DatastoreConfig) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout)
            .map_err(StoreError::Schema)?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(StoreError::Schema)?;
        schema::migrate(&mut conn)?;
        Ok(Datastore { conn })
    }

    /// Release the connection, reporting any error SQLite raises while closing.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| StoreError::Transaction(e))
    }

    pub fn schema_version(&self) -> Result<i64> {
        Ok(schema::stored_version(&self.conn)?)
    }

    // --- Transactions ---

    /// Begin a transaction over `scope`. It rolls back unless committed.
    pub fn transaction(&mut self, scope: &[Collection], mode: AccessMode) -> Result<Tx<'_>> {
        Tx::begin(&mut self.conn, scope, mode)
    }

    /// Run `f` in a read-only transaction.
    pub fn read<T>(
        &mut self,
        scope: &[Collection],
        f: impl FnOnce(&Tx<'_>) -> Result<T>,
    ) -> Result<T> {
        let tx = self.transaction(scope, AccessMode::ReadOnly)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` in a read-write transaction, committing only if it succeeds.
    pub fn write<T>(
        &mut self,
        scope: &[Collection],
        f: impl FnOnce(&Tx<'_>) -> Result<T>,
    ) -> Result<T> {
        let tx = self.transaction(scope, AccessMode::ReadWrite)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // --- Persons ---

    pub fn get_persons(&mut self) -> Result<Vec<Person>> {
        self.read(&[Collection::Persons], |tx| tx.persons()?.get_all())
    }

    pub fn get_person(&mut self, id: &str) -> Result<Option<Person>> {
        self.read(&[Collection::Persons], |tx| tx.persons()?.get(id))
    }

    pub fn upsert_person(&mut self, person: &Person) -> Result<()> {
        validate_person(person)?;
        self.write(&[Collection::Persons], |tx| tx.persons()?.put(person))
    }

    /// Remove a person and every row they own in one transaction.
    pub fn delete_person_cascade(&mut self, person_id: &str) -> Result<CascadeSummary> {
        validate_required("personId", person_id)?;
        let summary = self.write(&CASCADE_SCOPE, |tx| {
            let person_removed = tx.persons()?.delete(person_id)?;
            Ok(CascadeSummary {
                person_removed,
                entries: tx.entries()?.delete_by_person(person_id)?,
                favorites: tx.favorites()?.delete_by_person(person_id)?,
                recents: tx.recents()?.delete_by_person(person_id)?,
                weight_logs: tx.weight_logs()?.delete_by_person(person_id)?,
            })
        })?;
        info!(
            person_id,
            person_removed = summary.person_removed,
            entries = summary.entries,
            favorites = summary.favorites,
            recents = summary.recents,
            weight_logs = summary.weight_logs,
            "Deleted person with dependents"
        );
        Ok(summary)
    }

    // --- Entries ---

    /// Log a food. Optionally records it as a recent and remembers the portion,
    /// all in the same transaction as the entry itself.
    pub fn add_entry(&mut self, new: NewEntry) -> Result<Entry> {
        let entry = Entry {
            id: new.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            person_id: new.person_id,
            date: new.date,
            time: new.time,
            food_id: new.food_id,
            food_name: new.food_name,
            amount_grams: new.amount_grams,
            kcal: new.kcal,
            protein: new.protein,
            carb: new.carb,
            fat: new.fat,
            source: new.source,
            created_at: new.created_at.unwrap_or_else(now_millis),
        };
        validate_entry(&entry)?;
        if let Some(item) = &new.recent_item {
            validate_food_item(item)?;
        }
        if let Some(key) = &new.last_portion_key {
            validate_required("lastPortionKey", key)?;
        }

        self.write(&ENTRY_SCOPE, |tx| {
            tx.persons()?.require(&entry.person_id)?;
            tx.entries()?.put(&entry)?;
            if let Some(item) = &new.recent_item {
                // Recency follows when the food was logged, not the entry's own timestamp.
                tx.recents()?.touch(&entry.person_id, item, now_millis())?;
            }
            if let Some(key) = &new.last_portion_key {
                tx.meta()?
                    .put(&last_portion_meta_key(key), &json!(entry.amount_grams))?;
            }
            Ok(())
        })?;
        Ok(entry)
    }

    /// Replace an existing entry. Fails with not-found if the id is unknown.
    pub fn update_entry(&mut self, entry: &Entry) -> Result<()> {
        validate_entry(entry)?;
        self.write(&[Collection::Persons, Collection::Entries], |tx| {
            let entries = tx.entries()?;
            if entries.get(&entry.id)?.is_none() {
                return Err(StoreError::not_found("Entry", entry.id.clone()));
            }
            tx.persons()?.require(&entry.person_id)?;
            entries.put(entry)
        })
    }

    pub fn get_entry(&mut self, id: &str) -> Result<Option<Entry>> {
        self.read(&[Collection::Entries], |tx| tx.entries()?.get(id))
    }

    pub fn delete_entry(&mut self, id: &str) -> Result<bool> {
        self.write(&[Collection::Entries], |tx| tx.entries()?.delete(id))
    }

    pub fn get_all_entries(&mut self) -> Result<Vec<Entry>> {
        self.read(&[Collection::Entries], |tx| tx.entries()?.get_all())
    }

    pub fn get_entries_for_person_date(&mut self, person_id: &str, date: &str) -> Result<Vec<Entry>> {
        self.read(&[Collection::Entries], |tx| {
            tx.entries()?.for_person_date(person_id, date)
        })
    }

    pub fn get_entries_in_range(
        &mut self,
        person_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Entry>> {
        self.read(&[Collection::Entries], |tx| {
            tx.entries()?.in_range(person_id, start, end)
        })
    }

    /// Distinct days with at least one entry, newest first.
    pub fn get_logged_dates_by_person(&mut self, person_id: &str) -> Result<Vec<String>> {
        self.read(&[Collection::Entries], |tx| {
            tx.entries()?.logged_dates(person_id)
        })
    }

    // --- Favorites ---

    pub fn get_favorites(&mut self, person_id: &str) -> Result<Vec<Favorite>> {
        self.read(&[Collection::Favorites], |tx| {
            tx.favorites()?.for_person(person_id)
        })
    }

    pub fn is_favorite(&mut self, person_id: &str, food_id: &str) -> Result<bool> {
        let key = FavoriteKey::new(person_id, food_id);
        self.read(&[Collection::Favorites], |tx| tx.favorites()?.contains(&key))
    }

    /// Flip whether `item` is a favorite of the person and return the new state.
    pub fn toggle_favorite(&mut self, person_id: &str, item: &FoodItem) -> Result<FavoriteState> {
        validate_required("personId", person_id)?;
        validate_food_item(item)?;
        let key = FavoriteKey::new(person_id, item.food_id.clone());
        self.write(&[Collection::Persons, Collection::Favorites], |tx| {
            let favorites = tx.favorites()?;
            if favorites.contains(&key)? {
                favorites.delete(&key)?;
                return Ok(FavoriteState::Unfavorited);
            }
            tx.persons()?.require(person_id)?;
            favorites.put(&Favorite {
                id: key.to_string(),
                person_id: key.person_id.clone(),
                food_id: key.food_id.clone(),
                label: item.label.clone(),
                nutrition: item.nutrition,
                piece_gram_hint: item.piece_gram_hint,
                source_type: item.source_type.clone(),
                created_at: now_millis(),
            })?;
            Ok(FavoriteState::Favorited)
        })
    }

    // --- Recents ---

    /// Up to `limit` distinct foods the person logged, most recent first.
    pub fn get_recents(&mut self, person_id: &str, limit: usize) -> Result<Vec<Recent>> {
        self.read(&[Collection::Recents], |tx| tx.recents()?.top(person_id, limit))
    }

    /// Move a food to the front of the person's recents without logging it.
    pub fn record_recent(&mut self, person_id: &str, item: &FoodItem) -> Result<Recent> {
        validate_required("personId", person_id)?;
        validate_food_item(item)?;
        self.write(&[Collection::Persons, Collection::Recents], |tx| {
            tx.persons()?.require(person_id)?;
            tx.recents()?.touch(person_id, item, now_millis())
        })
    }

    // --- Weight logs ---

    /// Record the scale weight for a day, replacing any earlier value for the
    /// same day, and refresh the person's trend weights.
    pub fn add_weight_log(
        &mut self,
        person_id: &str,
        date: &str,
        scale_weight: f64,
    ) -> Result<WeightLog> {
        validate_required("personId", person_id)?;
        validate_iso_day("date", date)?;
        validate_positive("scaleWeight", scale_weight)?;
        self.write(&[Collection::Persons, Collection::WeightLogs], |tx| {
            tx.persons()?.require(person_id)?;
            let logs = tx.weight_logs()?;
            let id = logs.upsert_by_person_date(person_id, date, scale_weight)?;
            trend::recompute_for_person(&logs, person_id)?;
            logs.get(id)?
                .ok_or_else(|| StoreError::not_found("Weight log", id.to_string()))
        })
    }

    /// A person's weight logs, newest first.
    pub fn get_weight_logs_by_person(&mut self, person_id: &str) -> Result<Vec<WeightLog>> {
        let mut logs = self.read(&[Collection::WeightLogs], |tx| {
            tx.weight_logs()?.for_person(person_id)
        })?;
        logs.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(logs)
    }

    /// A person's weight logs between two days inclusive, oldest first.
    pub fn get_weight_logs_in_range(
        &mut self,
        person_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<WeightLog>> {
        self.read(&[Collection::WeightLogs], |tx| {
            tx.weight_logs()?.in_range(person_id, start, end)
        })
    }

    /// Delete one weight log and refresh its owner's trend weights.
    pub fn delete_weight_log(&mut self, id: i64) -> Result<bool> {
        self.write(&[Collection::WeightLogs], |tx| {
            let logs = tx.weight_logs()?;
            let Some(existing) = logs.get(id)? else {
                return Ok(false);
            };
            logs.delete(id)?;
            trend::recompute_for_person(&logs, &existing.person_id)?;
            Ok(true)
        })
    }

    // --- Product cache ---

    pub fn get_cached_product(&mut self, barcode: &str) -> Result<Option<CachedProduct>> {
        self.read(&[Collection::ProductsCache], |tx| tx.products()?.get(barcode))
    }

    pub fn upsert_cached_product(&mut self, product: &CachedProduct) -> Result<()> {
        validate_cached_product(product)?;
        self.write(&[Collection::ProductsCache], |tx| tx.products()?.put(product))
    }

    // --- Meta ---

    pub fn get_meta(&mut self, key: &str) -> Result<Option<Value>> {
        self.read(&[Collection::Meta], |tx| tx.meta()?.get(key))
    }

    pub fn put_meta(&mut self, key: &str, value: &Value) -> Result<()> {
        validate_required("key", key)?;
        self.write(&[Collection::Meta], |tx| tx.meta()?.put(key, value))
    }

    /// Grams last logged under `portion_key`, if any.
    pub fn get_last_portion(&mut self, portion_key: &str) -> Result<Option<f64>> {
        let value = self.get_meta(&last_portion_meta_key(portion_key))?;
        Ok(value.as_ref().and_then(Value::as_f64))
    }

    // --- Whole database ---

    /// Consistent snapshot of every data collection.
    pub fn export_all_data(&mut self) -> Result<Snapshot> {
        self.read(&Collection::DATA, transfer::export_snapshot)
    }

    /// Replace all data with the contents of an exported snapshot.
    pub fn import_all_data(&mut self, payload: &Value) -> Result<ImportSummary> {
        let summary = self.write(&Collection::ALL, |tx| transfer::import_snapshot(tx, payload))?;
        info!(
            persons = summary.persons,
            entries = summary.entries,
            weight_logs = summary.weight_logs,
            dropped = summary.dropped,
            "Imported snapshot"
        );
        Ok(summary)
    }

    /// Typed convenience over [`Datastore::import_all_data`].
    pub fn import_snapshot(&mut self, snapshot: &Snapshot) -> Result<ImportSummary> {
        let payload = serde_json::to_value(snapshot)?;
        self.import_all_data(&payload)
    }

    /// Empty every collection, metadata included.
    pub fn delete_all_data(&mut self) -> Result<()> {
        let removed = self.write(&Collection::ALL, |tx| {
            let mut removed = 0;
            // Dependents first; the person rows go last.
            for collection in Collection::ALL.iter().rev() {
                removed += tx.clear(*collection)?;
            }
            Ok(removed)
        })?;
        info!(rows = removed, "Deleted all data");
        Ok(())
    }

    /// Replace persons and their data with two sample persons, each with one
    /// entry logged today.
    pub fn seed_sample_data(&mut self) -> Result<SampleData> {
        let persons = vec![
            Person {
                id: Uuid::new_v4().to_string(),
                name: "Alex".to_string(),
                kcal_goal: 2200.0,
                macro_targets: MacroTargets {
                    protein: Some(160.0),
                    carb: Some(240.0),
                    fat: Some(70.0),
                },
            },
            Person {
                id: Uuid::new_v4().to_string(),
                name: "Sam".to_string(),
                kcal_goal: 1800.0,
                macro_targets: MacroTargets {
                    protein: Some(120.0),
                    carb: Some(190.0),
                    fat: Some(60.0),
                },
            },
        ];
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        let created_at = now_millis();
        let entries = vec![
            Entry {
                id: Uuid::new_v4().to_string(),
                person_id: persons[0].id.clone(),
                date: today.clone(),
                time: "08:15".to_string(),
                food_id: "gf_oats".to_string(),
                food_name: "Oats (dry)".to_string(),
                amount_grams: 60.0,
                kcal: 233.0,
                protein: 10.0,
                carb: 40.0,
                fat: 4.0,
                source: "Manual (Generic built-in)".to_string(),
                created_at,
            },
            Entry {
                id: Uuid::new_v4().to_string(),
                person_id: persons[1].id.clone(),
                date: today,
                time: "12:30".to_string(),
                food_id: "custom_chicken".to_string(),
                food_name: "Chicken breast (cooked)".to_string(),
                amount_grams: 150.0,
                kcal: 248.0,
                protein: 46.0,
                carb: 0.0,
                fat: 5.0,
                source: "Manual (Custom)".to_string(),
                created_at,
            },
        ];

        let mut scope = CASCADE_SCOPE.to_vec();
        scope.push(Collection::Meta);
        self.write(&scope, |tx| {
            for collection in CASCADE_SCOPE.iter().rev() {
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
            tx.meta()?
                .put(META_SAMPLE_SEEDED_AT, &json!(Utc::now().to_rfc3339()))?;
            Ok(())
        })?;
        info!(persons = persons.len(), entries = entries.len(), "Seeded sample data");
        Ok(SampleData { persons, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{META_LAST_IMPORT_AT, Nutrition};

    fn person(id: &str, name: &str) -> Person {
        Person {
            id: id.to_string(),
            name: name.to_string(),
            kcal_goal: 2000.0,
            macro_targets: MacroTargets::default(),
        }
    }

    fn db_with_person(id: &str) -> Datastore {
        let mut db = Datastore::open_in_memory().unwrap();
        db.upsert_person(&person(id, "Alex")).unwrap();
        db
    }

    fn oats() -> FoodItem {
        FoodItem {
            food_id: "gf_oats".to_string(),
            label: "Oats (dry)".to_string(),
            nutrition: Nutrition {
                kcal_per_100g: Some(389.0),
                protein_per_100g: Some(16.9),
                carb_per_100g: Some(66.3),
                fat_per_100g: Some(6.9),
            },
            piece_gram_hint: None,
            source_type: "generic".to_string(),
        }
    }

    fn food(food_id: &str, label: &str) -> FoodItem {
        FoodItem {
            food_id: food_id.to_string(),
            label: label.to_string(),
            nutrition: Nutrition::default(),
            piece_gram_hint: None,
            source_type: "custom".to_string(),
        }
    }

    fn new_entry(person_id: &str, date: &str, time: &str) -> NewEntry {
        NewEntry {
            person_id: person_id.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            food_id: "gf_oats".to_string(),
            food_name: "Oats (dry)".to_string(),
            amount_grams: 60.0,
            kcal: 233.0,
            protein: 10.0,
            carb: 40.0,
            fat: 4.0,
            source: "Manual".to_string(),
            ..NewEntry::default()
        }
    }

    // --- Open / schema ---

    #[test]
    fn test_open_in_memory_is_current() {
        let db = Datastore::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_reopen_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macrotrack.db");
        {
            let mut db = Datastore::open(&path).unwrap();
            db.upsert_person(&person("p1", "Alex")).unwrap();
            db.close().unwrap();
        }
        let mut db = Datastore::open(&path).unwrap();
        assert_eq!(db.get_persons().unwrap().len(), 1);
        assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_open_fails_when_schema_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.db");
        let blocker = Connection::open(&path).unwrap();
        blocker
            .execute_batch("CREATE TABLE other (x INTEGER); BEGIN EXCLUSIVE; INSERT INTO other VALUES (1);")
            .unwrap();

        let config = DatastoreConfig::default().with_busy_timeout(std::time::Duration::ZERO);
        let err = Datastore::open_with(&path, &config).err().unwrap();
        assert!(matches!(err, StoreError::Schema(_)), "got {err:?}");
        assert!(!err.is_retryable());

        blocker.execute_batch("ROLLBACK").unwrap();
        assert!(Datastore::open_with(&path, &config).is_ok());
    }

    // --- Persons ---

    #[test]
    fn test_upsert_person_replaces() {
        let mut db = db_with_person("p1");
        let mut p = person("p1", "Alex");
        p.kcal_goal = 2400.0;
        p.macro_targets.protein = Some(170.0);
        db.upsert_person(&p).unwrap();

        let persons = db.get_persons().unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0], p);
    }

    #[test]
    fn test_upsert_person_rejects_invalid() {
        let mut db = Datastore::open_in_memory().unwrap();
        let mut p = person("p1", "Alex");
        p.kcal_goal = f64::NAN;
        assert!(matches!(
            db.upsert_person(&p).unwrap_err(),
            StoreError::Validation { .. }
        ));
        assert!(db.get_persons().unwrap().is_empty());
    }

    #[test]
    fn test_delete_person_cascade_removes_dependents() {
        let mut db = db_with_person("p1");
        db.upsert_person(&person("p2", "Sam")).unwrap();

        for (i, time) in ["08:00", "12:00", "19:00"].iter().enumerate() {
            let mut e = new_entry("p1", "2024-06-15", time);
            e.recent_item = Some(food(&format!("food{i}"), "Food"));
            db.add_entry(e).unwrap();
        }
        db.add_entry(new_entry("p2", "2024-06-15", "09:00")).unwrap();
        db.toggle_favorite("p1", &oats()).unwrap();
        db.toggle_favorite("p2", &oats()).unwrap();
        db.add_weight_log("p1", "2024-06-14", 80.0).unwrap();
        db.add_weight_log("p1", "2024-06-15", 79.8).unwrap();

        let summary = db.delete_person_cascade("p1").unwrap();
        assert_eq!(
            summary,
            CascadeSummary {
                person_removed: true,
                entries: 3,
                favorites: 1,
                recents: 3,
                weight_logs: 2,
            }
        );

        assert!(db.get_person("p1").unwrap().is_none());
        assert!(db.get_all_entries().unwrap().iter().all(|e| e.person_id == "p2"));
        assert!(db.get_favorites("p1").unwrap().is_empty());
        assert!(db.get_recents("p1", 20).unwrap().is_empty());
        assert!(db.get_weight_logs_by_person("p1").unwrap().is_empty());

        // Other person untouched.
        assert_eq!(db.get_entries_for_person_date("p2", "2024-06-15").unwrap().len(), 1);
        assert!(db.is_favorite("p2", "gf_oats").unwrap());
    }

    #[test]
    fn test_delete_person_cascade_unknown_person() {
        let mut db = Datastore::open_in_memory().unwrap();
        let summary = db.delete_person_cascade("nobody").unwrap();
        assert_eq!(summary, CascadeSummary::default());
    }

    // --- Entries ---

    #[test]
    fn test_add_entry_appears_once_for_day() {
        let mut db = db_with_person("p1");
        let entry = db.add_entry(new_entry("p1", "2024-06-15", "08:15")).unwrap();
        assert!(!entry.id.is_empty());
        assert!(entry.created_at > 0);

        let day = db.get_entries_for_person_date("p1", "2024-06-15").unwrap();
        assert_eq!(day.iter().filter(|e| e.id == entry.id).count(), 1);
        assert_eq!(day[0], entry);
    }

    #[test]
    fn test_add_entry_with_same_id_replaces() {
        let mut db = db_with_person("p1");
        let mut e = new_entry("p1", "2024-06-15", "08:15");
        e.id = Some("e1".to_string());
        db.add_entry(e.clone()).unwrap();
        e.amount_grams = 80.0;
        db.add_entry(e).unwrap();

        let day = db.get_entries_for_person_date("p1", "2024-06-15").unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].amount_grams, 80.0);
    }

    #[test]
    fn test_add_entry_requires_existing_person() {
        let mut db = Datastore::open_in_memory().unwrap();
        let err = db.add_entry(new_entry("ghost", "2024-06-15", "08:15")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { what: "Person", .. }));
        assert!(db.get_all_entries().unwrap().is_empty());
    }

    #[test]
    fn test_add_entry_validation_writes_nothing() {
        let mut db = db_with_person("p1");
        let mut e = new_entry("p1", "2024-06-15", "08:15");
        e.kcal = -5.0;
        e.recent_item = Some(oats());
        e.last_portion_key = Some("gf_oats".to_string());
        assert!(db.add_entry(e).is_err());

        assert!(db.get_all_entries().unwrap().is_empty());
        assert!(db.get_recents("p1", 20).unwrap().is_empty());
        assert!(db.get_last_portion("gf_oats").unwrap().is_none());
    }

    #[test]
    fn test_add_entry_records_recent_and_last_portion() {
        let mut db = db_with_person("p1");
        let mut e = new_entry("p1", "2024-06-15", "08:15");
        e.recent_item = Some(oats());
        e.last_portion_key = Some("p1:gf_oats".to_string());
        db.add_entry(e).unwrap();

        let recents = db.get_recents("p1", 20).unwrap();
        assert_eq!(recents.len(), 1);
        assert_eq!(recents[0].food_id, "gf_oats");
        assert_eq!(recents[0].nutrition.kcal_per_100g, Some(389.0));
        assert_eq!(db.get_last_portion("p1:gf_oats").unwrap(), Some(60.0));
    }

    #[test]
    fn test_entries_for_day_are_chronological() {
        let mut db = db_with_person("p1");
        db.add_entry(new_entry("p1", "2024-06-15", "19:00")).unwrap();
        db.add_entry(new_entry("p1", "2024-06-15", "08:00")).unwrap();
        db.add_entry(new_entry("p1", "2024-06-14", "12:00")).unwrap();
        db.add_entry(new_entry("p1", "2024-06-15", "12:30")).unwrap();

        let times: Vec<String> = db
            .get_entries_for_person_date("p1", "2024-06-15")
            .unwrap()
            .into_iter()
            .map(|e| e.time)
            .collect();
        assert_eq!(times, vec!["08:00", "12:30", "19:00"]);
    }

    #[test]
    fn test_entries_in_range_inclusive() {
        let mut db = db_with_person("p1");
        for date in ["2024-06-09", "2024-06-10", "2024-06-12", "2024-06-15", "2024-06-16"] {
            db.add_entry(new_entry("p1", date, "12:00")).unwrap();
        }
        let dates: Vec<String> = db
            .get_entries_in_range("p1", "2024-06-10", "2024-06-15")
            .unwrap()
            .into_iter()
            .map(|e| e.date)
            .collect();
        assert_eq!(dates, vec!["2024-06-10", "2024-06-12", "2024-06-15"]);
    }

    #[test]
    fn test_logged_dates_distinct_newest_first() {
        let mut db = db_with_person("p1");
        db.upsert_person(&person("p2", "Sam")).unwrap();
        db.add_entry(new_entry("p1", "2024-06-14", "08:00")).unwrap();
        db.add_entry(new_entry("p1", "2024-06-15", "08:00")).unwrap();
        db.add_entry(new_entry("p1", "2024-06-15", "13:00")).unwrap();
        db.add_entry(new_entry("p2", "2024-06-16", "08:00")).unwrap();

        assert_eq!(
            db.get_logged_dates_by_person("p1").unwrap(),
            vec!["2024-06-15", "2024-06-14"]
        );
    }

    #[test]
    fn test_update_entry() {
        let mut db = db_with_person("p1");
        let mut entry = db.add_entry(new_entry("p1", "2024-06-15", "08:15")).unwrap();
        entry.amount_grams = 90.0;
        entry.kcal = 350.0;
        db.update_entry(&entry).unwrap();
        assert_eq!(db.get_entry(&entry.id).unwrap(), Some(entry));
    }

    #[test]
    fn test_update_entry_not_found() {
        let mut db = db_with_person("p1");
        let mut entry = db.add_entry(new_entry("p1", "2024-06-15", "08:15")).unwrap();
        entry.id = "missing".to_string();
        let err = db.update_entry(&entry).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { what: "Entry", .. }));
    }

    #[test]
    fn test_delete_entry() {
        let mut db = db_with_person("p1");
        let entry = db.add_entry(new_entry("p1", "2024-06-15", "08:15")).unwrap();
        assert!(db.delete_entry(&entry.id).unwrap());
        assert!(!db.delete_entry(&entry.id).unwrap());
        assert!(db.get_entry(&entry.id).unwrap().is_none());
    }

    // --- Favorites ---

    #[test]
    fn test_toggle_favorite_is_its_own_inverse() {
        let mut db = db_with_person("p1");
        assert!(!db.is_favorite("p1", "gf_oats").unwrap());

        assert_eq!(db.toggle_favorite("p1", &oats()).unwrap(), FavoriteState::Favorited);
        assert!(db.is_favorite("p1", "gf_oats").unwrap());

        assert_eq!(
            db.toggle_favorite("p1", &oats()).unwrap(),
            FavoriteState::Unfavorited
        );
        assert!(!db.is_favorite("p1", "gf_oats").unwrap());
    }

    #[test]
    fn test_favorites_ordered_by_label() {
        let mut db = db_with_person("p1");
        db.toggle_favorite("p1", &food("f2", "Yogurt")).unwrap();
        db.toggle_favorite("p1", &food("f1", "Banana")).unwrap();
        db.toggle_favorite("p1", &food("f3", "Muesli")).unwrap();

        let favorites = db.get_favorites("p1").unwrap();
        let labels: Vec<&str> = favorites.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Banana", "Muesli", "Yogurt"]);
        assert_eq!(favorites[0].id, "p1:f1");
    }

    #[test]
    fn test_toggle_favorite_unknown_person() {
        let mut db = Datastore::open_in_memory().unwrap();
        let err = db.toggle_favorite("ghost", &oats()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    // --- Recents ---

    #[test]
    fn test_relogging_food_keeps_one_recent_with_latest_timestamp() {
        let mut db = db_with_person("p1");
        let started = now_millis();
        for ts in [1_000, 2_000, 3_000] {
            let mut e = new_entry("p1", "2024-06-15", "08:00");
            e.created_at = Some(ts);
            e.recent_item = Some(oats());
            db.add_entry(e).unwrap();
        }
        let recents = db.get_recents("p1", 20).unwrap();
        assert_eq!(recents.len(), 1);
        assert!(recents[0].used_at >= started);

        let rows = db
            .read(&[Collection::Recents], |tx| {
                tx.recents()?.for_person_food("p1", "gf_oats")
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_backdated_entry_moves_food_to_front() {
        let mut db = db_with_person("p1");
        let mut first = new_entry("p1", "2024-06-15", "08:00");
        first.recent_item = Some(food("a", "a"));
        db.add_entry(first).unwrap();

        let mut backdated = new_entry("p1", "2024-06-01", "08:00");
        backdated.created_at = Some(1_000);
        backdated.recent_item = Some(food("b", "b"));
        db.add_entry(backdated).unwrap();

        let ids: Vec<String> = db
            .get_recents("p1", 20)
            .unwrap()
            .into_iter()
            .map(|r| r.food_id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_recents_most_recent_first_with_limit() {
        let mut db = db_with_person("p1");
        for id in ["a", "b", "c", "a"] {
            let mut e = new_entry("p1", "2024-06-15", "08:00");
            e.recent_item = Some(food(id, id));
            db.add_entry(e).unwrap();
        }
        let ids: Vec<String> = db
            .get_recents("p1", 20)
            .unwrap()
            .into_iter()
            .map(|r| r.food_id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        assert_eq!(db.get_recents("p1", 2).unwrap().len(), 2);
        assert!(db.get_recents("p1", 0).unwrap().is_empty());
    }

    #[test]
    fn test_recents_same_millisecond_latest_insert_first() {
        let mut db = db_with_person("p1");
        db.write(&[Collection::Recents], |tx| {
            let store = tx.recents()?;
            for food_id in ["a", "b", "c"] {
                store.touch("p1", &food(food_id, food_id), 5_000)?;
            }
            Ok(())
        })
        .unwrap();

        let ids: Vec<String> = db
            .get_recents("p1", 20)
            .unwrap()
            .into_iter()
            .map(|r| r.food_id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_recents_skip_stale_duplicates() {
        let mut db = db_with_person("p1");
        db.write(&[Collection::Recents], |tx| {
            let store = tx.recents()?;
            for (id, food_id, used_at) in [("r1", "a", 10), ("r2", "a", 30), ("r3", "b", 20)] {
                store.put(&Recent {
                    id: id.to_string(),
                    person_id: "p1".to_string(),
                    food_id: food_id.to_string(),
                    label: food_id.to_string(),
                    nutrition: Nutrition::default(),
                    piece_gram_hint: None,
                    source_type: String::new(),
                    used_at,
                })?;
            }
            Ok(())
        })
        .unwrap();

        let recents = db.get_recents("p1", 20).unwrap();
        let ids: Vec<&str> = recents.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r3"]);
    }

    #[test]
    fn test_record_recent_replaces_row_id() {
        let mut db = db_with_person("p1");
        let first = db.record_recent("p1", &oats()).unwrap();
        let second = db.record_recent("p1", &oats()).unwrap();
        assert_ne!(first.id, second.id);
        let recents = db.get_recents("p1", DEFAULT_RECENTS_LIMIT).unwrap();
        assert_eq!(recents.len(), 1);
        assert_eq!(recents[0].id, second.id);
    }

    // --- Weight logs ---

    #[test]
    fn test_add_weight_log_single_trend_equals_weight() {
        let mut db = db_with_person("p1");
        let log = db.add_weight_log("p1", "2024-06-01", 81.2).unwrap();
        assert_eq!(log.scale_weight, 81.2);
        assert_eq!(log.trend_weight, Some(81.2));
    }

    #[test]
    fn test_same_day_weight_overwrites_in_place() {
        let mut db = db_with_person("p1");
        let first = db.add_weight_log("p1", "2024-06-01", 81.2).unwrap();
        let second = db.add_weight_log("p1", "2024-06-01", 80.6).unwrap();
        assert_eq!(first.id, second.id);

        let logs = db.get_weight_logs_by_person("p1").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].scale_weight, 80.6);
        assert_eq!(logs[0].trend_weight, Some(80.6));
    }

    #[test]
    fn test_weight_trend_over_seven_days() {
        let mut db = db_with_person("p1");
        let weights = [80.0, 80.4, 79.9, 80.8, 80.1, 79.7, 80.3];
        for (i, w) in weights.iter().enumerate() {
            db.add_weight_log("p1", &format!("2024-06-{:02}", i + 1), *w)
                .unwrap();
        }
        let logs = db
            .get_weight_logs_in_range("p1", "2024-06-01", "2024-06-07")
            .unwrap();
        assert_eq!(logs.len(), 7);
        let expected = weights.iter().sum::<f64>() / 7.0;
        let expected = (expected * 1000.0).round() / 1000.0;
        assert_eq!(logs[6].trend_weight, Some(expected));
        assert_eq!(logs[0].date, "2024-06-01");
    }

    #[test]
    fn test_backdated_weight_updates_later_trends() {
        let mut db = db_with_person("p1");
        db.add_weight_log("p1", "2024-06-03", 80.0).unwrap();
        db.add_weight_log("p1", "2024-06-02", 82.0).unwrap();

        let logs = db
            .get_weight_logs_in_range("p1", "2024-06-01", "2024-06-30")
            .unwrap();
        assert_eq!(logs[0].trend_weight, Some(82.0));
        assert_eq!(logs[1].trend_weight, Some(81.0));
    }

    #[test]
    fn test_weight_logs_on_date_across_persons() {
        let mut db = db_with_person("p1");
        db.upsert_person(&person("p2", "Sam")).unwrap();
        db.add_weight_log("p2", "2024-06-01", 64.0).unwrap();
        db.add_weight_log("p1", "2024-06-01", 81.0).unwrap();
        db.add_weight_log("p1", "2024-06-02", 80.5).unwrap();

        let logs = db
            .read(&[Collection::WeightLogs], |tx| {
                tx.weight_logs()?.on_date("2024-06-01")
            })
            .unwrap();
        let owners: Vec<&str> = logs.iter().map(|l| l.person_id.as_str()).collect();
        assert_eq!(owners, vec!["p1", "p2"]);
        assert!(logs.iter().all(|l| l.date == "2024-06-01"));
    }

    #[test]
    fn test_weight_history_newest_first() {
        let mut db = db_with_person("p1");
        db.add_weight_log("p1", "2024-06-01", 80.0).unwrap();
        db.add_weight_log("p1", "2024-06-03", 79.0).unwrap();
        db.add_weight_log("p1", "2024-06-02", 79.5).unwrap();
        let dates: Vec<String> = db
            .get_weight_logs_by_person("p1")
            .unwrap()
            .into_iter()
            .map(|l| l.date)
            .collect();
        assert_eq!(dates, vec!["2024-06-03", "2024-06-02", "2024-06-01"]);
    }

    #[test]
    fn test_add_weight_log_rejects_non_positive() {
        let mut db = db_with_person("p1");
        for bad in [0.0, -70.0, f64::NAN, f64::INFINITY] {
            let err = db.add_weight_log("p1", "2024-06-01", bad).unwrap_err();
            assert!(matches!(err, StoreError::Validation { field: "scaleWeight", .. }));
        }
        assert!(db.get_weight_logs_by_person("p1").unwrap().is_empty());
    }

    #[test]
    fn test_add_weight_log_rejects_bad_date_and_unknown_person() {
        let mut db = db_with_person("p1");
        assert!(db.add_weight_log("p1", "06/01/2024", 80.0).is_err());
        assert!(db.add_weight_log("p1", "", 80.0).is_err());
        let err = db.add_weight_log("ghost", "2024-06-01", 80.0).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(db.get_weight_logs_by_person("p1").unwrap().is_empty());
    }

    #[test]
    fn test_delete_weight_log_recomputes_trend() {
        let mut db = db_with_person("p1");
        let first = db.add_weight_log("p1", "2024-06-01", 90.0).unwrap();
        db.add_weight_log("p1", "2024-06-02", 80.0).unwrap();
        assert!(db.delete_weight_log(first.id).unwrap());
        assert!(!db.delete_weight_log(first.id).unwrap());

        let logs = db.get_weight_logs_by_person("p1").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].trend_weight, Some(80.0));
    }

    // --- Product cache / meta ---

    #[test]
    fn test_cached_product_roundtrip() {
        let mut db = Datastore::open_in_memory().unwrap();
        assert!(db.get_cached_product("737628064502").unwrap().is_none());
        let product = CachedProduct {
            barcode: "737628064502".to_string(),
            product_name: "Rice Noodles".to_string(),
            brands: Some("Thai Kitchen".to_string()),
            image_url: None,
            nutrition: Nutrition {
                kcal_per_100g: Some(364.0),
                ..Nutrition::default()
            },
            fetched_at: Some(1_718_000_000_000),
        };
        db.upsert_cached_product(&product).unwrap();
        assert_eq!(db.get_cached_product("737628064502").unwrap(), Some(product));
    }

    #[test]
    fn test_meta_put_overwrites() {
        let mut db = Datastore::open_in_memory().unwrap();
        db.put_meta("theme", &json!("dark")).unwrap();
        db.put_meta("theme", &json!({"mode": "light"})).unwrap();
        assert_eq!(db.get_meta("theme").unwrap(), Some(json!({"mode": "light"})));
        assert!(db.get_meta("missing").unwrap().is_none());
    }

    // --- Whole database ---

    #[test]
    fn test_delete_all_data_clears_everything() {
        let mut db = db_with_person("p1");
        let mut e = new_entry("p1", "2024-06-15", "08:00");
        e.recent_item = Some(oats());
        e.last_portion_key = Some("gf_oats".to_string());
        db.add_entry(e).unwrap();
        db.add_weight_log("p1", "2024-06-15", 80.0).unwrap();
        db.put_meta(META_LAST_IMPORT_AT, &json!("2024-06-15T00:00:00Z")).unwrap();

        db.delete_all_data().unwrap();

        let counts = db
            .read(&Collection::ALL, |tx| {
                Ok([
                    tx.persons()?.count()?,
                    tx.entries()?.count()?,
                    tx.recents()?.count()?,
                    tx.weight_logs()?.count()?,
                ])
            })
            .unwrap();
        assert_eq!(counts, [0, 0, 0, 0]);
        assert!(db.get_meta(META_LAST_IMPORT_AT).unwrap().is_none());
    }

    #[test]
    fn test_seed_sample_data() {
        let mut db = db_with_person("old");
        db.add_weight_log("old", "2024-06-01", 80.0).unwrap();

        let seeded = db.seed_sample_data().unwrap();
        assert_eq!(seeded.persons.len(), 2);
        assert_eq!(seeded.entries.len(), 2);

        let persons = db.get_persons().unwrap();
        assert_eq!(persons.len(), 2);
        assert!(persons.iter().all(|p| p.id != "old"));
        assert!(db.get_weight_logs_by_person("old").unwrap().is_empty());

        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        let alex = &seeded.persons[0];
        let day = db.get_entries_for_person_date(&alex.id, &today).unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].food_id, "gf_oats");
        assert!(db.get_meta(META_SAMPLE_SEEDED_AT).unwrap().is_some());
    }
}
