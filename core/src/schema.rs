use std::fmt;

use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use crate::error::{Result, StoreError};

pub const SCHEMA_VERSION: i64 = 4;

const DEFAULT_MACRO_TARGETS: &str = r#"{"protein":null,"carb":null,"fat":null}"#;

/// A logical collection (one SQLite table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Persons,
    Entries,
    ProductsCache,
    Favorites,
    Recents,
    WeightLogs,
    Meta,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Persons,
        Collection::Entries,
        Collection::ProductsCache,
        Collection::Favorites,
        Collection::Recents,
        Collection::WeightLogs,
        Collection::Meta,
    ];

    /// Everything that takes part in export/import.
    pub const DATA: [Collection; 6] = [
        Collection::Persons,
        Collection::Entries,
        Collection::ProductsCache,
        Collection::Favorites,
        Collection::Recents,
        Collection::WeightLogs,
    ];

    /// Collections whose rows are owned by a person.
    pub const PERSON_DEPENDENTS: [Collection; 4] = [
        Collection::Entries,
        Collection::Favorites,
        Collection::Recents,
        Collection::WeightLogs,
    ];

    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Collection::Persons => "persons",
            Collection::Entries => "entries",
            Collection::ProductsCache => "products_cache",
            Collection::Favorites => "favorites",
            Collection::Recents => "recents",
            Collection::WeightLogs => "weight_logs",
            Collection::Meta => "meta",
        }
    }

    /// Name used in snapshots and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Collection::Persons => "persons",
            Collection::Entries => "entries",
            Collection::ProductsCache => "productsCache",
            Collection::Favorites => "favorites",
            Collection::Recents => "recents",
            Collection::WeightLogs => "weightLogs",
            Collection::Meta => "meta",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Dependent tables reference persons with deferred foreign keys: a cascade may
// remove the person first, but no orphan can survive the commit.
const TABLES: &[(Collection, &str)] = &[
    (
        Collection::Persons,
        "CREATE TABLE IF NOT EXISTS persons (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            kcal_goal REAL NOT NULL DEFAULT 0,
            macro_targets TEXT
        )",
    ),
    (
        Collection::Entries,
        "CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY NOT NULL,
            person_id TEXT NOT NULL REFERENCES persons(id) DEFERRABLE INITIALLY DEFERRED,
            date TEXT NOT NULL,
            time TEXT NOT NULL DEFAULT '',
            food_id TEXT NOT NULL,
            food_name TEXT NOT NULL DEFAULT '',
            amount_grams REAL NOT NULL,
            kcal REAL NOT NULL,
            protein REAL NOT NULL,
            carb REAL NOT NULL,
            fat REAL NOT NULL,
            source TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )",
    ),
    (
        Collection::ProductsCache,
        "CREATE TABLE IF NOT EXISTS products_cache (
            barcode TEXT PRIMARY KEY NOT NULL,
            product_name TEXT NOT NULL DEFAULT '',
            brands TEXT,
            image_url TEXT,
            nutrition TEXT NOT NULL DEFAULT '{}',
            fetched_at INTEGER
        )",
    ),
    (
        Collection::Favorites,
        "CREATE TABLE IF NOT EXISTS favorites (
            person_id TEXT NOT NULL REFERENCES persons(id) DEFERRABLE INITIALLY DEFERRED,
            food_id TEXT NOT NULL,
            label TEXT NOT NULL,
            nutrition TEXT NOT NULL DEFAULT '{}',
            piece_gram_hint REAL,
            source_type TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            PRIMARY KEY (person_id, food_id)
        )",
    ),
    (
        Collection::Recents,
        "CREATE TABLE IF NOT EXISTS recents (
            id TEXT PRIMARY KEY NOT NULL,
            person_id TEXT NOT NULL REFERENCES persons(id) DEFERRABLE INITIALLY DEFERRED,
            food_id TEXT NOT NULL,
            label TEXT NOT NULL,
            nutrition TEXT NOT NULL DEFAULT '{}',
            piece_gram_hint REAL,
            source_type TEXT NOT NULL DEFAULT '',
            used_at INTEGER NOT NULL
        )",
    ),
    (
        Collection::WeightLogs,
        "CREATE TABLE IF NOT EXISTS weight_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id TEXT NOT NULL REFERENCES persons(id) DEFERRABLE INITIALLY DEFERRED,
            date TEXT NOT NULL,
            scale_weight REAL NOT NULL CHECK (scale_weight > 0),
            trend_weight REAL
        )",
    ),
    (
        Collection::Meta,
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )",
    ),
];

/// Secondary index names, referenced by `INDEXED BY` clauses.
pub(crate) mod index {
    pub const ENTRIES_BY_PERSON_DATE: &str = "entries_by_person_date";
    pub const ENTRIES_BY_PERSON_DATE_TIME: &str = "entries_by_person_date_time";
    pub const ENTRIES_BY_PERSON: &str = "entries_by_person";
    pub const FAVORITES_BY_PERSON: &str = "favorites_by_person";
    pub const FAVORITES_BY_PERSON_LABEL: &str = "favorites_by_person_label";
    pub const RECENTS_BY_PERSON_USED_AT: &str = "recents_by_person_used_at";
    pub const RECENTS_BY_PERSON_FOOD: &str = "recents_by_person_food";
    pub const WEIGHT_LOGS_BY_PERSON_DATE: &str = "weight_logs_by_person_date";
    pub const WEIGHT_LOGS_BY_PERSON: &str = "weight_logs_by_person";
    pub const WEIGHT_LOGS_BY_DATE: &str = "weight_logs_by_date";
}

struct IndexDef {
    name: &'static str,
    table: &'static str,
    columns: &'static str,
    unique: bool,
}

const INDEXES: &[IndexDef] = &[
    IndexDef {
        name: index::ENTRIES_BY_PERSON_DATE,
        table: "entries",
        columns: "person_id, date",
        unique: false,
    },
    IndexDef {
        name: index::ENTRIES_BY_PERSON_DATE_TIME,
        table: "entries",
        columns: "person_id, date, time",
        unique: false,
    },
    IndexDef {
        name: index::ENTRIES_BY_PERSON,
        table: "entries",
        columns: "person_id",
        unique: false,
    },
    IndexDef {
        name: index::FAVORITES_BY_PERSON,
        table: "favorites",
        columns: "person_id",
        unique: false,
    },
    IndexDef {
        name: index::FAVORITES_BY_PERSON_LABEL,
        table: "favorites",
        columns: "person_id, label",
        unique: false,
    },
    IndexDef {
        name: index::RECENTS_BY_PERSON_USED_AT,
        table: "recents",
        columns: "person_id, used_at",
        unique: false,
    },
    IndexDef {
        name: index::RECENTS_BY_PERSON_FOOD,
        table: "recents",
        columns: "person_id, food_id",
        unique: false,
    },
    IndexDef {
        name: index::WEIGHT_LOGS_BY_PERSON_DATE,
        table: "weight_logs",
        columns: "person_id, date",
        unique: true,
    },
    IndexDef {
        name: index::WEIGHT_LOGS_BY_PERSON,
        table: "weight_logs",
        columns: "person_id",
        unique: false,
    },
    IndexDef {
        name: index::WEIGHT_LOGS_BY_DATE,
        table: "weight_logs",
        columns: "date",
        unique: false,
    },
];

pub(crate) fn stored_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

/// Bring the datastore up to [`SCHEMA_VERSION`].
///
/// A store already at the current version is left untouched. Otherwise the
/// upgrade runs under an exclusive lock; if another connection holds the
/// database the upgrade fails instead of waiting past the busy timeout.
pub(crate) fn migrate(conn: &mut Connection) -> Result<()> {
    let version = stored_version(conn).map_err(StoreError::Schema)?;
    if version == SCHEMA_VERSION {
        return Ok(());
    }
    if version > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    let tx = Transaction::new(conn, TransactionBehavior::Exclusive).map_err(StoreError::Schema)?;
    // Another process may have upgraded between the first read and the lock.
    let version = stored_version(&tx).map_err(StoreError::Schema)?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    info!(from = version, to = SCHEMA_VERSION, "Upgrading datastore schema");
    upgrade(&tx, version).map_err(StoreError::Schema)?;
    tx.commit().map_err(StoreError::Schema)?;
    Ok(())
}

fn upgrade(tx: &Transaction, from_version: i64) -> rusqlite::Result<()> {
    for (collection, ddl) in TABLES {
        debug!(collection = %collection, "Ensuring collection");
        tx.execute_batch(ddl)?;
    }

    // Version 1 stores predate per-person macro targets.
    if !has_column(tx, "persons", "macro_targets")? {
        tx.execute_batch("ALTER TABLE persons ADD COLUMN macro_targets TEXT")?;
    }

    for def in INDEXES {
        ensure_index(tx, def)?;
    }

    if from_version < 2 {
        let patched = backfill_macro_targets(tx)?;
        if patched > 0 {
            info!(persons = patched, "Backfilled default macro targets");
        }
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2")?;
    stmt.exists(params![table, column])
}

fn index_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1")?;
    stmt.exists(params![name])
}

/// Create an index unless one with the same name already exists, whatever its definition.
fn ensure_index(conn: &Connection, def: &IndexDef) -> rusqlite::Result<()> {
    if index_exists(conn, def.name)? {
        return Ok(());
    }
    let unique = if def.unique { "UNIQUE " } else { "" };
    conn.execute_batch(&format!(
        "CREATE {unique}INDEX {} ON {} ({})",
        def.name, def.table, def.columns
    ))
}

/// Give every person lacking an object-shaped `macro_targets` the default
/// all-null targets. Running it again changes nothing.
fn backfill_macro_targets(conn: &Connection) -> rusqlite::Result<usize> {
    let rows: Vec<(String, Option<String>)> = {
        let mut stmt = conn.prepare("SELECT id, macro_targets FROM persons")?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut patched = 0;
    for (id, raw) in rows {
        let is_object = raw
            .as_deref()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
            .is_some_and(|v| v.is_object());
        if !is_object {
            conn.execute(
                "UPDATE persons SET macro_targets = ?1 WHERE id = ?2",
                params![DEFAULT_MACRO_TARGETS, id],
            )?;
            patched += 1;
        }
    }
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn
    }

    fn index_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrate_creates_all_collections() {
        let conn = fresh();
        for collection in Collection::ALL {
            let exists: bool = conn
                .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .unwrap()
                .exists(params![collection.table()])
                .unwrap();
            assert!(exists, "missing table {}", collection.table());
        }
        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_creates_all_indexes() {
        let conn = fresh();
        let names = index_names(&conn);
        for def in INDEXES {
            assert!(names.iter().any(|n| n == def.name), "missing index {}", def.name);
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = fresh();
        let before = index_names(&conn);
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(index_names(&conn), before);
        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_ensure_index_leaves_existing_index_untouched() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE recents (id TEXT PRIMARY KEY, person_id TEXT, food_id TEXT, used_at INTEGER);
             CREATE INDEX recents_by_person_food ON recents (person_id);",
        )
        .unwrap();
        let def = INDEXES
            .iter()
            .find(|d| d.name == index::RECENTS_BY_PERSON_FOOD)
            .unwrap();
        ensure_index(&conn, def).unwrap();

        let sql: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = 'recents_by_person_food'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!sql.contains("food_id"));
    }

    #[test]
    fn test_upgrade_from_v1_backfills_macro_targets() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE persons (id TEXT PRIMARY KEY NOT NULL, name TEXT NOT NULL, kcal_goal REAL NOT NULL);
             INSERT INTO persons (id, name, kcal_goal) VALUES ('p1', 'Alex', 2200);
             PRAGMA user_version = 1;",
        )
        .unwrap();

        migrate(&mut conn).unwrap();

        let raw: String = conn
            .query_row("SELECT macro_targets FROM persons WHERE id = 'p1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "protein": null, "carb": null, "fat": null })
        );
        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_backfill_keeps_existing_targets_and_fixes_malformed() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE persons (id TEXT PRIMARY KEY NOT NULL, name TEXT NOT NULL, kcal_goal REAL NOT NULL, macro_targets TEXT);
               INSERT INTO persons VALUES ('p1', 'Alex', 2200, '{"protein":160,"carb":240,"fat":70}');
               INSERT INTO persons VALUES ('p2', 'Sam', 1800, 'not json');
               INSERT INTO persons VALUES ('p3', 'Kim', 1900, '42');
               PRAGMA user_version = 1;"#,
        )
        .unwrap();

        migrate(&mut conn).unwrap();

        let get = |id: &str| -> String {
            conn.query_row(
                "SELECT macro_targets FROM persons WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(get("p1"), r#"{"protein":160,"carb":240,"fat":70}"#);
        assert_eq!(get("p2"), DEFAULT_MACRO_TARGETS);
        assert_eq!(get("p3"), DEFAULT_MACRO_TARGETS);

        assert_eq!(backfill_macro_targets(&conn).unwrap(), 0);
    }

    #[test]
    fn test_migrate_rejects_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::SchemaTooNew { .. }));
    }

    #[test]
    fn test_weight_log_index_is_unique() {
        let conn = fresh();
        conn.execute("INSERT INTO persons (id, name) VALUES ('p1', 'Alex')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO weight_logs (person_id, date, scale_weight) VALUES ('p1', '2024-06-01', 80)",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO weight_logs (person_id, date, scale_weight) VALUES ('p1', '2024-06-01', 81)",
            [],
        );
        assert!(dup.is_err());
    }
}
