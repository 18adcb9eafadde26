use rusqlite::{OptionalExtension, params};
use serde_json::Value;

use crate::error::Result;
use crate::models::{MetaEntry, validate_required};
use crate::tx::StoreAccess;

use super::to_json;

/// Key/value facts. Values are stored as JSON text.
pub struct MetaStore<'a> {
    access: StoreAccess<'a>,
}

impl<'a> MetaStore<'a> {
    pub(crate) fn new(access: StoreAccess<'a>) -> Self {
        Self { access }
    }

    pub fn get_all(&self) -> Result<Vec<MetaEntry>> {
        let mut stmt = self
            .access
            .conn()
            .prepare("SELECT key, value FROM meta ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(key, raw)| {
                Ok(MetaEntry {
                    key,
                    value: serde_json::from_str(&raw)?,
                })
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .access
            .conn()
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &str, value: &Value) -> Result<()> {
        validate_required("key", key)?;
        let raw = to_json(value)?;
        self.access.writer()?.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, raw],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        let rows = self
            .access
            .writer()?
            .execute("DELETE FROM meta WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}
