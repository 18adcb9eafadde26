//! Typed per-collection stores handed out by [`crate::tx::Tx`].
//!
//! Every store exposes `get_all`, `get`, `put` (insert or replace by key) and
//! `delete`, plus the indexed queries its collection declares.

mod entries;
mod favorites;
mod meta;
mod persons;
mod products;
mod recents;
mod weight_logs;

pub use entries::EntryStore;
pub use favorites::FavoriteStore;
pub use meta::MetaStore;
pub use persons::PersonStore;
pub use products::ProductStore;
pub use recents::RecentStore;
pub use weight_logs::WeightLogStore;

use rusqlite::types::Type;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Decode a JSON text column; NULL reads as the type's default.
pub(crate) fn json_column<T: DeserializeOwned + Default>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(T::default()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
