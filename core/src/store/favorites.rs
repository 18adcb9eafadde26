use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::models::{
    Favorite, FavoriteKey, validate_nutrition, validate_required,
};
use crate::schema::index;
use crate::tx::StoreAccess;

use super::{json_column, to_json};

const FAVORITE_COLUMNS: &str =
    "person_id, food_id, label, nutrition, piece_gram_hint, source_type, created_at";

pub struct FavoriteStore<'a> {
    access: StoreAccess<'a>,
}

impl<'a> FavoriteStore<'a> {
    pub(crate) fn new(access: StoreAccess<'a>) -> Self {
        Self { access }
    }

    fn favorite_from_row(row: &rusqlite::Row) -> rusqlite::Result<Favorite> {
        let person_id: String = row.get(0)?;
        let food_id: String = row.get(1)?;
        Ok(Favorite {
            id: FavoriteKey::new(person_id.clone(), food_id.clone()).to_string(),
            person_id,
            food_id,
            label: row.get(2)?,
            nutrition: json_column(row, 3)?,
            piece_gram_hint: row.get(4)?,
            source_type: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Favorite>> {
        let mut stmt = self.access.conn().prepare(sql)?;
        let favorites = stmt
            .query_map(params, Self::favorite_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(favorites)
    }

    pub fn get_all(&self) -> Result<Vec<Favorite>> {
        self.query(
            &format!("SELECT {FAVORITE_COLUMNS} FROM favorites ORDER BY person_id, food_id"),
            [],
        )
    }

    pub fn get(&self, key: &FavoriteKey) -> Result<Option<Favorite>> {
        let favorite = self
            .access
            .conn()
            .query_row(
                &format!(
                    "SELECT {FAVORITE_COLUMNS} FROM favorites WHERE person_id = ?1 AND food_id = ?2"
                ),
                params![key.person_id, key.food_id],
                Self::favorite_from_row,
            )
            .optional()?;
        Ok(favorite)
    }

    pub fn contains(&self, key: &FavoriteKey) -> Result<bool> {
        let mut stmt = self
            .access
            .conn()
            .prepare("SELECT 1 FROM favorites WHERE person_id = ?1 AND food_id = ?2")?;
        Ok(stmt.exists(params![key.person_id, key.food_id])?)
    }

    /// Insert or replace the favorite at its `(person_id, food_id)` key.
    pub fn put(&self, favorite: &Favorite) -> Result<()> {
        validate_required("personId", &favorite.person_id)?;
        validate_required("foodId", &favorite.food_id)?;
        validate_nutrition(&favorite.nutrition)?;
        let nutrition = to_json(&favorite.nutrition)?;
        self.access.writer()?.execute(
            "INSERT OR REPLACE INTO favorites (person_id, food_id, label, nutrition,
                piece_gram_hint, source_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                favorite.person_id,
                favorite.food_id,
                favorite.label,
                nutrition,
                favorite.piece_gram_hint,
                favorite.source_type,
                favorite.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &FavoriteKey) -> Result<bool> {
        let rows = self.access.writer()?.execute(
            "DELETE FROM favorites WHERE person_id = ?1 AND food_id = ?2",
            params![key.person_id, key.food_id],
        )?;
        Ok(rows > 0)
    }

    /// A person's favorites ordered by label.
    pub fn for_person(&self, person_id: &str) -> Result<Vec<Favorite>> {
        self.query(
            &format!(
                "SELECT {FAVORITE_COLUMNS} FROM favorites INDEXED BY {}
                 WHERE person_id = ?1
                 ORDER BY label",
                index::FAVORITES_BY_PERSON_LABEL
            ),
            params![person_id],
        )
    }

    pub fn delete_by_person(&self, person_id: &str) -> Result<usize> {
        self.access
            .delete_owned_by(index::FAVORITES_BY_PERSON, person_id)
    }

    pub fn count(&self) -> Result<usize> {
        self.access.count()
    }
}
