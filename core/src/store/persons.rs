use rusqlite::{OptionalExtension, params};

use crate::error::{Result, StoreError};
use crate::models::{Person, validate_person};
use crate::tx::StoreAccess;

use super::{json_column, to_json};

pub struct PersonStore<'a> {
    access: StoreAccess<'a>,
}

impl<'a> PersonStore<'a> {
    pub(crate) fn new(access: StoreAccess<'a>) -> Self {
        Self { access }
    }

    fn person_from_row(row: &rusqlite::Row) -> rusqlite::Result<Person> {
        Ok(Person {
            id: row.get(0)?,
            name: row.get(1)?,
            kcal_goal: row.get(2)?,
            macro_targets: json_column(row, 3)?,
        })
    }

    pub fn get_all(&self) -> Result<Vec<Person>> {
        let mut stmt = self
            .access
            .conn()
            .prepare("SELECT id, name, kcal_goal, macro_targets FROM persons ORDER BY id")?;
        let persons = stmt
            .query_map([], Self::person_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(persons)
    }

    pub fn get(&self, id: &str) -> Result<Option<Person>> {
        let person = self
            .access
            .conn()
            .query_row(
                "SELECT id, name, kcal_goal, macro_targets FROM persons WHERE id = ?1",
                params![id],
                Self::person_from_row,
            )
            .optional()?;
        Ok(person)
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        let mut stmt = self
            .access
            .conn()
            .prepare("SELECT 1 FROM persons WHERE id = ?1")?;
        Ok(stmt.exists(params![id])?)
    }

    /// Fail with `NotFound` unless the person exists.
    pub fn require(&self, id: &str) -> Result<()> {
        if self.exists(id)? {
            Ok(())
        } else {
            Err(StoreError::not_found("Person", id))
        }
    }

    pub fn put(&self, person: &Person) -> Result<()> {
        validate_person(person)?;
        let macro_targets = to_json(&person.macro_targets)?;
        self.access.writer()?.execute(
            "INSERT INTO persons (id, name, kcal_goal, macro_targets)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kcal_goal = excluded.kcal_goal,
                macro_targets = excluded.macro_targets",
            params![person.id, person.name, person.kcal_goal, macro_targets],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let rows = self
            .access
            .writer()?
            .execute("DELETE FROM persons WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn count(&self) -> Result<usize> {
        self.access.count()
    }
}
