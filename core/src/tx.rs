use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::schema::Collection;
use crate::store::{
    EntryStore, FavoriteStore, MetaStore, PersonStore, ProductStore, RecentStore, WeightLogStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// A transaction over a declared set of collections.
///
/// Dropping a `Tx` without calling [`Tx::commit`] rolls it back, so an early
/// `?` return leaves nothing behind. Read-write transactions take the write
/// lock up front (`BEGIN IMMEDIATE`), which serializes writers.
pub struct Tx<'conn> {
    inner: Transaction<'conn>,
    scope: Vec<Collection>,
    mode: AccessMode,
}

impl<'conn> Tx<'conn> {
    pub(crate) fn begin(
        conn: &'conn mut Connection,
        scope: &[Collection],
        mode: AccessMode,
    ) -> Result<Self> {
        let behavior = match mode {
            AccessMode::ReadOnly => TransactionBehavior::Deferred,
            AccessMode::ReadWrite => TransactionBehavior::Immediate,
        };
        let inner = Transaction::new(conn, behavior)?;
        debug!(?mode, ?scope, "Transaction started");
        Ok(Self {
            inner,
            scope: scope.to_vec(),
            mode,
        })
    }

    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    #[must_use]
    pub fn scope(&self) -> &[Collection] {
        &self.scope
    }

    fn access(&self, collection: Collection) -> Result<StoreAccess<'_>> {
        if !self.scope.contains(&collection) {
            return Err(StoreError::Scope {
                collection,
                reason: "not part of this transaction",
            });
        }
        let conn: &Connection = &self.inner;
        Ok(StoreAccess {
            conn,
            collection,
            mode: self.mode,
        })
    }

    pub fn persons(&self) -> Result<PersonStore<'_>> {
        self.access(Collection::Persons).map(PersonStore::new)
    }

    pub fn entries(&self) -> Result<EntryStore<'_>> {
        self.access(Collection::Entries).map(EntryStore::new)
    }

    pub fn products(&self) -> Result<ProductStore<'_>> {
        self.access(Collection::ProductsCache).map(ProductStore::new)
    }

    pub fn favorites(&self) -> Result<FavoriteStore<'_>> {
        self.access(Collection::Favorites).map(FavoriteStore::new)
    }

    pub fn recents(&self) -> Result<RecentStore<'_>> {
        self.access(Collection::Recents).map(RecentStore::new)
    }

    pub fn weight_logs(&self) -> Result<WeightLogStore<'_>> {
        self.access(Collection::WeightLogs).map(WeightLogStore::new)
    }

    pub fn meta(&self) -> Result<MetaStore<'_>> {
        self.access(Collection::Meta).map(MetaStore::new)
    }

    /// Remove every row of a collection in scope.
    pub fn clear(&self, collection: Collection) -> Result<usize> {
        self.access(collection)?.clear()
    }

    pub fn commit(self) -> Result<()> {
        self.inner.commit()?;
        Ok(())
    }

    pub fn abort(self) -> Result<()> {
        self.inner.rollback()?;
        Ok(())
    }
}

/// What a typed store needs from its transaction: the connection, which
/// collection it is bound to, and whether it may write.
#[derive(Clone, Copy)]
pub(crate) struct StoreAccess<'a> {
    conn: &'a Connection,
    collection: Collection,
    mode: AccessMode,
}

impl<'a> StoreAccess<'a> {
    pub(crate) fn conn(&self) -> &'a Connection {
        self.conn
    }

    pub(crate) fn writer(&self) -> Result<&'a Connection> {
        if self.mode == AccessMode::ReadOnly {
            return Err(StoreError::Scope {
                collection: self.collection,
                reason: "write attempted in a read-only transaction",
            });
        }
        Ok(self.conn)
    }

    pub(crate) fn clear(&self) -> Result<usize> {
        let sql = format!("DELETE FROM {}", self.collection.table());
        Ok(self.writer()?.execute(&sql, [])?)
    }

    pub(crate) fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.collection.table());
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Delete every row owned by `person_id`, walking only the given person-scoped index.
    pub(crate) fn delete_owned_by(&self, index: &str, person_id: &str) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {} INDEXED BY {index} WHERE person_id = ?1",
            self.collection.table()
        );
        Ok(self.writer()?.execute(&sql, params![person_id])?)
    }
}
