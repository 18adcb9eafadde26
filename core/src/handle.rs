use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::DatastoreConfig;
use crate::db::Datastore;
use crate::error::{Result, StoreError};

/// Process-wide, cloneable handle to the one open [`Datastore`].
///
/// Acquire it once at startup with [`StoreHandle::open`] and hand clones to
/// whatever needs storage. Each [`StoreHandle::exec`] runs on the tokio
/// blocking pool while holding the connection lock, so operations queue
/// behind each other and the caller is suspended until its transaction
/// settles. Call [`StoreHandle::close`] at shutdown.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<Mutex<Option<Datastore>>>,
}

impl StoreHandle {
    #[must_use]
    pub fn new(db: Datastore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(db))),
        }
    }

    pub async fn open(path: PathBuf, config: DatastoreConfig) -> Result<Self> {
        let db = tokio::task::spawn_blocking(move || Datastore::open_with(&path, &config))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))??;
        Ok(Self::new(db))
    }

    pub async fn open_in_memory() -> Result<Self> {
        let db = tokio::task::spawn_blocking(Datastore::open_in_memory)
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))??;
        Ok(Self::new(db))
    }

    /// Run `job` against the datastore.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Datastore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| StoreError::Worker("datastore lock poisoned".to_string()))?;
            let db = guard.as_mut().ok_or(StoreError::Closed)?;
            job(db)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    /// Close the connection. Later calls on any clone fail with [`StoreError::Closed`].
    pub async fn close(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let db = inner
                .lock()
                .map_err(|_| StoreError::Worker("datastore lock poisoned".to_string()))?
                .take();
            match db {
                Some(db) => {
                    db.close()?;
                    info!("Closed datastore");
                    Ok(())
                }
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}
