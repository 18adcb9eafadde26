//! Embedded datastore for the macrotrack nutrition logger.
//!
//! [`Datastore`] owns one SQLite connection and exposes the persistence
//! operations; [`StoreHandle`] shares it across async tasks.

pub mod config;
pub mod db;
pub mod error;
pub mod handle;
pub mod models;
pub mod schema;
pub mod store;
mod transfer;
pub mod trend;
pub mod tx;

pub use config::DatastoreConfig;
pub use db::{DEFAULT_RECENTS_LIMIT, Datastore};
pub use error::{Result, StoreError};
pub use handle::StoreHandle;
pub use schema::{Collection, SCHEMA_VERSION};
pub use tx::{AccessMode, Tx};
