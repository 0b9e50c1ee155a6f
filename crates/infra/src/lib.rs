//! Infrastructure layer: configuration, profile storage, seeding and record
//! stores.

pub mod billing;
pub mod config;
pub mod profile_store;
pub mod records;
pub mod seed;

pub use config::{AppConfig, ConfigError};
pub use profile_store::{
    InMemoryProfileStore, PostgresProfileStore, ProfileStore, StoreError, StoreProfileResolver,
};
pub use records::{InMemoryRecordStore, RecordStore};
