//! Infrastructure layer: configuration, Postgres wiring, stores and workflows.

pub mod config;
pub mod db;
pub mod error;
pub mod store;
pub mod workflow;


pub use config::{ConfigError, DatabaseConfig, StorefrontConfig};
pub use error::{StoreError, StoreResult};
