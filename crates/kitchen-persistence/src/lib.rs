//! Persistencia Diesel para los traits del dominio de cocina
//! (`InventoryStore`, `RecipeCatalog`, `OrderLedger`).
//!
//! SQLite por defecto; Postgres con la feature `pg`. La implementación
//! detallada está en `kitchen_persistence.rs`.

mod kitchen_persistence;
pub mod schema;

pub use kitchen_persistence::{database_url_from_env, new_from_env, DieselKitchenRepository};
