//! Crate `fulfillment`: atención de pedidos y reconciliación de la cola.
//!
//! Un pedido elige una receta, intenta reservar todos sus ingredientes de
//! forma atómica y registra una orden `Ready` o `Queued`. El
//! `QueueReconciler` reintenta periódicamente las órdenes en cola usando el
//! mismo `ReservationEngine`, de modo que el stock nunca se descuenta dos
//! veces ni queda negativo.
//!
//! Ejemplo rápido:
//! ```rust
//! use fulfillment::FulfillmentService;
//! use kitchen_domain::KitchenStubs;
//! use std::sync::Arc;
//! let repo = Arc::new(KitchenStubs::sample_repo().unwrap());
//! let service = FulfillmentService::new(repo);
//! let result = service.fulfill().unwrap();
//! assert!(result.is_prepared());
//! ```
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod reconciler;
pub mod service;

pub use clock::*;
pub use config::*;
pub use engine::*;
pub use errors::*;
pub use reconciler::*;
pub use service::*;
