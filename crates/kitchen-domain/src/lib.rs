mod errors;
mod ingredient;
mod kitchen_repository;
mod kitchen_stubs;
mod order;
mod recipe;

pub use errors::DomainError;
pub use ingredient::Ingredient;
pub use kitchen_repository::{DeductOutcome, InMemoryKitchenRepository, InventoryStore, KitchenRepository, OrderLedger,
                             RecipeCatalog, ReservationLedger};
pub use kitchen_stubs::KitchenStubs;
pub use order::{Order, OrderStatus};
pub use recipe::{Recipe, RecipeRequirement};
