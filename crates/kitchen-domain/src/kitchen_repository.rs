use crate::{DomainError, Ingredient, Order, OrderStatus, Recipe};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Resultado de un intento de descuento atómico de inventario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductOutcome {
    /// Se descontaron todas las cantidades de la receta.
    Applied,
    /// Algún ingrediente no alcanzaba; el inventario quedó intacto.
    Shortfall { ingredient_id: i64, required: i64, available: i64 },
}

/// Existencias por ingrediente.
pub trait InventoryStore: Send + Sync {
    fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>, DomainError>;

    /// Lista el inventario ordenado por id.
    fn list_ingredients(&self) -> Result<Vec<Ingredient>, DomainError>;

    /// Inserta o reemplaza un ingrediente (carga de datos de referencia).
    fn save_ingredient(&self, ingredient: Ingredient) -> Result<i64, DomainError>;

    /// Descuenta de una sola vez todas las cantidades que exige `recipe`.
    ///
    /// Debe ser atómico: o se descuenta todo o no se toca nada. La
    /// verificación se hace contra el stock vigente dentro de la misma
    /// sección crítica que el descuento. Si un ingrediente referenciado no
    /// existe se devuelve `ReferenceError` sin modificar nada.
    fn try_deduct(&self, recipe: &Recipe) -> Result<DeductOutcome, DomainError>;

    /// Suma `quantity` (> 0) al stock del ingrediente y devuelve el estado
    /// resultante.
    fn restock(&self, ingredient_id: i64, quantity: i64) -> Result<Ingredient, DomainError>;
}

/// Catálogo de recetas (datos de referencia).
pub trait RecipeCatalog: Send + Sync {
    fn get_recipe(&self, id: i64) -> Result<Option<Recipe>, DomainError>;

    /// Ids de todas las recetas, ascendentes.
    fn list_recipe_ids(&self) -> Result<Vec<i64>, DomainError>;

    fn save_recipe(&self, recipe: Recipe) -> Result<i64, DomainError>;
}

/// Libro de órdenes. Es el único dueño de los registros `Order`.
pub trait OrderLedger: Send + Sync {
    /// Inserta una orden nueva con id creciente.
    fn create_order(&self, recipe_id: i64, status: OrderStatus, at: DateTime<Utc>) -> Result<Order, DomainError>;

    fn get_order(&self, id: i64) -> Result<Option<Order>, DomainError>;

    /// Órdenes en cola por id ascendente (más antigua primero).
    fn list_queued(&self) -> Result<Vec<Order>, DomainError>;

    /// Queued -> Ready. Falla con `InvalidTransition` si la orden ya no está
    /// en cola y con `ReferenceError` si no existe.
    fn mark_ready(&self, id: i64, at: DateTime<Utc>) -> Result<Order, DomainError>;

    /// Renueva el timestamp de una orden que sigue en cola.
    fn refresh_queued(&self, id: i64, at: DateTime<Utc>) -> Result<Order, DomainError>;

    /// Las `limit` órdenes más recientes por id descendente.
    fn latest_orders(&self, limit: usize) -> Result<Vec<Order>, DomainError>;

    fn count_orders(&self) -> Result<i64, DomainError>;
}

/// Descuento de inventario y escritura en el libro como una sola unidad.
///
/// Si cualquiera de las dos partes falla no queda nada aplicado: ni stock
/// descontado sin orden `Ready`, ni orden `Ready` sin stock descontado.
pub trait ReservationLedger: Send + Sync {
    /// Intenta descontar `recipe` y registra una orden nueva: `Ready` si el
    /// descuento se aplicó, `Queued` si faltaba stock. Un ingrediente
    /// inexistente devuelve `ReferenceError` sin escribir nada.
    fn reserve_and_record(&self, recipe: &Recipe, at: DateTime<Utc>) -> Result<(DeductOutcome, Order), DomainError>;

    /// Para la orden en cola `order_id` (que debe ser de `recipe`): descuenta
    /// y la pasa a `Ready`, o sólo renueva su timestamp si falta stock.
    /// `ReferenceError` si la orden o un ingrediente no existen,
    /// `InvalidTransition` si ya no está en cola.
    fn reserve_and_promote(&self,
                           order_id: i64,
                           recipe: &Recipe,
                           at: DateTime<Utc>)
                           -> Result<(DeductOutcome, Order), DomainError>;
}

/// Todo lo que necesita el motor de cumplimiento en un solo bound.
pub trait KitchenRepository: InventoryStore + RecipeCatalog + OrderLedger + ReservationLedger {}

impl<T> KitchenRepository for T where T: InventoryStore + RecipeCatalog + OrderLedger + ReservationLedger {}

#[derive(Debug, Default)]
struct OrderBook {
    next_id: i64,
    orders: BTreeMap<i64, Order>,
}

impl OrderBook {
    fn insert(&mut self, recipe_id: i64, status: OrderStatus, at: DateTime<Utc>) -> Order {
        self.next_id += 1;
        let order = Order::from_parts(self.next_id, recipe_id, status, at);
        self.orders.insert(order.id(), order.clone());
        order
    }
}

/// Verifica todo y sólo entonces descuenta; con el inventario ya bloqueado.
fn deduct_locked(inventory: &mut BTreeMap<i64, Ingredient>, recipe: &Recipe) -> Result<DeductOutcome, DomainError> {
    let needed = recipe.aggregated_requirements();
    for (&ingredient_id, &required) in needed.iter() {
        let ingredient = inventory.get(&ingredient_id).ok_or_else(|| {
                                                          DomainError::ReferenceError(format!("ingrediente {} (receta {})",
                                                                                              ingredient_id,
                                                                                              recipe.id()))
                                                      })?;
        if !ingredient.covers(required) {
            return Ok(DeductOutcome::Shortfall { ingredient_id, required, available: ingredient.stock() });
        }
    }
    for (ingredient_id, required) in needed {
        if let Some(ingredient) = inventory.get_mut(&ingredient_id) {
            let left = ingredient.stock() - required;
            ingredient.set_stock(left);
        }
    }
    Ok(DeductOutcome::Applied)
}

/// Implementación en memoria para tests y desarrollo.
///
/// Un único mutex protege el inventario completo; `try_deduct` verifica y
/// descuenta sin soltarlo.
pub struct InMemoryKitchenRepository {
    inventory: Arc<Mutex<BTreeMap<i64, Ingredient>>>,
    recipes: Arc<Mutex<BTreeMap<i64, Recipe>>>,
    orders: Arc<Mutex<OrderBook>>,
}

impl InMemoryKitchenRepository {
    pub fn new() -> Self {
        Self { inventory: Arc::new(Mutex::new(BTreeMap::new())),
               recipes: Arc::new(Mutex::new(BTreeMap::new())),
               orders: Arc::new(Mutex::new(OrderBook::default())) }
    }

    // Helper to map poisoned mutex errors into DomainError
    fn lock_map<'a, T>(&'a self, m: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, DomainError> {
        m.lock()
         .map_err(|e| DomainError::StoreUnavailable(format!("Mutex '{}' poisoned: {}", name, e)))
    }

    fn transition<F>(&self, id: i64, apply: F) -> Result<Order, DomainError>
        where F: FnOnce(&mut Order) -> Result<(), DomainError>
    {
        let mut book = self.lock_map(&self.orders, "orders")?;
        let order = book.orders
                        .get_mut(&id)
                        .ok_or_else(|| DomainError::ReferenceError(format!("orden {}", id)))?;
        apply(order)?;
        Ok(order.clone())
    }
}

impl Default for InMemoryKitchenRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryStore for InMemoryKitchenRepository {
    fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>, DomainError> {
        let inventory = self.lock_map(&self.inventory, "inventory")?;
        Ok(inventory.get(&id).cloned())
    }

    fn list_ingredients(&self) -> Result<Vec<Ingredient>, DomainError> {
        let inventory = self.lock_map(&self.inventory, "inventory")?;
        Ok(inventory.values().cloned().collect())
    }

    fn save_ingredient(&self, ingredient: Ingredient) -> Result<i64, DomainError> {
        let id = ingredient.id();
        self.lock_map(&self.inventory, "inventory")?.insert(id, ingredient);
        Ok(id)
    }

    fn try_deduct(&self, recipe: &Recipe) -> Result<DeductOutcome, DomainError> {
        let mut inventory = self.lock_map(&self.inventory, "inventory")?;
        deduct_locked(&mut inventory, recipe)
    }

    fn restock(&self, ingredient_id: i64, quantity: i64) -> Result<Ingredient, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::ValidationError(format!("Cantidad de reabastecimiento no positiva: {}", quantity)));
        }
        let mut inventory = self.lock_map(&self.inventory, "inventory")?;
        let ingredient = inventory.get_mut(&ingredient_id)
                                  .ok_or_else(|| DomainError::ReferenceError(format!("ingrediente {}", ingredient_id)))?;
        let total = ingredient.stock()
                              .checked_add(quantity)
                              .ok_or_else(|| DomainError::ValidationError("Desbordamiento de stock".to_string()))?;
        ingredient.set_stock(total);
        Ok(ingredient.clone())
    }
}

impl RecipeCatalog for InMemoryKitchenRepository {
    fn get_recipe(&self, id: i64) -> Result<Option<Recipe>, DomainError> {
        let recipes = self.lock_map(&self.recipes, "recipes")?;
        Ok(recipes.get(&id).cloned())
    }

    fn list_recipe_ids(&self) -> Result<Vec<i64>, DomainError> {
        let recipes = self.lock_map(&self.recipes, "recipes")?;
        Ok(recipes.keys().copied().collect())
    }

    fn save_recipe(&self, recipe: Recipe) -> Result<i64, DomainError> {
        let id = recipe.id();
        self.lock_map(&self.recipes, "recipes")?.insert(id, recipe);
        Ok(id)
    }
}

impl OrderLedger for InMemoryKitchenRepository {
    fn create_order(&self, recipe_id: i64, status: OrderStatus, at: DateTime<Utc>) -> Result<Order, DomainError> {
        let mut book = self.lock_map(&self.orders, "orders")?;
        Ok(book.insert(recipe_id, status, at))
    }

    fn get_order(&self, id: i64) -> Result<Option<Order>, DomainError> {
        let book = self.lock_map(&self.orders, "orders")?;
        Ok(book.orders.get(&id).cloned())
    }

    fn list_queued(&self) -> Result<Vec<Order>, DomainError> {
        let book = self.lock_map(&self.orders, "orders")?;
        Ok(book.orders.values().filter(|o| o.is_queued()).cloned().collect())
    }

    fn mark_ready(&self, id: i64, at: DateTime<Utc>) -> Result<Order, DomainError> {
        self.transition(id, |o| o.promote(at))
    }

    fn refresh_queued(&self, id: i64, at: DateTime<Utc>) -> Result<Order, DomainError> {
        self.transition(id, |o| o.requeue(at))
    }

    fn latest_orders(&self, limit: usize) -> Result<Vec<Order>, DomainError> {
        let book = self.lock_map(&self.orders, "orders")?;
        Ok(book.orders.values().rev().take(limit).cloned().collect())
    }

    fn count_orders(&self) -> Result<i64, DomainError> {
        let book = self.lock_map(&self.orders, "orders")?;
        Ok(book.orders.len() as i64)
    }
}

// Orden de bloqueo: siempre inventario y después órdenes.
impl ReservationLedger for InMemoryKitchenRepository {
    fn reserve_and_record(&self, recipe: &Recipe, at: DateTime<Utc>) -> Result<(DeductOutcome, Order), DomainError> {
        let mut inventory = self.lock_map(&self.inventory, "inventory")?;
        let mut book = self.lock_map(&self.orders, "orders")?;
        let outcome = deduct_locked(&mut inventory, recipe)?;
        let status = match outcome {
            DeductOutcome::Applied => OrderStatus::Ready,
            DeductOutcome::Shortfall { .. } => OrderStatus::Queued,
        };
        Ok((outcome, book.insert(recipe.id(), status, at)))
    }

    fn reserve_and_promote(&self,
                           order_id: i64,
                           recipe: &Recipe,
                           at: DateTime<Utc>)
                           -> Result<(DeductOutcome, Order), DomainError> {
        let mut inventory = self.lock_map(&self.inventory, "inventory")?;
        let mut book = self.lock_map(&self.orders, "orders")?;
        let order = book.orders
                        .get_mut(&order_id)
                        .ok_or_else(|| DomainError::ReferenceError(format!("orden {}", order_id)))?;
        if !order.is_queued() {
            return Err(DomainError::InvalidTransition(format!("la orden {} no está en cola", order_id)));
        }
        if order.recipe_id() != recipe.id() {
            return Err(DomainError::ValidationError(format!("la orden {} es de la receta {}, no de la {}",
                                                            order_id,
                                                            order.recipe_id(),
                                                            recipe.id())));
        }
        let outcome = deduct_locked(&mut inventory, recipe)?;
        match outcome {
            DeductOutcome::Applied => order.promote(at)?,
            DeductOutcome::Shortfall { .. } => order.requeue(at)?,
        }
        Ok((outcome, order.clone()))
    }
}
