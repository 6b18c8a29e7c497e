// Archivo: service.rs
// Propósito: orquestar la atención de un pedido (elegir receta, reservar,
// registrar la orden) y las consultas de solo lectura sobre la cola.
use crate::clock::{Clock, SystemClock};
use crate::engine::{AvailabilityEvaluator, ReservationEngine, ReservationOutcome};
use crate::errors::{KitchenError, Result};
use kitchen_domain::{Ingredient, KitchenRepository, Order};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Elige la receta de un pedido entre los ids del catálogo.
pub trait RecipePicker: Send + Sync {
    /// `None` sólo cuando `recipe_ids` está vacío.
    fn pick(&self, recipe_ids: &[i64]) -> Option<i64>;
}

/// Elección uniforme al azar.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPicker;

impl RecipePicker for RandomPicker {
    fn pick(&self, recipe_ids: &[i64]) -> Option<i64> {
        recipe_ids.choose(&mut rand::thread_rng()).copied()
    }
}

/// Resultado de atender un pedido. En ambos casos la orden ya quedó
/// registrada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderResult {
    /// Ingredientes reservados; la orden nace lista.
    Prepared { order: Order, recipe_name: String },
    /// Sin stock suficiente; la orden espera en la cola.
    Queued { order: Order, recipe_name: String },
}

impl OrderResult {
    pub fn order(&self) -> &Order {
        match self {
            OrderResult::Prepared { order, .. } | OrderResult::Queued { order, .. } => order,
        }
    }

    pub fn recipe_name(&self) -> &str {
        match self {
            OrderResult::Prepared { recipe_name, .. } | OrderResult::Queued { recipe_name, .. } => recipe_name,
        }
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self, OrderResult::Prepared { .. })
    }

    /// Mensaje para el cliente.
    pub fn message(&self) -> String {
        match self {
            OrderResult::Prepared { recipe_name, .. } => format!("Dish generated: {}", recipe_name),
            OrderResult::Queued { .. } => "insufficient ingredients".to_string(),
        }
    }
}

/// Fila de la vista previa de la cola.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedDish {
    pub order_id: i64,
    pub recipe_id: i64,
    /// Informativo: el stock puede cambiar antes del próximo ciclo.
    pub ready_to_cook: bool,
}

/// Servicio de cumplimiento de pedidos.
///
/// Comparte el `ReservationEngine` con el reconciliador de la cola para que
/// todo descuento de inventario pase por el mismo camino atómico.
pub struct FulfillmentService<R>
    where R: KitchenRepository + ?Sized
{
    repo: Arc<R>,
    evaluator: AvailabilityEvaluator<R>,
    engine: Arc<ReservationEngine<R>>,
    picker: Arc<dyn RecipePicker>,
    clock: Arc<dyn Clock>,
}

impl<R> FulfillmentService<R> where R: KitchenRepository + ?Sized
{
    /// Servicio con elección aleatoria y reloj del sistema.
    pub fn new(repo: Arc<R>) -> Self {
        Self::with_parts(repo, Arc::new(RandomPicker), Arc::new(SystemClock))
    }

    pub fn with_parts(repo: Arc<R>, picker: Arc<dyn RecipePicker>, clock: Arc<dyn Clock>) -> Self {
        Self { evaluator: AvailabilityEvaluator::new(repo.clone()),
               engine: Arc::new(ReservationEngine::new(repo.clone())),
               repo,
               picker,
               clock }
    }

    pub fn repository(&self) -> Arc<R> {
        self.repo.clone()
    }

    pub fn engine(&self) -> Arc<ReservationEngine<R>> {
        self.engine.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Atiende un pedido con una receta elegida por el `RecipePicker`.
    pub fn fulfill(&self) -> Result<OrderResult> {
        let recipe_ids = self.repo.list_recipe_ids()?;
        let recipe_id = self.picker.pick(&recipe_ids).ok_or(KitchenError::EmptyCatalog)?;
        self.fulfill_recipe(recipe_id)
    }

    /// Atiende un pedido de una receta concreta.
    ///
    /// Registra exactamente una orden: `Ready` si la reserva se aplicó,
    /// `Queued` si faltaba stock. Reserva y orden se escriben juntas; si el
    /// almacén falla no queda ninguna de las dos y se devuelve el error.
    pub fn fulfill_recipe(&self, recipe_id: i64) -> Result<OrderResult> {
        let recipe = self.repo.get_recipe(recipe_id)?.ok_or(KitchenError::RecipeNotFound(recipe_id))?;
        let (outcome, order) = self.engine.reserve_for_new_order(&recipe, self.clock.now())?;
        info!(order_id = order.id(), recipe_id, status = %order.status(), "orden registrada");
        let recipe_name = recipe.name().to_string();
        Ok(match outcome {
               ReservationOutcome::Reserved => OrderResult::Prepared { order, recipe_name },
               ReservationOutcome::Insufficient => OrderResult::Queued { order, recipe_name },
           })
    }

    /// Ids de receta de las órdenes en cola, por id de orden ascendente.
    pub fn queued_recipe_ids(&self) -> Result<Vec<i64>> {
        Ok(self.repo.list_queued()?.into_iter().map(|o| o.recipe_id()).collect())
    }

    /// Órdenes en cola junto con su disponibilidad actual.
    pub fn queue_preview(&self) -> Result<Vec<QueuedDish>> {
        Ok(self.repo
               .list_queued()?
               .into_iter()
               .map(|o| QueuedDish { order_id: o.id(),
                                     recipe_id: o.recipe_id(),
                                     ready_to_cook: self.evaluator.is_available(o.recipe_id()) })
               .collect())
    }

    /// Últimas `limit` órdenes, la más reciente primero.
    pub fn latest_orders(&self, limit: usize) -> Result<Vec<Order>> {
        Ok(self.repo.latest_orders(limit)?)
    }

    pub fn inventory(&self) -> Result<Vec<Ingredient>> {
        Ok(self.repo.list_ingredients()?)
    }

    /// Repone stock. Las órdenes en cola se atienden en el próximo ciclo del
    /// reconciliador, no aquí.
    pub fn restock(&self, ingredient_id: i64, quantity: i64) -> Result<Ingredient> {
        let ingredient = self.repo.restock(ingredient_id, quantity)?;
        info!(ingredient_id, quantity, stock = ingredient.stock(), "stock repuesto");
        Ok(ingredient)
    }

    pub fn is_available(&self, recipe_id: i64) -> bool {
        self.evaluator.is_available(recipe_id)
    }
}
