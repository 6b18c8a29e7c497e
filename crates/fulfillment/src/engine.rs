// Archivo: engine.rs
// Propósito: evaluación de disponibilidad y reserva atómica de ingredientes.
//
// Ambas piezas son compartidas por el servicio de órdenes y por el
// reconciliador de la cola, de modo que una receta se reserva siempre por el
// mismo camino sin importar quién la pida.
use chrono::{DateTime, Utc};
use kitchen_domain::{DeductOutcome, DomainError, InventoryStore, KitchenRepository, Order, OrderStatus, Recipe,
                     RecipeCatalog};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resultado de un intento de reserva.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Se descontaron todos los ingredientes de la receta.
    Reserved,
    /// Faltaba algún ingrediente (o la receta no se puede resolver); el
    /// inventario quedó intacto.
    Insufficient,
}

impl From<DeductOutcome> for ReservationOutcome {
    fn from(outcome: DeductOutcome) -> Self {
        match outcome {
            DeductOutcome::Applied => ReservationOutcome::Reserved,
            DeductOutcome::Shortfall { .. } => ReservationOutcome::Insufficient,
        }
    }
}

/// Responde si hay stock para una receta sin modificar nada.
///
/// Es una consulta informativa: entre `check` y cualquier reserva
/// posterior el inventario puede cambiar. Nunca se usa para autorizar un
/// descuento.
pub struct AvailabilityEvaluator<R>
    where R: InventoryStore + RecipeCatalog + ?Sized
{
    repo: Arc<R>,
}

impl<R> AvailabilityEvaluator<R> where R: InventoryStore + RecipeCatalog + ?Sized
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// `Ok(true)` si cada requisito (sumado por ingrediente) está cubierto
    /// por el stock actual. Receta o ingrediente inexistente devuelven
    /// `ReferenceError`.
    pub fn check(&self, recipe_id: i64) -> Result<bool, DomainError> {
        let recipe = self.repo
                         .get_recipe(recipe_id)?
                         .ok_or_else(|| DomainError::ReferenceError(format!("receta {}", recipe_id)))?;
        for (ingredient_id, required) in recipe.aggregated_requirements() {
            let ingredient =
                self.repo
                    .get_ingredient(ingredient_id)?
                    .ok_or_else(|| DomainError::ReferenceError(format!("ingrediente {}", ingredient_id)))?;
            if !ingredient.covers(required) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Variante a prueba de fallos de `check`: cualquier error cuenta como
    /// "no disponible".
    pub fn is_available(&self, recipe_id: i64) -> bool {
        match self.check(recipe_id) {
            Ok(available) => available,
            Err(e) => {
                warn!(recipe_id, error = %e, "no se pudo evaluar la disponibilidad");
                false
            }
        }
    }
}

/// Único punto del sistema que descuenta inventario.
pub struct ReservationEngine<R>
    where R: InventoryStore + RecipeCatalog + ?Sized
{
    repo: Arc<R>,
}

impl<R> ReservationEngine<R> where R: InventoryStore + RecipeCatalog + ?Sized
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Resuelve la receta y la reserva. Una receta inexistente se informa
    /// como `Insufficient`.
    pub fn try_reserve(&self, recipe_id: i64) -> Result<ReservationOutcome, DomainError> {
        match self.repo.get_recipe(recipe_id)? {
            Some(recipe) => self.reserve_recipe(&recipe),
            None => {
                warn!(recipe_id, "receta inexistente; se trata como stock insuficiente");
                Ok(ReservationOutcome::Insufficient)
            }
        }
    }

    /// Reserva todos los ingredientes de `recipe` en una sola operación
    /// atómica del almacén.
    ///
    /// `StoreUnavailable` se propaga: el llamador decide si reintenta.
    pub fn reserve_recipe(&self, recipe: &Recipe) -> Result<ReservationOutcome, DomainError> {
        match self.repo.try_deduct(recipe) {
            Ok(DeductOutcome::Applied) => {
                debug!(recipe_id = recipe.id(), "ingredientes reservados");
                Ok(ReservationOutcome::Reserved)
            }
            Ok(DeductOutcome::Shortfall { ingredient_id, required, available }) => {
                debug!(recipe_id = recipe.id(),
                       ingredient_id,
                       required,
                       available,
                       "stock insuficiente");
                Ok(ReservationOutcome::Insufficient)
            }
            Err(DomainError::ReferenceError(msg)) => {
                warn!(recipe_id = recipe.id(), reason = %msg, "la receta referencia datos inexistentes");
                Ok(ReservationOutcome::Insufficient)
            }
            Err(e) => Err(e),
        }
    }
}

impl<R> ReservationEngine<R> where R: KitchenRepository + ?Sized
{
    /// Reserva `recipe` y registra la orden resultante en una sola
    /// operación atómica del almacén. Si la receta referencia un
    /// ingrediente inexistente la orden se registra en cola.
    pub fn reserve_for_new_order(&self,
                                 recipe: &Recipe,
                                 at: DateTime<Utc>)
                                 -> Result<(ReservationOutcome, Order), DomainError> {
        match self.repo.reserve_and_record(recipe, at) {
            Ok((outcome, order)) => {
                debug!(recipe_id = recipe.id(), order_id = order.id(), ?outcome, "reserva registrada");
                Ok((outcome.into(), order))
            }
            Err(DomainError::ReferenceError(msg)) => {
                warn!(recipe_id = recipe.id(), reason = %msg, "la receta referencia datos inexistentes");
                let order = self.repo.create_order(recipe.id(), OrderStatus::Queued, at)?;
                Ok((ReservationOutcome::Insufficient, order))
            }
            Err(e) => Err(e),
        }
    }

    /// Reintenta una orden en cola: descuenta y la marca lista en la misma
    /// operación, o sólo renueva su timestamp. Si el almacén falla no queda
    /// nada descontado y la orden sigue en cola.
    pub fn retry_queued(&self, order: &Order, at: DateTime<Utc>) -> Result<ReservationOutcome, DomainError> {
        let recipe = match self.repo.get_recipe(order.recipe_id())? {
            Some(recipe) => recipe,
            None => {
                warn!(order_id = order.id(), recipe_id = order.recipe_id(), "receta inexistente; la orden sigue en cola");
                self.repo.refresh_queued(order.id(), at)?;
                return Ok(ReservationOutcome::Insufficient);
            }
        };
        match self.repo.reserve_and_promote(order.id(), &recipe, at) {
            Ok((outcome, _)) => Ok(outcome.into()),
            Err(DomainError::ReferenceError(msg)) => {
                warn!(order_id = order.id(), reason = %msg, "la receta referencia datos inexistentes");
                self.repo.refresh_queued(order.id(), at)?;
                Ok(ReservationOutcome::Insufficient)
            }
            Err(e) => Err(e),
        }
    }
}
