// ingredient.rs
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ingrediente con su existencia actual en inventario.
///
/// `stock` nunca es negativo: los constructores lo validan y los
/// repositorios sólo lo decrementan de forma condicional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ingredient {
  id: i64,
  name: String,
  stock: i64,
}

impl Ingredient {
  fn new(id: i64, name: &str, stock: i64) -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre del ingrediente no puede estar vacío".to_string()));
    }
    if stock < 0 {
      return Err(DomainError::ValidationError(format!("Stock negativo para el ingrediente {}: {}", id, stock)));
    }
    Ok(Self { id, name: name.trim().to_string(), stock })
  }

  pub fn from_parts(id: i64, name: &str, stock: i64) -> Result<Self, DomainError> {
    Self::new(id, name, stock)
  }

  pub fn id(&self) -> i64 {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn stock(&self) -> i64 {
    self.stock
  }

  /// ¿Alcanza el stock para `quantity` unidades?
  pub fn covers(&self, quantity: i64) -> bool {
    self.stock >= quantity
  }

  pub(crate) fn set_stock(&mut self, stock: i64) {
    debug_assert!(stock >= 0);
    self.stock = stock;
  }
}

impl fmt::Display for Ingredient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Ingredient({}: {}, stock {})", self.id, self.name, self.stock)
  }
}
