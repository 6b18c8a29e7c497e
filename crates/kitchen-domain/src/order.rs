// order.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Estado de una orden. Los códigos numéricos son los que se persisten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  /// Ingredientes reservados; estado terminal.
  Ready,
  /// Esperando stock; la reintenta el reconciliador.
  Queued,
}

impl OrderStatus {
  pub fn code(self) -> i32 {
    match self {
      OrderStatus::Ready => 1,
      OrderStatus::Queued => 2,
    }
  }

  pub fn from_code(code: i32) -> Result<Self, DomainError> {
    match code {
      1 => Ok(OrderStatus::Ready),
      2 => Ok(OrderStatus::Queued),
      other => Err(DomainError::ValidationError(format!("Código de estado desconocido: {}", other))),
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OrderStatus::Ready => write!(f, "ready"),
      OrderStatus::Queued => write!(f, "queued"),
    }
  }
}

/// Orden registrada en el libro de órdenes.
///
/// Los campos son privados: sólo el `OrderLedger` crea órdenes y aplica
/// transiciones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  id: i64,
  recipe_id: i64,
  status: OrderStatus,
  last_updated: DateTime<Utc>,
}

impl Order {
  pub fn from_parts(id: i64, recipe_id: i64, status: OrderStatus, last_updated: DateTime<Utc>) -> Self {
    Self { id, recipe_id, status, last_updated }
  }

  pub fn id(&self) -> i64 {
    self.id
  }

  pub fn recipe_id(&self) -> i64 {
    self.recipe_id
  }

  pub fn status(&self) -> OrderStatus {
    self.status
  }

  pub fn last_updated(&self) -> DateTime<Utc> {
    self.last_updated
  }

  pub fn is_queued(&self) -> bool {
    self.status == OrderStatus::Queued
  }

  /// Queued -> Ready. Ready es terminal.
  pub(crate) fn promote(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
    if self.status != OrderStatus::Queued {
      return Err(DomainError::InvalidTransition(format!("la orden {} ya está {}", self.id, self.status)));
    }
    self.status = OrderStatus::Ready;
    self.last_updated = at;
    Ok(())
  }

  /// Queued -> Queued con timestamp renovado.
  pub(crate) fn requeue(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
    if self.status != OrderStatus::Queued {
      return Err(DomainError::InvalidTransition(format!("la orden {} no está en cola", self.id)));
    }
    self.last_updated = at;
    Ok(())
  }
}
