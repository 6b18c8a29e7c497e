// errors.rs
use thiserror::Error;

/// Errores del dominio de cocina y de sus repositorios.
///
/// El stock insuficiente no aparece aquí: es un resultado normal
/// (`DeductOutcome::Shortfall`), no un error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
  #[error("Error de validación: {0}")]
  ValidationError(String),
  /// Una receta o ingrediente referenciado no existe.
  #[error("Referencia inexistente: {0}")]
  ReferenceError(String),
  /// Transición de estado no permitida (p.ej. Ready -> Ready).
  #[error("Transición inválida: {0}")]
  InvalidTransition(String),
  /// El almacenamiento no responde (pool, SQL, mutex envenenado).
  #[error("Almacenamiento no disponible: {0}")]
  StoreUnavailable(String),
  #[error("Configuración inválida: {0}")]
  Configuration(String),
}

impl DomainError {
  /// Errores que pueden resolverse reintentando más tarde.
  pub fn is_transient(&self) -> bool {
    matches!(self, DomainError::StoreUnavailable(_))
  }
}

