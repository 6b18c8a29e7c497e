// Archivo: errors.rs
// Propósito: errores de la capa de cumplimiento y el alias Result<T>.
use kitchen_domain::DomainError;
use thiserror::Error;

/// Errores del motor de cumplimiento de órdenes.
///
/// El stock insuficiente no es un error: se informa como
/// `OrderResult::Queued`.
#[derive(Error, Debug)]
pub enum KitchenError {
  /// Errores del dominio o del almacenamiento.
  #[error("Error de dominio: {0}")]
  Domain(#[from] DomainError),
  /// La receta elegida no existe en el catálogo.
  #[error("Receta no encontrada en el catálogo: {0}")]
  RecipeNotFound(i64),
  /// No hay recetas entre las que elegir.
  #[error("El catálogo de recetas está vacío")]
  EmptyCatalog,
  /// Configuración inválida al arrancar; el proceso no debe iniciar.
  #[error("Configuración inválida: {0}")]
  Config(String),
}

impl KitchenError {
  /// `true` si reintentar más tarde puede funcionar (almacenamiento caído).
  pub fn is_transient(&self) -> bool {
    matches!(self, KitchenError::Domain(e) if e.is_transient())
  }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, KitchenError>;
