// recipe.rs
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cantidad de un ingrediente que exige una receta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipeRequirement {
  pub recipe_id: i64,
  pub ingredient_id: i64,
  pub quantity: i64,
}

/// Receta: datos de referencia inmutables con su lista ordenada de
/// requerimientos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
  id: i64,
  name: String,
  requirements: Vec<RecipeRequirement>,
}

impl Recipe {
  /// Crea una receta a partir de pares `(ingredient_id, quantity)` en el orden
  /// en que deben evaluarse.
  pub fn new(id: i64, name: &str, requirements: &[(i64, i64)]) -> Result<Self, DomainError> {
    let reqs: Vec<RecipeRequirement> = requirements.iter()
                                                   .map(|&(ingredient_id, quantity)| RecipeRequirement { recipe_id: id,
                                                                                                         ingredient_id,
                                                                                                         quantity })
                                                   .collect();
    Self::from_parts(id, name, reqs)
  }

  pub fn from_parts(id: i64, name: &str, requirements: Vec<RecipeRequirement>) -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre de la receta no puede estar vacío".to_string()));
    }
    if requirements.is_empty() {
      return Err(DomainError::ValidationError(format!("La receta {} no tiene ingredientes", id)));
    }
    for r in requirements.iter() {
      if r.recipe_id != id {
        return Err(DomainError::ValidationError(format!("Requerimiento de la receta {} asignado a la receta {}",
                                                        r.recipe_id, id)));
      }
      if r.quantity <= 0 {
        return Err(DomainError::ValidationError(format!("Cantidad no positiva ({}) del ingrediente {} en la receta {}",
                                                        r.quantity, r.ingredient_id, id)));
      }
    }
    Ok(Self { id, name: name.trim().to_string(), requirements })
  }

  pub fn id(&self) -> i64 {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn requirements(&self) -> &[RecipeRequirement] {
    &self.requirements
  }

  /// Suma las cantidades por ingrediente. El `BTreeMap` deja las claves en
  /// orden ascendente, que es el orden de bloqueo usado al reservar.
  pub fn aggregated_requirements(&self) -> BTreeMap<i64, i64> {
    let mut out = BTreeMap::new();
    for r in self.requirements.iter() {
      *out.entry(r.ingredient_id).or_insert(0) += r.quantity;
    }
    out
  }
}

impl fmt::Display for Recipe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Recipe({}: {}, {} ingredientes)", self.id, self.name, self.requirements.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn aggregates_repeated_ingredients() -> Result<(), DomainError> {
    let r = Recipe::new(1, "Pancakes", &[(3, 1), (1, 2), (3, 2)])?;
    let agg = r.aggregated_requirements();
    assert_eq!(agg.into_iter().collect::<Vec<_>>(), vec![(1, 2), (3, 3)]);
    // el orden original se conserva en `requirements`
    assert_eq!(r.requirements()[0].ingredient_id, 3);
    Ok(())
  }

  #[test]
  fn rejects_zero_quantity() {
    assert!(Recipe::new(1, "Agua", &[(1, 0)]).is_err());
  }

  #[test]
  fn rejects_foreign_requirement() {
    let req = RecipeRequirement { recipe_id: 9, ingredient_id: 1, quantity: 1 };
    assert!(matches!(Recipe::from_parts(1, "Sopa", vec![req]), Err(DomainError::ValidationError(_))));
  }
}
