use crate::kitchen_repository::{InMemoryKitchenRepository, InventoryStore, RecipeCatalog};
use crate::{DomainError, Ingredient, Recipe};

/// Stock inicial de cada ingrediente en la cocina de ejemplo.
pub const SAMPLE_STOCK: i64 = 5;

const INGREDIENTS: [(i64, &str); 10] = [(1, "tomato"),
                                        (2, "lemon"),
                                        (3, "potato"),
                                        (4, "rice"),
                                        (5, "ketchup"),
                                        (6, "lettuce"),
                                        (7, "onion"),
                                        (8, "cheese"),
                                        (9, "meat"),
                                        (10, "chicken")];

pub struct KitchenStubs;

impl KitchenStubs {
    /// Los diez ingredientes de la cocina de ejemplo con `stock` unidades cada uno.
    pub fn sample_ingredients(stock: i64) -> Result<Vec<Ingredient>, DomainError> {
        INGREDIENTS.iter()
                   .map(|&(id, name)| Ingredient::from_parts(id, name, stock))
                   .collect()
    }

    /// Las seis recetas fijas (ids 1..=6) entre las que se elige al azar.
    pub fn sample_recipes() -> Result<Vec<Recipe>, DomainError> {
        Ok(vec![Recipe::new(1, "Caesar Salad", &[(6, 2), (8, 1), (2, 1), (10, 1)])?,
                Recipe::new(2, "Chicken Rice", &[(4, 2), (10, 1), (7, 1), (1, 1)])?,
                Recipe::new(3, "Cheese Fries", &[(3, 3), (8, 2), (5, 1)])?,
                Recipe::new(4, "Burger", &[(9, 1), (8, 1), (6, 1), (1, 1), (7, 1), (5, 1)])?,
                Recipe::new(5, "Tomato Salad", &[(1, 2), (7, 1), (2, 1), (6, 1)])?,
                Recipe::new(6, "Grilled Meat with Potatoes", &[(9, 2), (3, 2), (2, 1)])?])
    }

    /// Carga ingredientes y recetas de ejemplo en cualquier repositorio.
    pub fn seed<R>(repo: &R) -> Result<(), DomainError>
        where R: InventoryStore + RecipeCatalog + ?Sized
    {
        for ingredient in Self::sample_ingredients(SAMPLE_STOCK)? {
            repo.save_ingredient(ingredient)?;
        }
        for recipe in Self::sample_recipes()? {
            repo.save_recipe(recipe)?;
        }
        Ok(())
    }

    /// Crea un repositorio en memoria pre-populado con la cocina de ejemplo.
    pub fn sample_repo() -> Result<InMemoryKitchenRepository, DomainError> {
        let repo = InMemoryKitchenRepository::new();
        Self::seed(&repo)?;
        Ok(repo)
    }
}
