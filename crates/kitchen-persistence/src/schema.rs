// Diesel schema común a SQLite y Postgres.
// Tablas: ingredients, recipes, recipe_requirements, orders
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    ingredients (id) {
        id -> BigInt,
        name -> Text,
        stock -> BigInt,
    }
}
diesel::table! {
    recipes (id) {
        id -> BigInt,
        name -> Text,
    }
}
diesel::table! {
    recipe_requirements (recipe_id, position) {
        recipe_id -> BigInt,
        position -> BigInt,
        ingredient_id -> BigInt,
        quantity -> BigInt,
    }
}
diesel::table! {
    orders (id) {
        id -> BigInt,
        recipe_id -> BigInt,
        status -> Integer,
        last_updated_ts -> BigInt,
    }
}
allow_tables_to_appear_in_same_query!(ingredients, recipes, recipe_requirements, orders);
