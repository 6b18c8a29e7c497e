use crate::schema;
use crate::schema::ingredients::dsl as ing_dsl;
use crate::schema::orders::dsl as ord_dsl;
use crate::schema::recipe_requirements::dsl as req_dsl;
use crate::schema::recipes::dsl as rec_dsl;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use kitchen_domain::{DeductOutcome, DomainError, Ingredient, InventoryStore, Order, OrderLedger, OrderStatus, Recipe,
                     RecipeCatalog, RecipeRequirement, ReservationLedger};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "pg")]
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations/postgres");
#[cfg(not(feature = "pg"))]
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations/sqlite");
#[cfg(feature = "pg")]
type DbConn = PgConnection;
#[cfg(not(feature = "pg"))]
type DbConn = SqliteConnection;
type DbPool = Pool<ConnectionManager<DbConn>>;

const POOL_SIZE: u32 = 4;

/// Pragmas por conexión: sin ellos cada conexión del pool usaría el modo de
/// journal y el timeout por defecto.
#[cfg(not(feature = "pg"))]
#[derive(Debug)]
struct SqlitePragmas;

#[cfg(not(feature = "pg"))]
impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
    use diesel::connection::SimpleConnection;
    conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        .map_err(diesel::r2d2::Error::QueryError)
  }
}

/// Transacción de escritura. En SQLite se toma el lock de escritura al
/// comenzar (`BEGIN IMMEDIATE`) para que dos reservas no se crucen.
#[cfg(not(feature = "pg"))]
fn write_transaction<T, E, F>(conn: &mut DbConn, f: F) -> Result<T, E>
  where F: FnOnce(&mut DbConn) -> Result<T, E>,
        E: From<DieselError>
{
  conn.immediate_transaction(f)
}

#[cfg(feature = "pg")]
fn write_transaction<T, E, F>(conn: &mut DbConn, f: F) -> Result<T, E>
  where F: FnOnce(&mut DbConn) -> Result<T, E>,
        E: From<DieselError>
{
  conn.transaction(f)
}

/// Repo Diesel que implementa `InventoryStore`, `RecipeCatalog` y
/// `OrderLedger` sobre un pool r2d2.
#[derive(Clone)]
pub struct DieselKitchenRepository {
  pool: Arc<DbPool>,
}

impl DieselKitchenRepository {
  /// Construye el pool y aplica las migraciones embebidas.
  pub fn new(database_url: &str) -> Result<Self, DomainError> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let builder = Pool::builder().max_size(POOL_SIZE);
    #[cfg(not(feature = "pg"))]
    let builder = builder.connection_customizer(Box::new(SqlitePragmas));
    let pool = builder.build(manager)
                      .map_err(|e| DomainError::StoreUnavailable(format!("no se pudo crear el pool de conexiones: {}", e)))?;
    let repo = DieselKitchenRepository { pool: Arc::new(pool) };
    let mut c = repo.conn()?;
    let applied = c.run_pending_migrations(MIGRATIONS)
                   .map_err(|e| DomainError::StoreUnavailable(format!("migraciones: {}", e)))?;
    if !applied.is_empty() {
      info!("kitchen-persistence: {} migraciones aplicadas", applied.len());
    }
    Ok(repo)
  }

  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>, DomainError> {
    self.pool.get().map_err(|e: r2d2::Error| DomainError::StoreUnavailable(format!("pool: {}", e)))
  }
}

// Diesel row structs
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::ingredients)]
struct IngredientRow {
  pub id: i64,
  pub name: String,
  pub stock: i64,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::recipes)]
struct RecipeRow {
  pub id: i64,
  pub name: String,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::recipe_requirements)]
struct RequirementRow {
  pub recipe_id: i64,
  pub position: i64,
  pub ingredient_id: i64,
  pub quantity: i64,
}

#[derive(Debug, Queryable)]
struct OrderRow {
  pub id: i64,
  pub recipe_id: i64,
  pub status: i32,
  pub last_updated_ts: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::orders)]
struct NewOrderRow {
  pub recipe_id: i64,
  pub status: i32,
  pub last_updated_ts: i64,
}

impl IngredientRow {
  fn into_domain(self) -> Result<Ingredient, DomainError> {
    Ingredient::from_parts(self.id, &self.name, self.stock)
  }
}

impl OrderRow {
  fn into_domain(self) -> Result<Order, DomainError> {
    let status = OrderStatus::from_code(self.status)?;
    let last_updated = DateTime::<Utc>::from_timestamp_millis(self.last_updated_ts).ok_or_else(|| {
                         DomainError::ValidationError(format!("timestamp inválido en la orden {}: {}",
                                                              self.id, self.last_updated_ts))
                       })?;
    Ok(Order::from_parts(self.id, self.recipe_id, status, last_updated))
  }
}

fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T, DomainError> {
  res.map_err(|e| DomainError::StoreUnavailable(format!("db: {}", e)))
}

/// Motivos para abortar (y revertir) la transacción de descuento.
enum DeductAbort {
  Short(DeductOutcome),
  Missing(i64),
  Ledger(DomainError),
  Db(DieselError),
}

impl From<DieselError> for DeductAbort {
  fn from(e: DieselError) -> Self {
    DeductAbort::Db(e)
  }
}

impl DeductAbort {
  /// Error de dominio para todo lo que no es un faltante de stock.
  fn into_domain(self, recipe_id: i64) -> DomainError {
    match self {
      DeductAbort::Short(outcome) => {
        DomainError::ValidationError(format!("faltante no esperado en la receta {}: {:?}", recipe_id, outcome))
      }
      DeductAbort::Missing(ingredient_id) => {
        warn!("receta {} referencia el ingrediente inexistente {}", recipe_id, ingredient_id);
        DomainError::ReferenceError(format!("ingrediente {} (receta {})", ingredient_id, recipe_id))
      }
      DeductAbort::Ledger(e) => e,
      DeductAbort::Db(e) => DomainError::StoreUnavailable(format!("db: {}", e)),
    }
  }
}

/// Descuentos condicionales dentro de una transacción ya abierta. Las claves
/// del BTreeMap salen ascendentes: todas las reservas bloquean filas en el
/// mismo orden. Cualquier `Err` debe revertir la transacción.
fn deduct_in_tx(conn: &mut DbConn, needed: &BTreeMap<i64, i64>) -> Result<(), DeductAbort> {
  for (&ingredient_id, &required) in needed.iter() {
    let updated = diesel::update(ing_dsl::ingredients.filter(ing_dsl::id.eq(ingredient_id))
                                                     .filter(ing_dsl::stock.ge(required)))
                  .set(ing_dsl::stock.eq(ing_dsl::stock - required))
                  .execute(conn)?;
    if updated == 0 {
      let available = ing_dsl::ingredients.find(ingredient_id)
                                          .select(ing_dsl::stock)
                                          .first::<i64>(conn)
                                          .optional()?;
      return Err(match available {
                   Some(available) => DeductAbort::Short(DeductOutcome::Shortfall { ingredient_id, required, available }),
                   None => DeductAbort::Missing(ingredient_id),
                 });
    }
  }
  Ok(())
}

/// Como `deduct_in_tx` pero dentro de un savepoint: un faltante revierte
/// sólo los descuentos y deja seguir a la transacción exterior.
fn deduct_in_savepoint(conn: &mut DbConn, needed: &BTreeMap<i64, i64>) -> Result<DeductOutcome, DeductAbort> {
  match conn.transaction(|sp| deduct_in_tx(sp, needed)) {
    Ok(()) => Ok(DeductOutcome::Applied),
    Err(DeductAbort::Short(outcome)) => Ok(outcome),
    Err(other) => Err(other),
  }
}

fn insert_order(conn: &mut DbConn, recipe_id: i64, status: OrderStatus, at: DateTime<Utc>) -> QueryResult<OrderRow> {
  let row = NewOrderRow { recipe_id, status: status.code(), last_updated_ts: at.timestamp_millis() };
  let id = diesel::insert_into(ord_dsl::orders).values(&row)
                                               .returning(ord_dsl::id)
                                               .get_result::<i64>(conn)?;
  Ok(OrderRow { id, recipe_id, status: row.status, last_updated_ts: row.last_updated_ts })
}

/// Error de una transición de orden dentro de una transacción.
enum TransitionAbort {
  Domain(DomainError),
  Db(DieselError),
}

impl From<DieselError> for TransitionAbort {
  fn from(e: DieselError) -> Self {
    TransitionAbort::Db(e)
  }
}

impl From<TransitionAbort> for DomainError {
  fn from(e: TransitionAbort) -> Self {
    match e {
      TransitionAbort::Domain(d) => d,
      TransitionAbort::Db(e) => DomainError::StoreUnavailable(format!("db: {}", e)),
    }
  }
}

impl InventoryStore for DieselKitchenRepository {
  fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>, DomainError> {
    let mut conn = self.conn()?;
    let row = map_db_err(ing_dsl::ingredients.find(id).first::<IngredientRow>(&mut conn).optional())?;
    row.map(IngredientRow::into_domain).transpose()
  }

  fn list_ingredients(&self) -> Result<Vec<Ingredient>, DomainError> {
    let mut conn = self.conn()?;
    let rows = map_db_err(ing_dsl::ingredients.order(ing_dsl::id.asc()).load::<IngredientRow>(&mut conn))?;
    rows.into_iter().map(IngredientRow::into_domain).collect()
  }

  fn save_ingredient(&self, ingredient: Ingredient) -> Result<i64, DomainError> {
    let mut conn = self.conn()?;
    let row = IngredientRow { id: ingredient.id(), name: ingredient.name().to_string(), stock: ingredient.stock() };
    map_db_err(diesel::insert_into(ing_dsl::ingredients).values(&row)
                                                         .on_conflict(ing_dsl::id)
                                                         .do_update()
                                                         .set((ing_dsl::name.eq(&row.name), ing_dsl::stock.eq(row.stock)))
                                                         .execute(&mut conn))?;
    Ok(row.id)
  }

  fn try_deduct(&self, recipe: &Recipe) -> Result<DeductOutcome, DomainError> {
    let needed = recipe.aggregated_requirements();
    let mut conn = self.conn()?;
    match write_transaction(&mut conn, |conn| deduct_in_tx(conn, &needed)) {
      Ok(()) => Ok(DeductOutcome::Applied),
      Err(DeductAbort::Short(outcome)) => {
        debug!("receta {}: stock insuficiente ({:?})", recipe.id(), outcome);
        Ok(outcome)
      }
      Err(other) => Err(other.into_domain(recipe.id())),
    }
  }

  fn restock(&self, ingredient_id: i64, quantity: i64) -> Result<Ingredient, DomainError> {
    if quantity <= 0 {
      return Err(DomainError::ValidationError(format!("Cantidad de reabastecimiento no positiva: {}", quantity)));
    }
    let mut conn = self.conn()?;
    let row = write_transaction(&mut conn, |conn| -> Result<IngredientRow, TransitionAbort> {
      let updated = diesel::update(ing_dsl::ingredients.find(ingredient_id)
                                                       .filter(ing_dsl::stock.le(i64::MAX - quantity)))
                    .set(ing_dsl::stock.eq(ing_dsl::stock + quantity))
                    .execute(conn)?;
      let current = ing_dsl::ingredients.find(ingredient_id).first::<IngredientRow>(conn).optional()?;
      match (updated, current) {
        (_, None) => Err(TransitionAbort::Domain(DomainError::ReferenceError(format!("ingrediente {}", ingredient_id)))),
        (0, Some(_)) => Err(TransitionAbort::Domain(DomainError::ValidationError("Desbordamiento de stock".to_string()))),
        (_, Some(row)) => Ok(row),
      }
    }).map_err(DomainError::from)?;
    row.into_domain()
  }
}

impl RecipeCatalog for DieselKitchenRepository {
  fn get_recipe(&self, id: i64) -> Result<Option<Recipe>, DomainError> {
    let mut conn = self.conn()?;
    let opt = map_db_err(rec_dsl::recipes.find(id).first::<RecipeRow>(&mut conn).optional())?;
    let r = match opt {
      Some(r) => r,
      None => return Ok(None),
    };
    let rows = map_db_err(req_dsl::recipe_requirements.filter(req_dsl::recipe_id.eq(id))
                                                      .order(req_dsl::position.asc())
                                                      .load::<RequirementRow>(&mut conn))?;
    let requirements = rows.into_iter()
                           .map(|q| RecipeRequirement { recipe_id: q.recipe_id,
                                                        ingredient_id: q.ingredient_id,
                                                        quantity: q.quantity })
                           .collect();
    Ok(Some(Recipe::from_parts(r.id, &r.name, requirements)?))
  }

  fn list_recipe_ids(&self) -> Result<Vec<i64>, DomainError> {
    let mut conn = self.conn()?;
    map_db_err(rec_dsl::recipes.select(rec_dsl::id).order(rec_dsl::id.asc()).load::<i64>(&mut conn))
  }

  fn save_recipe(&self, recipe: Recipe) -> Result<i64, DomainError> {
    let mut conn = self.conn()?;
    let row = RecipeRow { id: recipe.id(), name: recipe.name().to_string() };
    let reqs: Vec<RequirementRow> = recipe.requirements()
                                          .iter()
                                          .enumerate()
                                          .map(|(pos, q)| RequirementRow { recipe_id: q.recipe_id,
                                                                           position: pos as i64,
                                                                           ingredient_id: q.ingredient_id,
                                                                           quantity: q.quantity })
                                          .collect();
    map_db_err(write_transaction(&mut conn, |conn| {
                 diesel::insert_into(rec_dsl::recipes).values(&row)
                                                      .on_conflict(rec_dsl::id)
                                                      .do_update()
                                                      .set(rec_dsl::name.eq(&row.name))
                                                      .execute(conn)?;
                 diesel::delete(req_dsl::recipe_requirements.filter(req_dsl::recipe_id.eq(row.id))).execute(conn)?;
                 diesel::insert_into(req_dsl::recipe_requirements).values(&reqs).execute(conn)?;
                 Ok(())
               }))?;
    Ok(row.id)
  }
}

impl DieselKitchenRepository {
  /// Aplica una transición sobre una orden que todavía está en cola. El
  /// filtro por estado hace que la transición sea condicional en la BD.
  fn transition_queued(&self, id: i64, to: OrderStatus, at: DateTime<Utc>) -> Result<Order, DomainError> {
    let mut conn = self.conn()?;
    let queued = OrderStatus::Queued.code();
    let row = write_transaction(&mut conn, |conn| {
      let updated = diesel::update(ord_dsl::orders.filter(ord_dsl::id.eq(id)).filter(ord_dsl::status.eq(queued)))
                    .set((ord_dsl::status.eq(to.code()), ord_dsl::last_updated_ts.eq(at.timestamp_millis())))
                    .execute(conn)?;
      let current = ord_dsl::orders.find(id).first::<OrderRow>(conn).optional()?;
      match (updated, current) {
        (_, None) => Err(TransitionAbort::Domain(DomainError::ReferenceError(format!("orden {}", id)))),
        (0, Some(_)) => Err(TransitionAbort::Domain(DomainError::InvalidTransition(format!("la orden {} no está en cola",
                                                                                           id)))),
        (_, Some(row)) => Ok(row),
      }
    }).map_err(DomainError::from)?;
    row.into_domain()
  }
}

impl OrderLedger for DieselKitchenRepository {
  fn create_order(&self, recipe_id: i64, status: OrderStatus, at: DateTime<Utc>) -> Result<Order, DomainError> {
    let mut conn = self.conn()?;
    map_db_err(insert_order(&mut conn, recipe_id, status, at))?.into_domain()
  }

  fn get_order(&self, id: i64) -> Result<Option<Order>, DomainError> {
    let mut conn = self.conn()?;
    let row = map_db_err(ord_dsl::orders.find(id).first::<OrderRow>(&mut conn).optional())?;
    row.map(OrderRow::into_domain).transpose()
  }

  fn list_queued(&self) -> Result<Vec<Order>, DomainError> {
    let mut conn = self.conn()?;
    let rows = map_db_err(ord_dsl::orders.filter(ord_dsl::status.eq(OrderStatus::Queued.code()))
                                         .order(ord_dsl::id.asc())
                                         .load::<OrderRow>(&mut conn))?;
    rows.into_iter().map(OrderRow::into_domain).collect()
  }

  fn mark_ready(&self, id: i64, at: DateTime<Utc>) -> Result<Order, DomainError> {
    self.transition_queued(id, OrderStatus::Ready, at)
  }

  fn refresh_queued(&self, id: i64, at: DateTime<Utc>) -> Result<Order, DomainError> {
    self.transition_queued(id, OrderStatus::Queued, at)
  }

  fn latest_orders(&self, limit: usize) -> Result<Vec<Order>, DomainError> {
    let mut conn = self.conn()?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = map_db_err(ord_dsl::orders.order(ord_dsl::id.desc()).limit(limit).load::<OrderRow>(&mut conn))?;
    rows.into_iter().map(OrderRow::into_domain).collect()
  }

  fn count_orders(&self) -> Result<i64, DomainError> {
    let mut conn = self.conn()?;
    map_db_err(ord_dsl::orders.count().get_result::<i64>(&mut conn))
  }
}

impl ReservationLedger for DieselKitchenRepository {
  fn reserve_and_record(&self, recipe: &Recipe, at: DateTime<Utc>) -> Result<(DeductOutcome, Order), DomainError> {
    let needed = recipe.aggregated_requirements();
    let mut conn = self.conn()?;
    let (outcome, row) = write_transaction(&mut conn, |conn| -> Result<(DeductOutcome, OrderRow), DeductAbort> {
                           let outcome = deduct_in_savepoint(conn, &needed)?;
                           let status = match outcome {
                             DeductOutcome::Applied => OrderStatus::Ready,
                             DeductOutcome::Shortfall { .. } => OrderStatus::Queued,
                           };
                           Ok((outcome, insert_order(conn, recipe.id(), status, at)?))
                         }).map_err(|e: DeductAbort| e.into_domain(recipe.id()))?;
    debug!("receta {}: orden {} registrada ({:?})", recipe.id(), row.id, outcome);
    Ok((outcome, row.into_domain()?))
  }

  fn reserve_and_promote(&self,
                         order_id: i64,
                         recipe: &Recipe,
                         at: DateTime<Utc>)
                         -> Result<(DeductOutcome, Order), DomainError> {
    let needed = recipe.aggregated_requirements();
    let queued = OrderStatus::Queued.code();
    let mut conn = self.conn()?;
    let (outcome, row) = write_transaction(&mut conn, |conn| -> Result<(DeductOutcome, OrderRow), DeductAbort> {
      let outcome = deduct_in_savepoint(conn, &needed)?;
      let to = match outcome {
        DeductOutcome::Applied => OrderStatus::Ready,
        DeductOutcome::Shortfall { .. } => OrderStatus::Queued,
      };
      // La orden se actualiza después del descuento: si no está en cola
      // (o no es de esta receta) se revierte todo, descuento incluido.
      let updated = diesel::update(ord_dsl::orders.filter(ord_dsl::id.eq(order_id))
                                                  .filter(ord_dsl::status.eq(queued))
                                                  .filter(ord_dsl::recipe_id.eq(recipe.id())))
                    .set((ord_dsl::status.eq(to.code()), ord_dsl::last_updated_ts.eq(at.timestamp_millis())))
                    .execute(conn)?;
      let current = ord_dsl::orders.find(order_id).first::<OrderRow>(conn).optional()?;
      match (updated, current) {
        (_, None) => Err(DeductAbort::Ledger(DomainError::ReferenceError(format!("orden {}", order_id)))),
        (0, Some(row)) if row.status != queued => {
          Err(DeductAbort::Ledger(DomainError::InvalidTransition(format!("la orden {} no está en cola", order_id))))
        }
        (0, Some(row)) => Err(DeductAbort::Ledger(DomainError::ValidationError(format!(
          "la orden {} es de la receta {}, no de la {}",
          order_id,
          row.recipe_id,
          recipe.id()
        )))),
        (_, Some(row)) => Ok((outcome, row)),
      }
    }).map_err(|e: DeductAbort| e.into_domain(recipe.id()))?;
    Ok((outcome, row.into_domain()?))
  }
}

fn env_url() -> Option<String> {
  std::env::var("KITCHEN_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                 .ok()
                                 .filter(|u| !u.trim().is_empty())
}

/// URL compuesta a partir de `DB_HOST`, `DB_USER`, `DB_PASSWORD` y
/// `DB_NAME`. `None` si no hay `DB_HOST`.
fn composed_pg_url() -> Result<Option<String>, DomainError> {
  let host = match std::env::var("DB_HOST") {
    Ok(h) if !h.trim().is_empty() => h,
    _ => return Ok(None),
  };
  let user = std::env::var("DB_USER").map_err(|_| DomainError::Configuration("DB_HOST sin DB_USER".into()))?;
  let name = std::env::var("DB_NAME").map_err(|_| DomainError::Configuration("DB_HOST sin DB_NAME".into()))?;
  let url = match std::env::var("DB_PASSWORD") {
    Ok(p) if !p.is_empty() => format!("postgres://{}:{}@{}/{}", user, p, host, name),
    _ => format!("postgres://{}@{}/{}", user, host, name),
  };
  Ok(Some(url))
}

fn looks_like_postgres(url: &str) -> bool {
  let l = url.to_lowercase();
  l.starts_with("postgres://") || l.starts_with("postgresql://")
}

/// Resuelve la URL de la base de datos desde el entorno.
///
/// Orden: `KITCHEN_DB_URL`, `DATABASE_URL`, variables `DB_*`. Sin `pg` se
/// usa el fichero SQLite `kitchen.db` si no hay nada configurado.
#[cfg(feature = "pg")]
pub fn database_url_from_env() -> Result<String, DomainError> {
  dotenvy::dotenv().ok();
  let url = match env_url() {
    Some(u) => u,
    None => composed_pg_url()?.ok_or_else(|| {
                                 DomainError::Configuration("KITCHEN_DB_URL / DATABASE_URL / DB_HOST not set".into())
                               })?,
  };
  if !looks_like_postgres(&url) {
    return Err(DomainError::Configuration("KITCHEN_DB_URL / DATABASE_URL does not look like Postgres URL".into()));
  }
  Ok(url)
}

#[cfg(not(feature = "pg"))]
pub fn database_url_from_env() -> Result<String, DomainError> {
  dotenvy::dotenv().ok();
  let url = match env_url() {
    Some(u) => u,
    None => match composed_pg_url()? {
      Some(u) => u,
      None => "kitchen.db".to_string(),
    },
  };
  if looks_like_postgres(&url) {
    return Err(DomainError::Configuration("kitchen-persistence was compiled without 'pg' feature; enable the 'pg' \
                                           feature to use Postgres"
                                                                   .into()));
  }
  Ok(url)
}

/// Crear repo desde las variables de entorno.
pub fn new_from_env() -> Result<DieselKitchenRepository, DomainError> {
  let url = database_url_from_env()?;
  DieselKitchenRepository::new(&url)
}
