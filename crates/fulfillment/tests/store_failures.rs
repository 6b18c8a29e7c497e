use chrono::{DateTime, Utc};
use fulfillment::{FulfillmentService, QueueReconciler, ReconcilerConfig};
use kitchen_domain::{DeductOutcome, DomainError, InMemoryKitchenRepository, Ingredient, InventoryStore, Order,
                     OrderLedger, OrderStatus, Recipe, RecipeCatalog, ReservationLedger};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cocina en memoria con fallos de almacén programables.
#[derive(Default)]
struct FlakyKitchen {
  inner: InMemoryKitchenRepository,
  /// `list_queued` falla mientras sea > 0.
  failing_reads: AtomicUsize,
  list_calls: AtomicUsize,
  /// `reserve_and_promote` falla mientras sea > 0.
  failing_promotions: AtomicUsize,
  /// `reserve_and_record` falla mientras sea > 0.
  failing_records: AtomicUsize,
  /// Orden cuya reserva y refresco siempre fallan (0 = ninguna).
  broken_order: AtomicI64,
}

fn consume(counter: &AtomicUsize) -> bool {
  counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

fn unavailable(what: &str) -> DomainError {
  DomainError::StoreUnavailable(format!("{} no disponible", what))
}

impl FlakyKitchen {
  fn with_flour(stock: i64) -> Arc<Self> {
    let kitchen = FlakyKitchen::default();
    kitchen.inner.save_ingredient(Ingredient::from_parts(1, "flour", stock).unwrap()).unwrap();
    kitchen.inner.save_recipe(Recipe::new(1, "bread", &[(1, 2)]).unwrap()).unwrap();
    Arc::new(kitchen)
  }

  fn flour(&self) -> i64 {
    self.inner.get_ingredient(1).unwrap().unwrap().stock()
  }

  fn is_broken(&self, order_id: i64) -> bool {
    self.broken_order.load(Ordering::SeqCst) == order_id
  }
}

impl InventoryStore for FlakyKitchen {
  fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>, DomainError> {
    self.inner.get_ingredient(id)
  }

  fn list_ingredients(&self) -> Result<Vec<Ingredient>, DomainError> {
    self.inner.list_ingredients()
  }

  fn save_ingredient(&self, ingredient: Ingredient) -> Result<i64, DomainError> {
    self.inner.save_ingredient(ingredient)
  }

  fn try_deduct(&self, recipe: &Recipe) -> Result<DeductOutcome, DomainError> {
    self.inner.try_deduct(recipe)
  }

  fn restock(&self, ingredient_id: i64, quantity: i64) -> Result<Ingredient, DomainError> {
    self.inner.restock(ingredient_id, quantity)
  }
}

impl RecipeCatalog for FlakyKitchen {
  fn get_recipe(&self, id: i64) -> Result<Option<Recipe>, DomainError> {
    self.inner.get_recipe(id)
  }

  fn list_recipe_ids(&self) -> Result<Vec<i64>, DomainError> {
    self.inner.list_recipe_ids()
  }

  fn save_recipe(&self, recipe: Recipe) -> Result<i64, DomainError> {
    self.inner.save_recipe(recipe)
  }
}

impl OrderLedger for FlakyKitchen {
  fn create_order(&self, recipe_id: i64, status: OrderStatus, at: DateTime<Utc>) -> Result<Order, DomainError> {
    self.inner.create_order(recipe_id, status, at)
  }

  fn get_order(&self, id: i64) -> Result<Option<Order>, DomainError> {
    self.inner.get_order(id)
  }

  fn list_queued(&self) -> Result<Vec<Order>, DomainError> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    if consume(&self.failing_reads) {
      return Err(unavailable("cola"));
    }
    self.inner.list_queued()
  }

  fn mark_ready(&self, id: i64, at: DateTime<Utc>) -> Result<Order, DomainError> {
    self.inner.mark_ready(id, at)
  }

  fn refresh_queued(&self, id: i64, at: DateTime<Utc>) -> Result<Order, DomainError> {
    if self.is_broken(id) {
      return Err(unavailable("libro de órdenes"));
    }
    self.inner.refresh_queued(id, at)
  }

  fn latest_orders(&self, limit: usize) -> Result<Vec<Order>, DomainError> {
    self.inner.latest_orders(limit)
  }

  fn count_orders(&self) -> Result<i64, DomainError> {
    self.inner.count_orders()
  }
}

impl ReservationLedger for FlakyKitchen {
  fn reserve_and_record(&self, recipe: &Recipe, at: DateTime<Utc>) -> Result<(DeductOutcome, Order), DomainError> {
    if consume(&self.failing_records) {
      return Err(unavailable("libro de órdenes"));
    }
    self.inner.reserve_and_record(recipe, at)
  }

  fn reserve_and_promote(&self,
                         order_id: i64,
                         recipe: &Recipe,
                         at: DateTime<Utc>)
                         -> Result<(DeductOutcome, Order), DomainError> {
    if self.is_broken(order_id) || consume(&self.failing_promotions) {
      return Err(unavailable("libro de órdenes"));
    }
    self.inner.reserve_and_promote(order_id, recipe, at)
  }
}

#[test]
fn failed_promotion_does_not_consume_stock_twice() {
  let kitchen = FlakyKitchen::with_flour(0);
  let service = FulfillmentService::new(kitchen.clone());
  let reconciler = QueueReconciler::for_service(&service, ReconcilerConfig::default());
  let order_id = service.fulfill_recipe(1).unwrap().order().id();

  service.restock(1, 4).unwrap();
  kitchen.failing_promotions.store(1, Ordering::SeqCst);

  let first = reconciler.run_cycle().unwrap();
  assert_eq!((first.scanned, first.promoted, first.failed), (1, 0, 1));
  assert_eq!(kitchen.flour(), 4);
  assert!(kitchen.get_order(order_id).unwrap().unwrap().is_queued());

  let second = reconciler.run_cycle().unwrap();
  assert_eq!((second.scanned, second.promoted, second.failed), (1, 1, 0));
  assert_eq!(kitchen.flour(), 2);
  assert_eq!(kitchen.get_order(order_id).unwrap().unwrap().status(), OrderStatus::Ready);
}

#[test]
fn failed_order_write_leaves_no_trace() {
  let kitchen = FlakyKitchen::with_flour(2);
  let service = FulfillmentService::new(kitchen.clone());
  kitchen.failing_records.store(1, Ordering::SeqCst);

  let err = service.fulfill_recipe(1).unwrap_err();
  assert!(err.is_transient());
  assert_eq!(kitchen.flour(), 2);
  assert_eq!(kitchen.count_orders().unwrap(), 0);

  assert!(service.fulfill_recipe(1).unwrap().is_prepared());
  assert_eq!(kitchen.flour(), 0);
  assert_eq!(kitchen.count_orders().unwrap(), 1);
}

#[test]
fn one_broken_order_does_not_stop_the_scan() {
  let kitchen = FlakyKitchen::with_flour(6);
  let at = Utc::now();
  let first = kitchen.create_order(1, OrderStatus::Queued, at).unwrap();
  let broken = kitchen.create_order(1, OrderStatus::Queued, at).unwrap();
  let last = kitchen.create_order(1, OrderStatus::Queued, at).unwrap();
  kitchen.broken_order.store(broken.id(), Ordering::SeqCst);

  let service = FulfillmentService::new(kitchen.clone());
  let reconciler = QueueReconciler::for_service(&service, ReconcilerConfig::default());
  let report = reconciler.run_cycle().unwrap();
  assert_eq!(report.scanned, 3);
  assert_eq!(report.promoted, 2);
  assert_eq!(report.requeued, 0);
  assert_eq!(report.failed, 1);

  assert_eq!(kitchen.get_order(first.id()).unwrap().unwrap().status(), OrderStatus::Ready);
  assert!(kitchen.get_order(broken.id()).unwrap().unwrap().is_queued());
  assert_eq!(kitchen.get_order(last.id()).unwrap().unwrap().status(), OrderStatus::Ready);
  assert_eq!(kitchen.flour(), 2);
}

#[test]
fn unreadable_queue_fails_the_cycle_only() {
  let kitchen = FlakyKitchen::with_flour(2);
  kitchen.create_order(1, OrderStatus::Queued, Utc::now()).unwrap();
  kitchen.failing_reads.store(1, Ordering::SeqCst);
  let service = FulfillmentService::new(kitchen.clone());
  let reconciler = QueueReconciler::for_service(&service, ReconcilerConfig::default());

  assert!(matches!(reconciler.run_cycle(), Err(DomainError::StoreUnavailable(_))));
  assert_eq!(kitchen.flour(), 2);
  assert_eq!(reconciler.run_cycle().unwrap().promoted, 1);
}

#[tokio::test]
async fn loop_keeps_running_after_queue_read_failures() {
  let kitchen = FlakyKitchen::with_flour(2);
  let order = kitchen.create_order(1, OrderStatus::Queued, Utc::now()).unwrap();
  kitchen.failing_reads.store(2, Ordering::SeqCst);

  let service = FulfillmentService::new(kitchen.clone());
  let config = ReconcilerConfig { interval: Duration::from_millis(20) };
  let reconciler = Arc::new(QueueReconciler::for_service(&service, config));
  let shutdown = CancellationToken::new();
  let handle = reconciler.spawn(shutdown.clone());

  let mut promoted = false;
  for _ in 0..200 {
    if !kitchen.get_order(order.id()).unwrap().unwrap().is_queued() {
      promoted = true;
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  shutdown.cancel();
  tokio::time::timeout(Duration::from_secs(2), handle).await.expect("el bucle no se detuvo").unwrap();

  assert!(promoted);
  assert!(kitchen.list_calls.load(Ordering::SeqCst) >= 3);
  assert_eq!(kitchen.flour(), 0);
}
