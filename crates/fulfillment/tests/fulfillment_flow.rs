use chrono::{Duration, TimeZone, Utc};
use fulfillment::{FulfillmentService, ManualClock, OrderResult, QueueReconciler, RandomPicker, ReconcilerConfig,
                  ReservationEngine, ReservationOutcome};
use kitchen_domain::{Ingredient, InMemoryKitchenRepository, InventoryStore, KitchenStubs, OrderLedger, OrderStatus,
                     Recipe, RecipeCatalog};
use std::sync::Arc;
use std::thread;

fn flour_kitchen(stock: i64) -> Arc<InMemoryKitchenRepository> {
  let repo = Arc::new(InMemoryKitchenRepository::new());
  repo.save_ingredient(Ingredient::from_parts(1, "flour", stock).unwrap()).unwrap();
  repo.save_recipe(Recipe::new(1, "bread", &[(1, 2)]).unwrap()).unwrap();
  repo
}

#[test]
fn flour_scenario() {
  let repo = flour_kitchen(2);
  let engine = ReservationEngine::new(repo.clone());
  assert_eq!(engine.try_reserve(1).unwrap(), ReservationOutcome::Reserved);
  assert_eq!(repo.get_ingredient(1).unwrap().unwrap().stock(), 0);
  assert_eq!(engine.try_reserve(1).unwrap(), ReservationOutcome::Insufficient);
  assert_eq!(repo.get_ingredient(1).unwrap().unwrap().stock(), 0);
}

#[test]
fn every_fulfill_records_one_order() {
  let repo = Arc::new(KitchenStubs::sample_repo().unwrap());
  let service = FulfillmentService::new(repo.clone());
  let mut prepared = 0;
  for _ in 0..25 {
    if service.fulfill().unwrap().is_prepared() {
      prepared += 1;
    }
  }
  assert_eq!(repo.count_orders().unwrap(), 25);
  let latest = service.latest_orders(100).unwrap();
  assert_eq!(latest.len(), 25);
  assert_eq!(latest.iter().filter(|o| o.status() == OrderStatus::Ready).count(), prepared);
  assert_eq!(service.queued_recipe_ids().unwrap().len(), 25 - prepared);
  assert!(service.inventory().unwrap().iter().all(|i| i.stock() >= 0));
}

#[test]
fn latest_orders_is_newest_first_and_capped() {
  let repo = Arc::new(KitchenStubs::sample_repo().unwrap());
  let service = FulfillmentService::new(repo);
  for _ in 0..12 {
    service.fulfill().unwrap();
  }
  let latest = service.latest_orders(10).unwrap();
  assert_eq!(latest.len(), 10);
  assert_eq!(latest[0].id(), 12);
  assert_eq!(latest[9].id(), 3);
}

#[test]
fn concurrent_fulfill_never_overcommits() {
  // Alcanza para exactamente una receta.
  let repo = flour_kitchen(2);
  let service = Arc::new(FulfillmentService::new(repo.clone()));
  let handles: Vec<_> = (0..8).map(|_| {
                                let service = service.clone();
                                thread::spawn(move || service.fulfill_recipe(1).unwrap())
                              })
                              .collect();
  let results: Vec<OrderResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();
  assert_eq!(results.iter().filter(|r| r.is_prepared()).count(), 1);
  assert_eq!(repo.get_ingredient(1).unwrap().unwrap().stock(), 0);
  assert_eq!(repo.count_orders().unwrap(), 8);
  assert_eq!(repo.list_queued().unwrap().len(), 7);
}

#[test]
fn promotion_happens_on_next_cycle_with_cycle_timestamp() {
  let repo = flour_kitchen(0);
  let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
  let clock = Arc::new(ManualClock::new(t0));
  let service = FulfillmentService::with_parts(repo.clone(), Arc::new(RandomPicker), clock.clone());
  let reconciler = QueueReconciler::for_service(&service, ReconcilerConfig::default());

  let queued = service.fulfill_recipe(1).unwrap();
  assert!(!queued.is_prepared());
  assert_eq!(queued.message(), "insufficient ingredients");
  let order_id = queued.order().id();

  // Ciclo sin stock: sigue en cola, sólo se refresca el timestamp.
  let t_empty = clock.advance(Duration::seconds(5));
  let report = reconciler.run_cycle().unwrap();
  assert_eq!((report.scanned, report.promoted, report.requeued), (1, 0, 1));
  let still = repo.get_order(order_id).unwrap().unwrap();
  assert!(still.is_queued());
  assert_eq!(still.last_updated(), t_empty);

  // Reposición en t1: la orden no cambia hasta el próximo ciclo.
  clock.advance(Duration::seconds(1));
  service.restock(1, 2).unwrap();
  assert!(repo.get_order(order_id).unwrap().unwrap().is_queued());
  assert!(service.queue_preview().unwrap()[0].ready_to_cook);

  let t2 = clock.advance(Duration::seconds(4));
  let report = reconciler.run_cycle().unwrap();
  assert_eq!(report.promoted, 1);
  let ready = repo.get_order(order_id).unwrap().unwrap();
  assert_eq!(ready.status(), OrderStatus::Ready);
  assert_eq!(ready.last_updated(), t2);
  assert_eq!(repo.get_ingredient(1).unwrap().unwrap().stock(), 0);
  assert!(service.queued_recipe_ids().unwrap().is_empty());
}

#[test]
fn cycle_isolates_broken_orders() {
  let repo = flour_kitchen(4);
  // Orden con receta inexistente: cuenta como insuficiente, no bloquea a las demás.
  repo.create_order(99, OrderStatus::Queued, Utc::now()).unwrap();
  repo.create_order(1, OrderStatus::Queued, Utc::now()).unwrap();
  repo.create_order(1, OrderStatus::Queued, Utc::now()).unwrap();
  let service = FulfillmentService::new(repo.clone());
  let reconciler = QueueReconciler::for_service(&service, ReconcilerConfig::default());
  let report = reconciler.run_cycle().unwrap();
  assert_eq!(report.scanned, 3);
  assert_eq!(report.promoted, 2);
  assert_eq!(report.requeued, 1);
  assert_eq!(report.failed, 0);
  assert_eq!(service.queued_recipe_ids().unwrap(), vec![99]);
}

#[test]
fn queued_orders_promote_in_id_order() {
  let repo = flour_kitchen(0);
  let service = FulfillmentService::new(repo.clone());
  let first = service.fulfill_recipe(1).unwrap().order().id();
  let second = service.fulfill_recipe(1).unwrap().order().id();
  service.restock(1, 2).unwrap();
  let reconciler = QueueReconciler::for_service(&service, ReconcilerConfig::default());
  reconciler.run_cycle().unwrap();
  assert_eq!(repo.get_order(first).unwrap().unwrap().status(), OrderStatus::Ready);
  assert_eq!(repo.get_order(second).unwrap().unwrap().status(), OrderStatus::Queued);
}

#[test]
fn evaluator_is_idempotent() {
  let repo = Arc::new(KitchenStubs::sample_repo().unwrap());
  let service = FulfillmentService::new(repo);
  for recipe_id in 1..=6 {
    let first = service.is_available(recipe_id);
    for _ in 0..5 {
      assert_eq!(service.is_available(recipe_id), first);
    }
  }
  assert!(!service.is_available(404));
}

#[test]
fn restock_rejects_bad_input() {
  let repo = flour_kitchen(0);
  let service = FulfillmentService::new(repo);
  assert!(service.restock(1, 0).is_err());
  assert!(service.restock(42, 3).is_err());
  assert_eq!(service.restock(1, 3).unwrap().stock(), 3);
}
