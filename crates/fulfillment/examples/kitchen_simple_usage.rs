use fulfillment::errors::KitchenError;
use fulfillment::{FulfillmentService, QueueReconciler, ReconcilerConfig};
use kitchen_domain::KitchenStubs;
use std::sync::Arc;

fn main() -> Result<(), KitchenError> {
    // Cocina de ejemplo en memoria (stock 5 por ingrediente)
    let repo = Arc::new(KitchenStubs::sample_repo()?);
    let service = FulfillmentService::new(repo);
    let reconciler = QueueReconciler::for_service(&service, ReconcilerConfig::default());

    // Pedir platos hasta que alguno quede en cola
    for i in 1..=15 {
        let result = service.fulfill()?;
        println!("pedido {}: {} [{}]", i, result.message(), result.order().status());
    }
    println!("en cola: {:?}\n", service.queued_recipe_ids()?);

    for dish in service.queue_preview()? {
        println!("orden {} receta {} lista={}", dish.order_id, dish.recipe_id, dish.ready_to_cook);
    }

    // Reponer todo y correr un ciclo a mano
    for ingredient in service.inventory()? {
        service.restock(ingredient.id(), 10)?;
    }
    let report = reconciler.run_cycle()?;
    println!("\nciclo: {:?}", report);
    println!("últimas órdenes: {:?}", service.latest_orders(5)?);
    Ok(())
}
