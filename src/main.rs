use anyhow::{anyhow, Context};
use fulfillment::{FulfillmentService, KitchenConfig, KitchenError, QueueReconciler};
use kitchen_domain::{KitchenRepository, KitchenStubs, RecipeCatalog};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cantidad de órdenes que muestra "Últimas órdenes".
const LATEST_ORDERS_LIMIT: usize = 10;

fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
                             .init();
}

/// Cocina: atiende pedidos desde un menú interactivo mientras el
/// reconciliador reintenta la cola en segundo plano.
///
/// Opciones soportadas:
/// 1) Generar plato (receta al azar)
/// 2) Platos en cola
/// 3) Vista previa de la cola
/// 4) Últimas órdenes
/// 5) Inventario
/// 6) Reponer ingrediente
/// 7) Salir
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = KitchenConfig::from_env().context("configuración inválida")?;
    // Aplica migraciones embebidas al abrir el pool.
    let repo = Arc::new(kitchen_persistence::new_from_env().context("no se pudo abrir el almacén de la cocina")?);
    if config.seed_sample_data && repo.list_recipe_ids()?.is_empty() {
        KitchenStubs::seed(repo.as_ref()).context("no se pudo cargar la cocina de ejemplo")?;
        info!("catálogo vacío: cocina de ejemplo cargada");
    }

    let service = Arc::new(FulfillmentService::new(repo));
    let reconciler = Arc::new(QueueReconciler::for_service(&service, config.reconciler));
    let shutdown = CancellationToken::new();
    let reconciler_handle = reconciler.spawn(shutdown.clone());

    // stdin bloquea: el menú vive en su propio hilo para que Ctrl+C no
    // quede esperando una línea.
    let (done_tx, done_rx) = oneshot::channel();
    let menu_service = service.clone();
    std::thread::spawn(move || {
        let _ = done_tx.send(run_menu(menu_service.as_ref()));
    });

    let menu_result = tokio::select! {
        res = done_rx => res.unwrap_or_else(|_| Err(anyhow!("el menú terminó inesperadamente"))),
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C recibido, deteniendo");
            Ok(())
        }
    };

    shutdown.cancel();
    reconciler_handle.await.context("el reconciliador terminó de forma anómala")?;
    menu_result
}

fn run_menu<R>(service: &FulfillmentService<R>) -> anyhow::Result<()>
    where R: KitchenRepository + ?Sized
{
    loop {
        println!("\n== Cocina ==");
        println!("1) Generar plato");
        println!("2) Platos en cola");
        println!("3) Vista previa de la cola");
        println!("4) Últimas órdenes");
        println!("5) Inventario");
        println!("6) Reponer ingrediente");
        println!("7) Salir");
        let Some(choice) = prompt("Elige una opción: ")? else {
            println!("Saliendo...");
            return Ok(());
        };
        match choice.as_str() {
            "1" => match service.fulfill() {
                Ok(result) => println!("{} (orden {})", result.message(), result.order().id()),
                Err(e) => report_error("Error generando plato", &e),
            },
            "2" => match service.queued_recipe_ids() {
                Ok(ids) if ids.is_empty() => println!("No hay platos en cola"),
                Ok(ids) => println!("Recetas en cola: {:?}", ids),
                Err(e) => report_error("Error leyendo la cola", &e),
            },
            "3" => match service.queue_preview() {
                Ok(rows) => {
                    println!("\nORDEN  | RECETA | LISTA PARA COCINAR");
                    println!("-----------------------------------");
                    for row in rows {
                        let ready = if row.ready_to_cook { "sí" } else { "no" };
                        println!("{:<6} | {:<6} | {}", row.order_id, row.recipe_id, ready);
                    }
                }
                Err(e) => report_error("Error leyendo la cola", &e),
            },
            "4" => match service.latest_orders(LATEST_ORDERS_LIMIT) {
                Ok(orders) => println!("{}", serde_json::to_string_pretty(&orders)?),
                Err(e) => report_error("Error listando órdenes", &e),
            },
            "5" => match service.inventory() {
                Ok(items) => {
                    println!("\nID   | INGREDIENTE | STOCK");
                    println!("---------------------------");
                    for i in items {
                        println!("{:<4} | {:<11} | {}", i.id(), i.name(), i.stock());
                    }
                }
                Err(e) => report_error("Error leyendo inventario", &e),
            },
            "6" => {
                let Some(id) = prompt_number("Id del ingrediente: ")? else { continue };
                let Some(quantity) = prompt_number("Cantidad a sumar: ")? else { continue };
                match service.restock(id, quantity) {
                    Ok(i) => println!("Stock actualizado: {}", i),
                    Err(e) => report_error("Error reponiendo stock", &e),
                }
            }
            "7" => {
                println!("Saliendo...");
                return Ok(());
            }
            other => println!("Opción inválida: {}", other),
        }
    }
}

fn report_error(context: &str, e: &KitchenError) {
    if e.is_transient() {
        warn!(error = %e, "almacén no disponible");
        eprintln!("{}: almacén no disponible, intenta de nuevo ({})", context, e);
    } else {
        eprintln!("{}: {}", context, e);
    }
}

/// Lee una línea recortada; `None` en fin de entrada.
fn prompt(msg: &str) -> io::Result<Option<String>> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    if io::stdin().read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s.trim().to_string()))
}

fn prompt_number(msg: &str) -> io::Result<Option<i64>> {
    let Some(raw) = prompt(msg)? else { return Ok(None) };
    match raw.parse() {
        Ok(n) => Ok(Some(n)),
        Err(_) => {
            eprintln!("Número inválido: {}", raw);
            Ok(None)
        }
    }
}
