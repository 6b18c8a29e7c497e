// Archivo: reconciler.rs
// Propósito: tarea de fondo que reintenta periódicamente las órdenes en cola.
use crate::clock::Clock;
use crate::config::ReconcilerConfig;
use crate::engine::{ReservationEngine, ReservationOutcome};
use crate::service::FulfillmentService;
use kitchen_domain::{DomainError, KitchenRepository, Order};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Resumen de un ciclo de reconciliación.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub promoted: usize,
    pub requeued: usize,
    pub failed: usize,
}

/// Reintenta las órdenes `Queued` en orden de id ascendente.
///
/// Cada orden se intenta de forma independiente; un fallo en una no detiene
/// el ciclo. Debe existir un único reconciliador por almacén.
pub struct QueueReconciler<R>
    where R: KitchenRepository + ?Sized
{
    repo: Arc<R>,
    engine: Arc<ReservationEngine<R>>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
}

impl<R> QueueReconciler<R> where R: KitchenRepository + ?Sized
{
    pub fn new(repo: Arc<R>, engine: Arc<ReservationEngine<R>>, clock: Arc<dyn Clock>, config: ReconcilerConfig) -> Self {
        Self { repo, engine, clock, config }
    }

    /// Reconciliador que comparte almacén, motor y reloj con `service`.
    pub fn for_service(service: &FulfillmentService<R>, config: ReconcilerConfig) -> Self {
        Self::new(service.repository(), service.engine(), service.clock(), config)
    }

    pub fn config(&self) -> ReconcilerConfig {
        self.config
    }

    /// Ejecuta un ciclo completo de forma síncrona.
    ///
    /// Sólo falla si no se puede leer la cola; los errores por orden se
    /// cuentan en `failed`.
    pub fn run_cycle(&self) -> Result<CycleReport, DomainError> {
        let queued = self.repo.list_queued()?;
        let mut report = CycleReport { scanned: queued.len(), ..CycleReport::default() };
        for order in &queued {
            match self.reconcile_order(order) {
                Ok(true) => report.promoted += 1,
                Ok(false) => report.requeued += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(order_id = order.id(), error = %e, "no se pudo reconciliar la orden");
                }
            }
        }
        Ok(report)
    }

    fn reconcile_order(&self, order: &Order) -> Result<bool, DomainError> {
        match self.engine.retry_queued(order, self.clock.now())? {
            ReservationOutcome::Reserved => {
                info!(order_id = order.id(), recipe_id = order.recipe_id(), "orden en cola preparada");
                Ok(true)
            }
            ReservationOutcome::Insufficient => {
                debug!(order_id = order.id(), "sigue sin stock; la orden permanece en cola");
                Ok(false)
            }
        }
    }
}

impl<R> QueueReconciler<R> where R: KitchenRepository + ?Sized + 'static
{
    /// Bucle del reconciliador: un ciclo inmediato y luego uno cada
    /// `interval`, hasta que se cancele `shutdown`.
    ///
    /// Un ciclo en curso siempre termina antes de salir.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval_secs = self.config.interval.as_secs(), "reconciliador iniciado");
        while !shutdown.is_cancelled() {
            let this = self.clone();
            match tokio::task::spawn_blocking(move || this.run_cycle()).await {
                Ok(Ok(report)) if report.scanned > 0 => {
                    info!(scanned = report.scanned,
                          promoted = report.promoted,
                          requeued = report.requeued,
                          failed = report.failed,
                          "ciclo de reconciliación completado");
                }
                Ok(Ok(_)) => debug!("cola vacía"),
                Ok(Err(e)) => error!(error = %e, "no se pudo leer la cola; se reintenta en el próximo ciclo"),
                Err(e) => error!(error = %e, "el ciclo de reconciliación terminó de forma anómala"),
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        info!("reconciliador detenido");
    }

    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
