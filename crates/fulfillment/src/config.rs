// Archivo: config.rs
// Propósito: leer la configuración del proceso desde variables de entorno
// (con soporte de `.env` vía dotenvy). Valores inválidos son fatales.
use crate::errors::{KitchenError, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 5;

/// Configuración del reconciliador de la cola.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Pausa entre el fin de un ciclo y el inicio del siguiente.
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS) }
    }
}

impl ReconcilerConfig {
    pub fn from_env() -> Result<Self> {
        let raw = env::var("RECONCILE_INTERVAL_SECS").ok();
        Ok(Self { interval: parse_interval(raw.as_deref())? })
    }
}

/// Configuración del binario `kitchen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitchenConfig {
    pub reconciler: ReconcilerConfig,
    /// Cargar la cocina de ejemplo si el catálogo está vacío.
    pub seed_sample_data: bool,
}

impl KitchenConfig {
    /// Carga `.env` si existe y lee `RECONCILE_INTERVAL_SECS` y
    /// `KITCHEN_SEED`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let seed = env::var("KITCHEN_SEED").ok();
        Ok(Self { reconciler: ReconcilerConfig::from_env()?,
                  seed_sample_data: parse_flag("KITCHEN_SEED", seed.as_deref(), true)? })
    }
}

fn parse_interval(raw: Option<&str>) -> Result<Duration> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS));
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(KitchenError::Config(format!("RECONCILE_INTERVAL_SECS debe ser un entero positivo, se recibió '{}'",
                                              raw))),
    }
}

fn parse_flag(name: &str, raw: Option<&str>, default: bool) -> Result<bool> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(KitchenError::Config(format!("{} no es un booleano válido: '{}'", name, raw))),
    }
}
