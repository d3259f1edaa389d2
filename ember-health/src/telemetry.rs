//! Process wide tracer with an explicit lifecycle
//!
//! [init] is called once at process start and [shutdown] once at graceful
//! shutdown. Nothing here initialises itself lazily: before [init] and after
//! [shutdown] every caller gets a [NoopTracer].

use std::sync::{Arc, Mutex, PoisonError};

use log::info;

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::trace::{LogTracer, NoopTracer, Tracer};

enum Lifecycle {
    Uninitialised,
    Running(Arc<dyn Tracer>),
    Shutdown,
}

static TELEMETRY: Mutex<Lifecycle> = Mutex::new(Lifecycle::Uninitialised);

/// Install the process wide tracer. Only the first call succeeds.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let mut state = TELEMETRY.lock().unwrap_or_else(PoisonError::into_inner);
    if !matches!(*state, Lifecycle::Uninitialised) {
        return Err(TelemetryError::AlreadyInitialised);
    }

    let tracer: Arc<dyn Tracer> = if config.enabled {
        info!("Telemetry started for service {}", config.service_name);
        Arc::new(LogTracer::new(config.service_name.clone()))
    } else {
        info!("Telemetry disabled by configuration");
        Arc::new(NoopTracer)
    };
    *state = Lifecycle::Running(tracer);
    Ok(())
}

/// The installed tracer, or a noop tracer when not running
pub fn tracer() -> Arc<dyn Tracer> {
    match &*TELEMETRY.lock().unwrap_or_else(PoisonError::into_inner) {
        Lifecycle::Running(tracer) => tracer.clone(),
        Lifecycle::Uninitialised | Lifecycle::Shutdown => Arc::new(NoopTracer),
    }
}

/// Stop handing out the installed tracer
pub fn shutdown() -> Result<(), TelemetryError> {
    let mut state = TELEMETRY.lock().unwrap_or_else(PoisonError::into_inner);
    match *state {
        Lifecycle::Running(_) => {
            *state = Lifecycle::Shutdown;
            info!("Telemetry shut down");
            Ok(())
        }
        Lifecycle::Uninitialised | Lifecycle::Shutdown => Err(TelemetryError::NotInitialised),
    }
}
