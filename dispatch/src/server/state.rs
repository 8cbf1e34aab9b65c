//! Application state for the dispatch HTTP server.

use crate::engine::DispatchEngine;
use axum::extract::FromRef;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// The engine every API handler delegates to
    pub engine: Arc<DispatchEngine>,

    /// Prometheus handle backing `/metrics`, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,

    /// Database pool pinged by `/ready`; `None` for in-memory deployments
    pub pool: Option<PgPool>,
}

impl AppState {
    /// State with only an engine, as used by tests.
    #[must_use]
    pub const fn new(engine: Arc<DispatchEngine>) -> Self {
        Self {
            engine,
            metrics: None,
            pool: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Check `pool` on `/ready`.
    #[must_use]
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

impl FromRef<AppState> for Arc<DispatchEngine> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.engine)
    }
}
