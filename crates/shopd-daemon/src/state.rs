//! Shared runtime state for shopd.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself. All mutation flows through the coordinator, so the
//! state is just the coordinator handle plus static build metadata.

use std::sync::Arc;

use shopd_coordinator::Coordinator;
use shopd_store::{MemStore, RowStore};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Copy, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared (Arc) handle across all Axum handlers.
pub struct AppState {
    pub coordinator: Coordinator,
    pub build: BuildInfo,
    /// Which backend the daemon booted with: "postgres" | "memory".
    pub store_backend: &'static str,
}

impl AppState {
    pub fn new(store: Arc<dyn RowStore>, store_backend: &'static str) -> Self {
        Self {
            coordinator: Coordinator::new(store),
            build: BuildInfo {
                service: "shopd",
                version: env!("CARGO_PKG_VERSION"),
            },
            store_backend,
        }
    }

    /// MemStore-backed state: dev mode and the in-process router tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemStore::new()), "memory")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
