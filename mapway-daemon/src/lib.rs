//! Mapway agent runtime: keeps the Redis routing hash, the load balancer's
//! table file and its live runtime map in step.

pub mod control;
mod deadline;
pub mod engine;
mod error;
pub mod events;
pub mod logging;
pub mod reload;
mod runtime;
pub mod store;

#[cfg(test)]
mod testing;

pub use control::{ControlEndpoint, ControlSocket, MapCommand};
pub use engine::{EventOutcome, ReconcileReport, Reconciler, SkipReason, Stage};
pub use error::DaemonError;
pub use events::{publish, EventSource, RedisSubscription};
pub use logging::init_tracing;
pub use reload::trigger_reload;
pub use runtime::{
    publish_blocking, reconcile_blocking, reconcile_once, run, serve, start_blocking, LoopStats,
};
pub use store::{RedisStore, RouteStore};
