//! mapway core library: routing domain types, change events, configuration.
//!
//! - [`types`]: routing entries, actions, change requests and validated events
//! - [`config`]: the immutable agent [`Config`]
//! - [`error`]: [`ConfigError`] and [`InvalidEvent`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, InvalidEvent};
pub use types::{Action, ChangeEvent, ChangeRequest, RoutingEntry};
