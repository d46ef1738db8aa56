//! # Core Routes
//!
//! Local route state for the route tracker:
//! - record validation and sanitization
//! - durable persistence over a host `KeyValueStore`
//! - the route state manager with its pending-change queue
//! - statistics, filtering, the default dataset and JSON transfer helpers
//!
//! Remote synchronization lives in `core-sync`; this crate never touches
//! the network.

pub mod error;
pub mod filter;
pub mod manager;
pub mod models;
pub mod seed;
pub mod stats;
pub mod store;
pub mod transfer;
pub mod validation;

pub use error::{Result, RouteError};
pub use filter::RouteFilter;
pub use manager::{Diagnostics, RouteChange, RouteStateManager, Subscription};
pub use models::{
    ApiStatus, ChangeAction, ConnectionStatus, PendingChange, PendingChanges, Route, RouteDraft,
    RoutePatch, RouteStatus, Sequence,
};
pub use seed::default_routes;
pub use stats::{SequenceBreakdown, Statistics, StatusCounts};
pub use store::{PersistentStore, StorageKeys, StoredState};
pub use transfer::{Backup, ExportDocument, ImportReport};
pub use validation::{format_time, is_valid, sanitize, validate_route, ValidationReport};
