//! # Host Bridge Traits
//!
//! Capabilities the route tracker core needs from its host, each implemented
//! differently per platform.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP with timeouts
//! - [`KeyValueStore`](storage::KeyValueStore) - Durable string storage with atomic multi-key writes
//! - [`NetworkMonitor`](network::NetworkMonitor) - Online/offline detection and change stream
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | Tests    | hand-written mocks or `mockall` |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters convert
//! platform errors into it and keep transport failures (`Timeout`,
//! `Connection`) distinct from everything else so that callers can decide
//! what to retry.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! tokio tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus};
pub use storage::{KeyValueStore, KeyValueTransaction};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
