//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`
//! - `KeyValueStore` using an SQLite `kv_store` table via `sqlx`
//! - `NetworkMonitor` using a TCP reachability probe
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, SqliteKeyValueStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http = ReqwestHttpClient::new()?;
//!     let store = SqliteKeyValueStore::new("route-tracker.db".into()).await?;
//!     let network = DesktopNetworkMonitor::new();
//!     // Hand them to core-service
//!     Ok(())
//! }
//! ```

mod http;
mod network;
mod store;

pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;
pub use store::SqliteKeyValueStore;
