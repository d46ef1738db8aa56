//! # Sync Module
//!
//! Reconciles local route state with the spreadsheet script API.
//!
//! ## Components
//!
//! - **Protocol** (`protocol`): request and response envelope of the script
//! - **Sheet Client** (`client`): timeout-bounded transport with linear retry
//! - **Sync Cycle** (`job`): state machine and per-item report of one pass
//! - **Orchestrator** (`orchestrator`): batched push, reload and probe
//! - **Background** (`background`): auto-sync timer and network watcher

pub mod background;
pub mod client;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod protocol;

pub use background::{spawn_auto_sync, spawn_network_watcher, NetworkState};
pub use client::{ApiStatusSink, SheetClient};
pub use error::{ErrorKind, Result, SyncError};
pub use job::{CycleId, CycleStatus, ItemOutcome, ItemStatus, SyncCycle, SyncReport};
pub use orchestrator::{ConnectionTest, SyncOrchestrator};
pub use protocol::{ApiRequest, ApiResponse};
