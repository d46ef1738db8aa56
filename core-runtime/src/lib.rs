//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the route tracker core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! Every other `core-*` crate depends on this one for its configuration
//! types, its logging conventions and the broadcast channel used to publish
//! route, sync and connectivity events.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
