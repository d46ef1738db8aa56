//! Route tracker façade crate.
//!
//! Host applications depend on `route-tracker` and pick a feature:
//! `desktop-shims` wires the reqwest/SQLite adapters from `bridge-desktop`,
//! `headless` exposes the core with caller-supplied bridges only.

#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use core_service::*;
