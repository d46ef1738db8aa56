//! JSON export, import, backup and restore.

use crate::error::{Result, RouteError};
use crate::manager::{Diagnostics, RouteStateManager};
use crate::models::{PendingChanges, Route, RouteDraft};
use crate::stats::Statistics;
use crate::validation::{is_valid, sanitize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Format tag written into every export.
pub const EXPORT_VERSION: &str = "2.5";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub total_routes: usize,
    #[serde(flatten)]
    pub statistics: Statistics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub exported_at: DateTime<Utc>,
    pub version: &'static str,
    pub summary: ExportSummary,
    pub diagnostics: Diagnostics,
    pub routes: Vec<Route>,
    pub pending_changes: PendingChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub timestamp: DateTime<Utc>,
    pub routes: Vec<Route>,
    pub pending_changes: PendingChanges,
    pub statistics: Statistics,
}

/// Outcome of [`import_json`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub imported: usize,
    /// One message per rejected record, numbered from 1
    pub errors: Vec<String>,
}

pub fn export_document(manager: &RouteStateManager) -> ExportDocument {
    let statistics = manager.statistics();
    ExportDocument {
        exported_at: statistics.generated_at,
        version: EXPORT_VERSION,
        summary: ExportSummary {
            total_routes: statistics.total(),
            statistics,
        },
        diagnostics: manager.diagnostics(),
        routes: manager.routes(),
        pending_changes: manager.pending_changes(),
    }
}

/// Pretty-printed export of the full route state.
pub fn export_json(manager: &RouteStateManager) -> Result<String> {
    Ok(serde_json::to_string_pretty(&export_document(manager))?)
}

/// Append every valid record of `json`'s `routes` array as a new route.
///
/// Imported records get fresh ids and are queued as creations. Fails only
/// when the document itself is unreadable or has no `routes` array.
pub async fn import_json(manager: &RouteStateManager, json: &str) -> Result<ImportReport> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| RouteError::InvalidImport(format!("unreadable JSON: {e}")))?;
    let records = document
        .get("routes")
        .and_then(Value::as_array)
        .ok_or_else(|| RouteError::InvalidImport("missing routes array".to_string()))?;

    let mut report = ImportReport::default();
    for (index, record) in records.iter().enumerate() {
        if is_valid(record) {
            let route = sanitize(record);
            manager.add_route(RouteDraft::from(&route)).await;
            report.imported += 1;
        } else {
            report.errors.push(format!("Route {}: invalid data", index + 1));
        }
    }
    report.success = report.imported > 0;

    info!(
        imported = report.imported,
        rejected = report.errors.len(),
        "Routes imported"
    );
    Ok(report)
}

pub fn create_backup(manager: &RouteStateManager) -> Backup {
    let statistics = manager.statistics();
    Backup {
        timestamp: statistics.generated_at,
        routes: manager.routes(),
        pending_changes: manager.pending_changes(),
        statistics,
    }
}

pub fn backup_json(manager: &RouteStateManager) -> Result<String> {
    Ok(serde_json::to_string_pretty(&create_backup(manager))?)
}

/// Replace the route collection with the routes of a backup. Pending changes
/// are not restored. Returns the number of routes kept.
pub async fn restore_backup(manager: &RouteStateManager, json: &str) -> Result<usize> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| RouteError::InvalidBackup(format!("unreadable JSON: {e}")))?;
    let Some(records) = document.get("routes").and_then(Value::as_array) else {
        warn!("Backup has no routes array");
        return Err(RouteError::InvalidBackup("missing routes array".to_string()));
    };

    Ok(manager.replace_all(records).await)
}
