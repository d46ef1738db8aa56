//! Route domain types.
//!
//! Field names on the wire follow the spreadsheet columns (`sequencia`,
//! `rota`, `hrFinalizar`, `hrConferencia`), so every type here carries
//! explicit serde renames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Delivery status of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Completed,
    Active,
    Delayed,
    Pending,
    Scheduled,
}

impl RouteStatus {
    pub const ALL: [RouteStatus; 5] = [
        RouteStatus::Completed,
        RouteStatus::Active,
        RouteStatus::Delayed,
        RouteStatus::Pending,
        RouteStatus::Scheduled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Completed => "completed",
            RouteStatus::Active => "active",
            RouteStatus::Delayed => "delayed",
            RouteStatus::Pending => "pending",
            RouteStatus::Scheduled => "scheduled",
        }
    }

    /// Operator-facing label
    pub fn label(&self) -> &'static str {
        match self {
            RouteStatus::Completed => "Concluída",
            RouteStatus::Active => "Em Andamento",
            RouteStatus::Delayed => "Atrasada",
            RouteStatus::Pending => "Pendente",
            RouteStatus::Scheduled => "Agendada",
        }
    }

    /// Hex colour used by dashboards
    pub fn color(&self) -> &'static str {
        match self {
            RouteStatus::Completed => "#10B981",
            RouteStatus::Active => "#3B82F6",
            RouteStatus::Delayed => "#EF4444",
            RouteStatus::Pending => "#F59E0B",
            RouteStatus::Scheduled => "#8B5CF6",
        }
    }
}

impl Default for RouteStatus {
    fn default() -> Self {
        RouteStatus::Scheduled
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RouteStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or(())
    }
}

/// The seven fixed sequence groupings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sequence {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
    Seventh,
}

impl Sequence {
    pub const ALL: [Sequence; 7] = [
        Sequence::First,
        Sequence::Second,
        Sequence::Third,
        Sequence::Fourth,
        Sequence::Fifth,
        Sequence::Sixth,
        Sequence::Seventh,
    ];

    /// Label stored in the `sequencia` column
    pub fn label(&self) -> &'static str {
        match self {
            Sequence::First => "1ª ROTA",
            Sequence::Second => "2ª ROTA",
            Sequence::Third => "3ª ROTA",
            Sequence::Fourth => "4ª ROTA",
            Sequence::Fifth => "5ª ROTA",
            Sequence::Sixth => "6ª ROTA",
            Sequence::Seventh => "7ª ROTA",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Sequence::First => "#3B82F6",
            Sequence::Second => "#6366F1",
            Sequence::Third => "#EF4444",
            Sequence::Fourth => "#F59E0B",
            Sequence::Fifth => "#10B981",
            Sequence::Sixth => "#06B6D4",
            Sequence::Seventh => "#F97316",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Sequence::ALL
            .into_iter()
            .find(|sequence| sequence.label() == label)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A delivery unit as stored locally and in the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: i64,
    #[serde(rename = "sequencia")]
    pub sequence: String,
    #[serde(rename = "rota")]
    pub route_number: i64,
    #[serde(rename = "hrFinalizar")]
    pub finish_time: String,
    #[serde(rename = "hrConferencia")]
    pub check_time: String,
    pub status: RouteStatus,
}

impl Route {
    /// Overwrite the fields present in `patch`. The id never changes.
    pub fn apply(&mut self, patch: &RoutePatch) {
        if let Some(sequence) = &patch.sequence {
            self.sequence = sequence.clone();
        }
        if let Some(number) = patch.route_number {
            self.route_number = number;
        }
        if let Some(time) = &patch.finish_time {
            self.finish_time = time.clone();
        }
        if let Some(time) = &patch.check_time {
            self.check_time = time.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }

    pub fn sequence_group(&self) -> Option<Sequence> {
        Sequence::from_label(&self.sequence)
    }
}

/// Fields for a new route; the id is assigned by the state manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDraft {
    #[serde(rename = "sequencia")]
    pub sequence: String,
    #[serde(rename = "rota")]
    pub route_number: i64,
    #[serde(rename = "hrFinalizar")]
    pub finish_time: String,
    #[serde(rename = "hrConferencia")]
    pub check_time: String,
    #[serde(default)]
    pub status: RouteStatus,
}

impl RouteDraft {
    pub fn into_route(self, id: i64) -> Route {
        Route {
            id,
            sequence: self.sequence,
            route_number: self.route_number,
            finish_time: self.finish_time,
            check_time: self.check_time,
            status: self.status,
        }
    }
}

impl From<&Route> for RouteDraft {
    fn from(route: &Route) -> Self {
        Self {
            sequence: route.sequence.clone(),
            route_number: route.route_number,
            finish_time: route.finish_time.clone(),
            check_time: route.check_time.clone(),
            status: route.status,
        }
    }
}

/// Partial route used for edits and for the field snapshot of a pending change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, rename = "sequencia", skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(default, rename = "rota", skip_serializing_if = "Option::is_none")]
    pub route_number: Option<i64>,
    #[serde(default, rename = "hrFinalizar", skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<String>,
    #[serde(default, rename = "hrConferencia", skip_serializing_if = "Option::is_none")]
    pub check_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RouteStatus>,
}

impl RoutePatch {
    pub fn status(status: RouteStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Later values win.
    pub fn merge(&mut self, other: &RoutePatch) {
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.sequence.is_some() {
            self.sequence = other.sequence.clone();
        }
        if other.route_number.is_some() {
            self.route_number = other.route_number;
        }
        if other.finish_time.is_some() {
            self.finish_time = other.finish_time.clone();
        }
        if other.check_time.is_some() {
            self.check_time = other.check_time.clone();
        }
        if other.status.is_some() {
            self.status = other.status;
        }
    }
}

impl From<&Route> for RoutePatch {
    fn from(route: &Route) -> Self {
        Self {
            id: Some(route.id),
            sequence: Some(route.sequence.clone()),
            route_number: Some(route.route_number),
            finish_time: Some(route.finish_time.clone()),
            check_time: Some(route.check_time.clone()),
            status: Some(route.status),
        }
    }
}

/// What the next sync must do for a route id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

/// An unsynchronized local change, keyed by route id in [`PendingChanges`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub action: ChangeAction,
    #[serde(flatten)]
    pub fields: RoutePatch,
    /// Milliseconds since the Unix epoch of the last local edit
    pub timestamp: i64,
}

impl PendingChange {
    pub fn is_expired(&self, now_millis: i64, ttl_millis: i64) -> bool {
        self.timestamp < now_millis - ttl_millis
    }
}

/// Pending changes by route id, in id order.
pub type PendingChanges = BTreeMap<i64, PendingChange>;

/// Outcome of the last remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Online,
    Offline,
    Error,
}

impl ApiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiStatus::Online => "online",
            ApiStatus::Offline => "offline",
            ApiStatus::Error => "error",
        }
    }

    /// Unknown values read back from storage fall back to `Offline`.
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim() {
            "online" => ApiStatus::Online,
            "error" => ApiStatus::Error,
            _ => ApiStatus::Offline,
        }
    }
}

impl Default for ApiStatus {
    fn default() -> Self {
        ApiStatus::Offline
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Offline,
}

impl ConnectionStatus {
    /// Forced offline mode wins, then the live network signal, then the
    /// outcome of the last remote call.
    pub fn derive(offline_mode: bool, network_online: bool, api_status: ApiStatus) -> Self {
        if offline_mode || !network_online {
            ConnectionStatus::Offline
        } else if api_status == ApiStatus::Online {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }
}
