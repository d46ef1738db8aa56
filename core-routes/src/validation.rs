//! Record validation and sanitization.
//!
//! Raw records come from three untrusted places: the local store, the
//! spreadsheet API and operator imports. [`is_valid`] is a structural check
//! over the raw JSON; [`sanitize`] coerces anything into a [`Route`] and never
//! fails. Everything entering the state manager goes through `sanitize`.

use crate::models::{Route, RouteDraft, RouteStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structural check: every field has the right primitive type and the status
/// is one of the known values.
pub fn is_valid(record: &Value) -> bool {
    let Some(object) = record.as_object() else {
        return false;
    };

    let is_number = |key: &str| object.get(key).is_some_and(Value::is_number);
    let is_string = |key: &str| object.get(key).is_some_and(Value::is_string);

    is_number("id")
        && is_string("sequencia")
        && is_number("rota")
        && is_string("hrFinalizar")
        && is_string("hrConferencia")
        && object
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|status| status.parse::<RouteStatus>().is_ok())
}

/// Best-effort coercion of a partial record into a route.
///
/// Non-numeric ids and route numbers become `0`, strings are trimmed, times
/// are normalized with [`format_time`], and an unknown status becomes
/// `scheduled`.
pub fn sanitize(record: &Value) -> Route {
    let field = |key: &str| record.get(key).unwrap_or(&Value::Null);

    Route {
        id: coerce_integer(field("id")),
        sequence: coerce_string(field("sequencia")),
        route_number: coerce_integer(field("rota")),
        finish_time: format_time(&coerce_string(field("hrFinalizar"))),
        check_time: format_time(&coerce_string(field("hrConferencia"))),
        status: field("status")
            .as_str()
            .and_then(|status| status.parse().ok())
            .unwrap_or_default(),
    }
}

/// Normalize an already typed route.
pub fn sanitize_route(route: &Route) -> Route {
    Route {
        id: route.id,
        sequence: route.sequence.trim().to_string(),
        route_number: route.route_number,
        finish_time: format_time(route.finish_time.trim()),
        check_time: format_time(route.check_time.trim()),
        status: route.status,
    }
}

/// Zero-pad `H:M` into `HH:MM`. Input without a colon is returned unchanged.
pub fn format_time(time: &str) -> String {
    let mut parts = time.split(':');
    match (parts.next(), parts.next()) {
        (Some(hours), Some(minutes)) => format!("{:0>2}:{:0>2}", hours, minutes),
        _ => time.to_string(),
    }
}

fn is_clock_time(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 5
        && bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit())
}

/// Result of validating operator input before it is submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Form-level validation: sequence required, route number positive, both
/// times in `HH:MM`.
pub fn validate_route(draft: &RouteDraft) -> ValidationReport {
    let mut errors = Vec::new();

    if draft.sequence.trim().is_empty() {
        errors.push("Sequence is required".to_string());
    }
    if draft.route_number <= 0 {
        errors.push("Route number must be greater than zero".to_string());
    }
    if !is_clock_time(&draft.finish_time) {
        errors.push("Finish time must use the HH:MM format".to_string());
    }
    if !is_clock_time(&draft.check_time) {
        errors.push("Check time must use the HH:MM format".to_string());
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn coerce_integer(value: &Value) -> i64 {
    let number = match value {
        Value::Number(n) => n.as_i64().map(|i| i as f64).or_else(|| n.as_f64()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() => n.trunc() as i64,
        _ => 0,
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.as_f64() != Some(0.0) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(true) => "true".to_string(),
        _ => String::new(),
    }
}
