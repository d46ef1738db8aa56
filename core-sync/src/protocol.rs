//! Wire format of the spreadsheet script API.
//!
//! Every call is a `POST` with a JSON body whose `action` field selects the
//! operation. Responses share one envelope: `{success, data?, error?,
//! timestamp?, version?}`.

use core_routes::Route;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Requests understood by the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ApiRequest {
    /// Fetch the full route collection
    GetAllRoutes,
    /// Create-or-update keyed by the route id
    UpdateRoute {
        #[serde(rename = "routeData")]
        route_data: Route,
    },
    DeleteRoute {
        #[serde(rename = "routeId")]
        route_id: i64,
    },
    /// Health probe without side effects
    Test,
}

impl ApiRequest {
    pub fn action(&self) -> &'static str {
        match self {
            ApiRequest::GetAllRoutes => "getAllRoutes",
            ApiRequest::UpdateRoute { .. } => "updateRoute",
            ApiRequest::DeleteRoute { .. } => "deleteRoute",
            ApiRequest::Test => "test",
        }
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ApiResponse {
    /// Records carried in `data` when it is an array.
    pub fn records(&self) -> Option<&[Value]> {
        self.data
            .as_ref()
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    /// Remote error message, or a generic one when the script sent none.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| "unknown remote error".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_routes::RouteStatus;
    use serde_json::json;

    #[test]
    fn test_request_bodies() {
        assert_eq!(
            serde_json::to_value(ApiRequest::GetAllRoutes).unwrap(),
            json!({ "action": "getAllRoutes" })
        );
        assert_eq!(
            serde_json::to_value(ApiRequest::Test).unwrap(),
            json!({ "action": "test" })
        );
        assert_eq!(
            serde_json::to_value(ApiRequest::DeleteRoute { route_id: 7 }).unwrap(),
            json!({ "action": "deleteRoute", "routeId": 7 })
        );

        let route = Route {
            id: 9,
            sequence: "5ª ROTA".into(),
            route_number: 613,
            finish_time: "06:00".into(),
            check_time: "07:00".into(),
            status: RouteStatus::Completed,
        };
        let value = serde_json::to_value(ApiRequest::UpdateRoute { route_data: route }).unwrap();
        assert_eq!(value["action"], "updateRoute");
        assert_eq!(value["routeData"]["rota"], 613);
        assert_eq!(value["routeData"]["status"], "completed");
    }

    #[test]
    fn test_response_envelope() {
        let response: ApiResponse = serde_json::from_value(json!({
            "success": true,
            "data": [{ "id": 1 }],
            "timestamp": "2024-05-01T10:00:00Z",
            "version": "2.5"
        }))
        .unwrap();

        assert!(response.success);
        assert_eq!(response.records().map(<[Value]>::len), Some(1));

        let failed: ApiResponse =
            serde_json::from_value(json!({ "success": false, "error": "" })).unwrap();
        assert_eq!(failed.error_message(), "unknown remote error");
        assert!(failed.records().is_none());
    }

    #[test]
    fn test_envelope_requires_success_flag() {
        assert!(serde_json::from_value::<ApiResponse>(json!({ "data": [] })).is_err());
    }
}
