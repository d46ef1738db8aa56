//! Fixed dataset used when no stored routes exist.

use crate::models::{Route, RouteStatus};

const DEFAULT_ROUTES: [(i64, &str, i64, &str, &str, RouteStatus); 17] = [
    (1, "1ª ROTA", 665, "16:00", "17:00", RouteStatus::Completed),
    (2, "2ª ROTA", 664, "19:30", "20:30", RouteStatus::Completed),
    (3, "3ª ROTA", 661, "19:30", "21:30", RouteStatus::Delayed),
    (4, "3ª ROTA", 610, "19:30", "21:30", RouteStatus::Delayed),
    (5, "3ª ROTA", 612, "19:30", "21:30", RouteStatus::Delayed),
    (6, "4ª ROTA", 662, "00:00", "01:00", RouteStatus::Pending),
    (7, "4ª ROTA", 670, "00:00", "01:00", RouteStatus::Pending),
    (8, "4ª ROTA", 611, "00:00", "01:00", RouteStatus::Pending),
    (9, "5ª ROTA", 613, "06:00", "07:00", RouteStatus::Active),
    (10, "6ª ROTA", 668, "06:00", "07:00", RouteStatus::Active),
    (11, "6ª ROTA", 669, "06:00", "07:00", RouteStatus::Active),
    (12, "6ª ROTA", 676, "06:00", "07:00", RouteStatus::Active),
    (13, "6ª ROTA", 675, "06:00", "07:00", RouteStatus::Active),
    (14, "5ª ROTA", 660, "03:00", "04:00", RouteStatus::Active),
    (15, "7ª ROTA", 677, "07:00", "08:00", RouteStatus::Scheduled),
    (16, "7ª ROTA", 645, "07:00", "08:00", RouteStatus::Scheduled),
    (17, "7ª ROTA", 663, "07:00", "08:00", RouteStatus::Scheduled),
];

/// The 17 routes of the default shift plan.
pub fn default_routes() -> Vec<Route> {
    DEFAULT_ROUTES
        .iter()
        .map(|(id, sequence, number, finish, check, status)| Route {
            id: *id,
            sequence: sequence.to_string(),
            route_number: *number,
            finish_time: finish.to_string(),
            check_time: check.to_string(),
            status: *status,
        })
        .collect()
}
