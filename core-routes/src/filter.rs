//! Dashboard-style route filtering.

use crate::models::{Route, RouteStatus};
use serde::{Deserialize, Serialize};

/// Search box plus status selector.
///
/// `search` matches a substring of the route number or, case-insensitively,
/// of the sequence label. An empty search matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<RouteStatus>,
}

impl RouteFilter {
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn status(mut self, status: RouteStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, route: &Route) -> bool {
        let status_ok = self.status.map_or(true, |status| route.status == status);
        if !status_ok {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                route.route_number.to_string().contains(term)
                    || route
                        .sequence
                        .to_lowercase()
                        .contains(&term.to_lowercase())
            }
        }
    }

    pub fn apply<'a>(&self, routes: impl IntoIterator<Item = &'a Route>) -> Vec<Route> {
        routes
            .into_iter()
            .filter(|route| self.matches(route))
            .cloned()
            .collect()
    }
}
