use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Route {
    pub name: String,
}

/// State delivered by the host navigation surface on every transition.
///
/// Either the full stack (`{index, routes: [{name}, ...]}`) or an already
/// resolved `{routeName, index}` pair.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NavigationState {
    Stack {
        index: usize,
        routes: Vec<Route>,
    },
    Resolved {
        #[serde(rename = "routeName")]
        route_name: String,
        #[serde(default)]
        index: usize,
    },
}

impl NavigationState {
    /// Name of the focused route, if the state points at one.
    pub fn current_route(&self) -> Option<&str> {
        let name = match self {
            NavigationState::Stack { index, routes } => routes.get(*index).map(|r| r.name.as_str()),
            NavigationState::Resolved { route_name, .. } => Some(route_name.as_str()),
        };
        name.filter(|s| !s.trim().is_empty())
    }
}
